use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use optiquote_cli::commands::{config, migrate, rules, seed, start};
use serde_json::Value;

#[test]
fn start_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("OPTIQUOTE_DATABASE_URL", &url)], || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("database reachable"));
        assert!(message.contains("127.0.0.1:8080"));
    });
}

#[test]
fn start_returns_config_failure_for_invalid_override() {
    with_env(&[("OPTIQUOTE_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn start_returns_db_failure_when_database_is_unreachable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("missing/nested/optiquote.db").display());
    with_env(&[("OPTIQUOTE_DATABASE_URL", &url)], || {
        let result = start::run();
        assert_eq!(result.exit_code, 4, "expected db connectivity failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("OPTIQUOTE_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_returns_deterministic_quote_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("OPTIQUOTE_DATABASE_URL", &url)], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo quotes ready (7 total, 7 inserted):"));
        for quote_id in [
            "Q-DEMO-BUILDING",
            "Q-DEMO-DRAFT",
            "Q-DEMO-WARN",
            "Q-DEMO-STALE",
            "Q-DEMO-HIGH-VALUE",
            "Q-DEMO-POF",
            "Q-DEMO-SIGNED",
        ] {
            assert!(message.contains(quote_id), "missing {quote_id} in {message}");
        }
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("OPTIQUOTE_DATABASE_URL", &url)], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");
        let message = second_payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo quotes ready (7 total, 0 inserted):"));
    });
}

#[test]
fn config_attributes_env_overrides_and_hides_the_webhook_token() {
    with_env(
        &[
            ("OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD", "2500"),
            ("OPTIQUOTE_NOTIFICATIONS_API_TOKEN", "hook-secret-value"),
        ],
        || {
            let output = config::run();

            assert!(output.starts_with("effective config"));
            assert!(output.contains(
                "- lifecycle.high_value_threshold = 2500 (source: env (OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD))"
            ));
            assert!(output.contains("- notifications.api_token = set"));
            assert!(output.contains("- sweeper.enabled = true (source: default)"));
            assert!(!output.contains("hook-secret-value"));
        },
    );
}

#[test]
fn rules_uses_the_configured_threshold() {
    with_env(&[("OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD", "2500")], || {
        let result = rules::run(Some("presented"));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("signs above 2500"));
        assert!(!message.contains("building -> draft"));
    });
}

#[test]
fn rules_rejects_unknown_status() {
    with_env(&[], || {
        let result = rules::run(Some("ordered"));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("optiquote.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "OPTIQUOTE_DATABASE_URL",
        "OPTIQUOTE_DATABASE_MAX_CONNECTIONS",
        "OPTIQUOTE_DATABASE_TIMEOUT_SECS",
        "OPTIQUOTE_LIFECYCLE_HIGH_VALUE_THRESHOLD",
        "OPTIQUOTE_LIFECYCLE_DEFAULT_AUTO_EXPIRE_DAYS",
        "OPTIQUOTE_LIFECYCLE_EXPIRATION_WARNING_LEAD_DAYS",
        "OPTIQUOTE_SWEEPER_ENABLED",
        "OPTIQUOTE_SWEEPER_INTERVAL_SECS",
        "OPTIQUOTE_SWEEPER_MAX_CONCURRENCY",
        "OPTIQUOTE_PERSISTENCE_MAX_ATTEMPTS",
        "OPTIQUOTE_PERSISTENCE_BASE_DELAY_MS",
        "OPTIQUOTE_NOTIFICATIONS_ENABLED",
        "OPTIQUOTE_NOTIFICATIONS_WEBHOOK_URL",
        "OPTIQUOTE_NOTIFICATIONS_API_TOKEN",
        "OPTIQUOTE_SERVER_BIND_ADDRESS",
        "OPTIQUOTE_SERVER_PORT",
        "OPTIQUOTE_LOGGING_LEVEL",
        "OPTIQUOTE_LOGGING_FORMAT",
        "OPTIQUOTE_LOG_LEVEL",
        "OPTIQUOTE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
