//! Webhook delivery for expiration warnings.
//!
//! The message text is rendered with Tera; the webhook receives a JSON
//! envelope carrying the rendered text alongside the raw contact fields so the
//! downstream email/SMS relay can pick its channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::{info, warn};

use optiquote_core::config::NotificationConfig;
use optiquote_core::notify::{
    ExpirationWarning, NoopNotificationDispatcher, NotificationDispatcher, NotificationError,
};

const WARNING_TEMPLATE_NAME: &str = "expiration_warning.txt";
const WARNING_TEMPLATE: &str = "Hi {{ customer_name }}, your eyewear quote {{ quote_id }} \
expires on {{ expiration_date }} ({{ days_remaining }} \
day{% if days_remaining != 1 %}s{% endif %} left). \
Stop by or call us to keep it active.";

#[derive(Debug, Serialize)]
struct WarningEnvelope<'a> {
    event: &'static str,
    quote_id: &'a str,
    customer_name: Option<&'a str>,
    email: Option<&'a str>,
    phone: Option<&'a str>,
    expiration_date: String,
    days_remaining: u32,
    message: String,
}

pub struct WebhookNotificationDispatcher {
    client: Client,
    webhook_url: String,
    api_token: Option<SecretString>,
    templates: Arc<Tera>,
}

impl WebhookNotificationDispatcher {
    pub fn new(
        webhook_url: impl Into<String>,
        api_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotificationError::Transport(error.to_string()))?;

        let mut tera = Tera::default();
        tera.add_raw_template(WARNING_TEMPLATE_NAME, WARNING_TEMPLATE)
            .map_err(|error| NotificationError::Template(error.to_string()))?;

        Ok(Self { client, webhook_url: webhook_url.into(), api_token, templates: Arc::new(tera) })
    }

    pub fn render_message(&self, warning: &ExpirationWarning) -> Result<String, NotificationError> {
        let mut context = Context::new();
        context.insert("customer_name", warning.customer_name.as_deref().unwrap_or("there"));
        context.insert("quote_id", &warning.quote_id.0);
        let expiration_date = warning.expiration_date.format("%B %-d, %Y").to_string();
        context.insert("expiration_date", &expiration_date);
        context.insert("days_remaining", &warning.days_remaining);

        self.templates
            .render(WARNING_TEMPLATE_NAME, &context)
            .map_err(|error| NotificationError::Template(error.to_string()))
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotificationDispatcher {
    async fn dispatch_expiration_warning(
        &self,
        warning: &ExpirationWarning,
    ) -> Result<(), NotificationError> {
        let envelope = WarningEnvelope {
            event: "quote.expiration_warning",
            quote_id: &warning.quote_id.0,
            customer_name: warning.customer_name.as_deref(),
            email: warning.email.as_deref(),
            phone: warning.phone.as_deref(),
            expiration_date: warning.expiration_date.to_rfc3339(),
            days_remaining: warning.days_remaining,
            message: self.render_message(warning)?,
        };

        let mut request = self.client.post(&self.webhook_url).json(&envelope);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| NotificationError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            warn!(
                event_name = "notification.webhook.rejected",
                quote_id = %warning.quote_id,
                status = %response.status(),
                "expiration warning webhook returned an error status"
            );
            return Err(NotificationError::Rejected { status: response.status().as_u16() });
        }

        info!(
            event_name = "notification.webhook.delivered",
            quote_id = %warning.quote_id,
            days_remaining = warning.days_remaining,
            "expiration warning delivered"
        );
        Ok(())
    }
}

/// Webhook dispatcher when notifications are enabled, otherwise a no-op.
pub fn dispatcher_from_config(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotificationDispatcher>, NotificationError> {
    match (config.enabled, config.webhook_url.as_deref()) {
        (true, Some(url)) => Ok(Arc::new(WebhookNotificationDispatcher::new(
            url,
            config.api_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        (true, None) => {
            Err(NotificationError::Transport("notifications.webhook_url is not set".to_string()))
        }
        (false, _) => Ok(Arc::new(NoopNotificationDispatcher)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use serde_json::Value;

    use optiquote_core::config::NotificationConfig;
    use optiquote_core::domain::quote::QuoteId;
    use optiquote_core::notify::{ExpirationWarning, NotificationDispatcher, NotificationError};

    use super::{dispatcher_from_config, WebhookNotificationDispatcher};

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    fn warning() -> ExpirationWarning {
        ExpirationWarning {
            quote_id: QuoteId("Q-2026-0042".to_string()),
            customer_name: Some("Mary Jackson".to_string()),
            email: Some("mary@example.com".to_string()),
            phone: None,
            expiration_date: Utc.with_ymd_and_hms(2026, 7, 4, 12, 0, 0).unwrap(),
            days_remaining: 1,
        }
    }

    async fn spawn_receiver(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/hooks/expiration",
                post(
                    |State((captured, status)): State<(Captured, StatusCode)>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string);
                        captured.lock().expect("lock").push((auth, body));
                        status
                    },
                ),
            )
            .with_state((captured.clone(), status));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{address}/hooks/expiration"), captured)
    }

    #[test]
    fn message_uses_singular_day_and_falls_back_without_a_name() {
        let dispatcher = WebhookNotificationDispatcher::new(
            "http://localhost/unused",
            None,
            Duration::from_secs(1),
        )
        .expect("dispatcher");

        let message = dispatcher.render_message(&warning()).expect("render");
        assert!(message.starts_with("Hi Mary Jackson, your eyewear quote Q-2026-0042"));
        assert!(message.contains("July 4, 2026 (1 day left)"));

        let mut anonymous = warning();
        anonymous.customer_name = None;
        anonymous.days_remaining = 3;
        let message = dispatcher.render_message(&anonymous).expect("render");
        assert!(message.starts_with("Hi there,"));
        assert!(message.contains("(3 days left)"));
    }

    #[tokio::test]
    async fn webhook_posts_envelope_with_bearer_token() {
        let (url, captured) = spawn_receiver(StatusCode::ACCEPTED).await;
        let dispatcher = WebhookNotificationDispatcher::new(
            url,
            Some(SecretString::from("hook-token".to_string())),
            Duration::from_secs(5),
        )
        .expect("dispatcher");

        dispatcher.dispatch_expiration_warning(&warning()).await.expect("delivered");

        let calls = captured.lock().expect("lock").clone();
        assert_eq!(calls.len(), 1);
        let (auth, body) = &calls[0];
        assert_eq!(auth.as_deref(), Some("Bearer hook-token"));
        assert_eq!(body["event"], "quote.expiration_warning");
        assert_eq!(body["quote_id"], "Q-2026-0042");
        assert_eq!(body["days_remaining"], 1);
        assert!(body["message"].as_str().unwrap_or_default().contains("Q-2026-0042"));
    }

    #[tokio::test]
    async fn server_errors_are_transient_rejections() {
        let (url, _captured) = spawn_receiver(StatusCode::SERVICE_UNAVAILABLE).await;
        let dispatcher = WebhookNotificationDispatcher::new(url, None, Duration::from_secs(5))
            .expect("dispatcher");

        let error = dispatcher.dispatch_expiration_warning(&warning()).await.expect_err("503");
        assert_eq!(error, NotificationError::Rejected { status: 503 });
        assert!(error.is_transient());
    }

    #[test]
    fn disabled_notifications_use_the_noop_dispatcher() {
        let config = NotificationConfig {
            enabled: false,
            webhook_url: None,
            api_token: None,
            timeout_secs: 10,
        };
        assert!(dispatcher_from_config(&config).is_ok());

        let enabled_without_url = NotificationConfig { enabled: true, ..config };
        assert!(dispatcher_from_config(&enabled_without_url).is_err());
    }
}
