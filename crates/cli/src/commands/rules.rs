use optiquote_core::config::{AppConfig, LoadOptions};
use optiquote_core::domain::quote::QuoteStatus;
use optiquote_core::flows::{is_backward, reachable_from, ApprovalPolicy};

use crate::commands::CommandResult;

/// Dumps the adjacency table, optionally for a single source status, with
/// the role gate that applies to each edge under the loaded threshold.
pub fn run(from: Option<&str>) -> CommandResult {
    let sources = match from {
        Some(raw) => match QuoteStatus::parse(raw) {
            Some(status) => vec![status],
            None => {
                return CommandResult::failure(
                    "rules",
                    "invalid_argument",
                    format!("unknown quote status `{raw}`"),
                    2,
                );
            }
        },
        None => QuoteStatus::ALL.to_vec(),
    };

    let policy = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config.lifecycle.approval_policy(),
        Err(error) => {
            return CommandResult::failure(
                "rules",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    CommandResult::success("rules", render_table(&sources, &policy))
}

fn render_table(sources: &[QuoteStatus], policy: &ApprovalPolicy) -> String {
    let mut lines = Vec::new();
    for &source in sources {
        let targets = reachable_from(source);
        if targets.is_empty() {
            lines.push(format!("{} -> (terminal)", source.as_str()));
            continue;
        }
        for &target in targets {
            let mut line = format!("{} -> {}", source.as_str(), target.as_str());
            if is_backward(source, target) {
                line.push_str(" [backward]");
            }
            if let Some(gate) = gate_note(source, target, policy) {
                line.push_str(&format!(" [{gate}]"));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn gate_note(from: QuoteStatus, to: QuoteStatus, policy: &ApprovalPolicy) -> Option<String> {
    match (from, to) {
        (QuoteStatus::Signed, QuoteStatus::Cancelled) => {
            Some("manager approval required".to_string())
        }
        (_, QuoteStatus::Signed) => Some(format!(
            "manager approval when a sales associate signs above {}",
            policy.high_value_threshold
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use optiquote_core::domain::quote::QuoteStatus;
    use optiquote_core::flows::ApprovalPolicy;

    use super::render_table;

    #[test]
    fn presented_edges_carry_backward_and_gate_markers() {
        let table = render_table(&[QuoteStatus::Presented], &ApprovalPolicy::default());

        assert!(table.contains("presented -> draft [backward]"));
        assert!(table.contains(
            "presented -> signed [manager approval when a sales associate signs above 10000]"
        ));
        assert!(table.contains("presented -> expired"));
        assert!(!table.contains("presented -> completed"));
    }

    #[test]
    fn terminal_statuses_are_marked() {
        let table = render_table(
            &[QuoteStatus::Completed, QuoteStatus::Signed],
            &ApprovalPolicy::default(),
        );

        assert!(table.contains("completed -> (terminal)"));
        assert!(table.contains("signed -> cancelled [manager approval required]"));
    }
}
