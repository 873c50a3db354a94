// Logging utilities
// Structured logging with JSON and human-readable formats

use log::Level;
use serde_json::json;

/// Property names whose values never reach a log line.
const SECRET_MARKERS: [&str; 4] = ["PASSWORD", "SECRET", "TOKEN", "KEY"];

/// Mask secret-looking values in a `Name=Value;Name=Value` property list before logging it.
pub fn mask_property_list(properties: &str) -> String {
    properties
        .split(';')
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if is_secret_name(name) && !value.trim().is_empty() => {
                format!("{}=***", name)
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn is_secret_name(name: &str) -> bool {
    let upper = name.trim().to_ascii_uppercase();
    SECRET_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Parse phase and step from log message
/// Extracts [PHASE: ...] and [STEP: ...] patterns
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let (phase, rest) = extract_tag(message, "[PHASE:");
    let (step, rest) = extract_tag(&rest, "[STEP:");
    (phase, step, rest)
}

fn extract_tag(message: &str, open: &str) -> (Option<String>, String) {
    let Some(start) = message.find(open) else {
        return (None, message.to_string());
    };
    let Some(end) = message[start..].find(']') else {
        return (None, message.to_string());
    };
    let value = message[start + open.len()..start + end].trim().to_string();
    let cleaned = format!("{} {}", &message[..start], &message[start + end + 1..])
        .trim()
        .to_string();
    (Some(value), cleaned)
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
    thread: Option<&str>,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });

    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }

    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }

    // Engine and UI contexts interleave; the thread name tells them apart.
    if let Some(thread) = thread {
        log_entry["thread"] = json!(thread);
    }

    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_line = format!("[{}] [{}]", timestamp, level.as_str());

    if let Some(phase) = phase {
        log_line.push_str(&format!(" [PHASE: {}]", phase));
    }

    if let Some(step) = step {
        log_line.push_str(&format!(" [STEP: {}]", step));
    }

    log_line.push_str(&format!(" [{}] {}", target, message));
    log_line
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Metadata extraction
    // =========================================================================

    #[test]
    fn parse_log_metadata_extracts_phase_and_step() {
        let (phase, step, msg) =
            parse_log_metadata("[PHASE: shell] [STEP: navigate] Activated Welcome (1/5)");
        assert_eq!(phase.as_deref(), Some("shell"));
        assert_eq!(step.as_deref(), Some("navigate"));
        assert_eq!(msg, "Activated Welcome (1/5)");
    }

    #[test]
    fn parse_log_metadata_without_tags_is_unchanged() {
        let (phase, step, msg) = parse_log_metadata("plain message [1]");
        assert!(phase.is_none());
        assert!(step.is_none());
        assert_eq!(msg, "plain message [1]");
    }

    #[test]
    fn parse_log_metadata_phase_only() {
        let (phase, step, msg) = parse_log_metadata("[PHASE: initialization] Logging initialized");
        assert_eq!(phase.as_deref(), Some("initialization"));
        assert!(step.is_none());
        assert_eq!(msg, "Logging initialized");
    }

    // =========================================================================
    // Formatting
    // =========================================================================

    #[test]
    fn json_log_carries_optional_fields() {
        let line = format_json_log(
            "2026-01-01T00:00:00Z",
            Level::Info,
            "installer_shell::shell",
            "Activated Exit",
            Some("shell"),
            Some("navigate"),
            Some("demo-engine"),
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["phase"], "shell");
        assert_eq!(value["step"], "navigate");
        assert_eq!(value["thread"], "demo-engine");

        let bare = format_json_log("t", Level::Debug, "x", "m", None, None, None);
        let value: serde_json::Value = serde_json::from_str(&bare).unwrap();
        assert!(value.get("phase").is_none());
        assert!(value.get("thread").is_none());
    }

    #[test]
    fn human_readable_log_reinserts_tags() {
        let line = format_human_readable_log(
            "2026-01-01 00:00:00.000",
            Level::Warn,
            "installer_shell",
            "Advisory write skipped",
            Some("shell"),
            Some("persist"),
        );
        assert_eq!(
            line,
            "[2026-01-01 00:00:00.000] [WARN] [PHASE: shell] [STEP: persist] [installer_shell] Advisory write skipped"
        );
    }

    // =========================================================================
    // Secret masking (property lists must never leak credentials)
    // =========================================================================

    #[test]
    fn property_list_masks_secret_values() {
        let masked = mask_property_list("INSTALLDIR=/opt/app;DB_PASSWORD=hunter2;ApiToken=abc");
        assert_eq!(masked, "INSTALLDIR=/opt/app;DB_PASSWORD=***;ApiToken=***");
        assert!(!masked.contains("hunter2"));
    }

    #[test]
    fn property_list_keeps_plain_and_malformed_entries() {
        assert_eq!(mask_property_list("A=1;junk;PASSWORD="), "A=1;junk;PASSWORD=");
        assert_eq!(mask_property_list(""), "");
    }
}
