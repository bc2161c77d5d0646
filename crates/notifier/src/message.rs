//! Message formatting

use alerting::{MonitorStatus, NotificationEvent};

/// Prefix marking messages produced by a diagnostic drill
pub const DRILL_PREFIX: &str = "[DRILL] ";

fn headline(event: &NotificationEvent, service: &str) -> String {
    match (event.previous_status, event.new_status) {
        (_, MonitorStatus::OutageActive) => format!("[OUTAGE] {} outage detected", service),
        (MonitorStatus::Online, MonitorStatus::Suspected) => {
            format!("[WARNING] Possible {} problems, investigating", service)
        }
        (_, MonitorStatus::Suspected) => format!("[UPDATE] {} outage easing, still watching", service),
        (MonitorStatus::OutageActive, MonitorStatus::Online) => format!("[RECOVERED] {} is back to normal", service),
        (_, MonitorStatus::Online) => format!("[RESOLVED] {} looks fine after all", service),
    }
}

/// Render the body for one event
pub fn format_message(event: &NotificationEvent, service: &str, drill: bool) -> String {
    let mut body = String::new();
    if drill {
        body.push_str(DRILL_PREFIX);
    }
    body.push_str(&headline(event, service));
    body.push('\n');
    body.push_str(&format!("Status: {} -> {}\n", event.previous_status, event.new_status));

    let summary = event.verdict_summary.trim();
    if !summary.is_empty() {
        body.push_str(summary);
        body.push('\n');
    }
    body.push_str(&format!("Detected at {}", event.emitted_at.format("%Y-%m-%d %H:%M UTC")));
    body
}

/// Role mentions as `<@&id>`, user mentions as `<@id>`
pub fn mention_line(role_ids: &[u64], user_ids: &[u64]) -> String {
    role_ids
        .iter()
        .map(|id| format!("<@&{}>", id))
        .chain(user_ids.iter().map(|id| format!("<@{}>", id)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `text` into chunks of at most `limit` characters, preferring to cut
/// at the last newline inside each window.
pub fn smart_split(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest: &str = text;

    while rest.chars().count() > limit {
        // Byte offset just past the `limit`th character
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];

        let (chunk, next) = match window.rfind('\n') {
            Some(cut) if cut > 0 => (&rest[..cut], &rest[cut + 1..]),
            _ => (window, &rest[window_end..]),
        };
        if !chunk.trim().is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = next;
    }

    if !rest.trim().is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
