//! Plain-text rendering of alert notifications.

use crate::EmailMessage;
use tidings_common::types::Notification;

/// Matches listed in the body before collapsing into "... and N more".
pub const MAX_LISTED_MATCHES: usize = 10;

pub fn subject(notification: &Notification) -> String {
    let total = notification.payload.total;
    let noun = if total == 1 { "result" } else { "results" };
    format!(
        "[tidings] {total} new {noun} for \"{}\"",
        notification.payload.query
    )
}

pub fn body(notification: &Notification) -> String {
    let payload = &notification.payload;
    let mut lines = vec![
        format!("Alert: {}", payload.query),
        format!("New results: {}", payload.total),
        String::new(),
    ];

    for m in payload.matches.iter().take(MAX_LISTED_MATCHES) {
        let title = m.title.as_deref().unwrap_or(m.id.as_str());
        lines.push(format!(
            "- {title} ({id}, {created})",
            id = m.id,
            created = m.created_at.format("%Y-%m-%d %H:%M UTC"),
        ));
    }

    let listed = payload.matches.len().min(MAX_LISTED_MATCHES) as u64;
    if payload.total > listed {
        lines.push(format!("... and {} more", payload.total - listed));
    }

    lines.push(String::new());
    lines.push(format!(
        "Time: {}",
        notification.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.join("\n")
}

pub fn email(to: &str, notification: &Notification) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: subject(notification),
        body: body(notification),
    }
}
