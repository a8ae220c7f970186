//! Push notification bridge.
//!
//! Turns a push payload into a notification and a notification click into a
//! navigation. Stateless: a payload that is empty, not JSON, or not an object
//! falls back to the defaults instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BODY: &str = "You have a new update";
pub const ICON: &str = "/icons/icon-192x192.png";
pub const BADGE: &str = "/icons/icon-72x72.png";
pub const VIBRATE: [u32; 3] = [100, 50, 100];

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

/// A button shown on the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// The notification to display for a push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Path opened when the notification body is clicked.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

/// What the host does after a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// Close the notification and open `path`.
    Navigate { path: String },
    /// Close the notification only.
    Dismiss,
}

/// Build the notification for a raw push payload.
pub fn decode_push(payload: Option<&[u8]>, app_name: &str) -> Notification {
    let fields = payload
        .and_then(|bytes| match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                tracing::debug!("push payload is not a JSON object, using defaults");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "malformed push payload, using defaults");
                None
            }
        })
        .unwrap_or_default();

    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

    Notification {
        title: text("title").unwrap_or_else(|| app_name.to_string()),
        body: text("body").unwrap_or_else(|| DEFAULT_BODY.to_string()),
        icon: ICON.to_string(),
        badge: BADGE.to_string(),
        vibrate: VIBRATE.to_vec(),
        url: text("url").filter(|u| is_app_path(u)).unwrap_or_else(|| "/".to_string()),
        actions: vec![
            NotificationAction { action: ACTION_EXPLORE.into(), title: "Open Dashboard".into() },
            NotificationAction { action: ACTION_CLOSE.into(), title: "Dismiss".into() },
        ],
    }
}

/// A path on the app's own origin.
///
/// `//host` and `/\host` are rejected: browsers resolve both to another host.
fn is_app_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

/// Route a click on `notification`.
///
/// `action` is the clicked button, or None for the notification body.
/// Unrecognized actions behave like a body click.
pub fn route_click(notification: &Notification, action: Option<&str>, dashboard_path: &str) -> ClickOutcome {
    match action {
        Some(ACTION_EXPLORE) => ClickOutcome::Navigate { path: dashboard_path.to_string() },
        Some(ACTION_CLOSE) => ClickOutcome::Dismiss,
        _ => ClickOutcome::Navigate { path: notification.url.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_payload() {
        let n = decode_push(Some(br#"{"title":"Goal updated","body":"Reading goal at 80%"}"#), "My IEP Hero");
        assert_eq!(n.title, "Goal updated");
        assert_eq!(n.body, "Reading goal at 80%");
        assert_eq!(n.url, "/");
        assert_eq!(n.actions.len(), 2);
        assert_eq!(n.actions[0].action, "explore");
        assert_eq!(n.actions[1].action, "close");
    }

    #[test]
    fn test_decode_missing_payload() {
        let n = decode_push(None, "My IEP Hero");
        assert_eq!(n.title, "My IEP Hero");
        assert_eq!(n.body, DEFAULT_BODY);
    }

    #[test]
    fn test_decode_malformed_payload() {
        for payload in [&b""[..], b"not json", b"[1,2]", br#"{"title": 42}"#] {
            let n = decode_push(Some(payload), "My IEP Hero");
            assert_eq!(n.title, "My IEP Hero");
            assert_eq!(n.body, DEFAULT_BODY);
        }
    }

    #[test]
    fn test_decode_partial_payload() {
        let n = decode_push(Some(br#"{"body":"New message from the school"}"#), "My IEP Hero");
        assert_eq!(n.title, "My IEP Hero");
        assert_eq!(n.body, "New message from the school");
    }

    #[test]
    fn test_payload_url_must_be_a_path() {
        let n = decode_push(Some(br#"{"url":"/messages"}"#), "Hero");
        assert_eq!(n.url, "/messages");
        let n = decode_push(Some(br#"{"url":"https://evil.test/"}"#), "Hero");
        assert_eq!(n.url, "/");
    }

    #[test]
    fn test_payload_url_cannot_leave_origin() {
        for payload in [&br#"{"url":"//evil.test/phish"}"#[..], br#"{"url":"/\\evil.test/phish"}"#] {
            let n = decode_push(Some(payload), "Hero");
            assert_eq!(n.url, "/");
            assert_eq!(route_click(&n, None, "/dashboard"), ClickOutcome::Navigate { path: "/".into() });
        }
    }

    #[test]
    fn test_route_click() {
        let n = decode_push(Some(br#"{"url":"/messages"}"#), "Hero");
        assert_eq!(
            route_click(&n, Some("explore"), "/dashboard"),
            ClickOutcome::Navigate { path: "/dashboard".into() }
        );
        assert_eq!(route_click(&n, Some("close"), "/dashboard"), ClickOutcome::Dismiss);
        assert_eq!(route_click(&n, None, "/dashboard"), ClickOutcome::Navigate { path: "/messages".into() });
    }
}
