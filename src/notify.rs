//! Notification collaborator. Delivery is fire-and-forget from the service's point of view.
use super::error::NotificationError;
use super::history::HistoryAction;
use super::request::Request;
use std::fmt::Write;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub kind: HistoryAction,
    pub request: Request,
    pub link: Option<String>,
}

impl Notification {
    pub fn subject_for(kind: HistoryAction) -> String {
        match kind {
            HistoryAction::Created => "New Request Created".to_string(),
            other => format!("Request {other}"),
        }
    }

    /// Plain text body listing the request and its items.
    pub fn render_text(&self) -> String {
        let mut body = String::new();
        let r = &self.request;
        // writing into a String cannot fail
        let _ = writeln!(body, "Request {}", self.kind);
        let _ = writeln!(body, "Request Title: {}", r.title);
        let _ = writeln!(body, "Requested By: {}", r.requested_by);
        let _ = writeln!(body, "Status: {}", r.status);
        let _ = writeln!(body, "Items:");
        for item in &r.items {
            let _ = writeln!(
                body,
                "  - {} - Quantity: {} - Purpose: {}",
                item.name, item.quantity, item.purpose
            );
        }
        if let Some(link) = &self.link {
            let _ = writeln!(body, "View or take action on this request: {link}");
        }
        body
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Default notifier: writes the rendered notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            kind = %notification.kind,
            request_id = %notification.request.id,
            body = %notification.render_text(),
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{NewItem, RequestDraft};

    #[test]
    fn subjects_follow_the_event_kind() {
        assert_eq!(
            Notification::subject_for(HistoryAction::Created),
            "New Request Created"
        );
        assert_eq!(
            Notification::subject_for(HistoryAction::Approved),
            "Request approved"
        );
    }

    #[test]
    fn renders_items_and_link() {
        let request = RequestDraft::new()
            .set_requested_by("Ama")
            .set_title("Q3 Banners")
            .add_item(NewItem::new("Banner", 10, "launch"))
            .into_request("req_1".into(), "user_1".into(), vec!["item_1".into()]);
        let notification = Notification {
            recipient: "admin".into(),
            subject: Notification::subject_for(HistoryAction::Created),
            kind: HistoryAction::Created,
            request,
            link: Some("http://localhost:5000/requests/req_1".into()),
        };

        let body = notification.render_text();

        assert!(body.contains("Request Title: Q3 Banners"));
        assert!(body.contains("Banner - Quantity: 10 - Purpose: launch"));
        assert!(body.contains("Status: pending"));
        assert!(body.ends_with("http://localhost:5000/requests/req_1\n"));
    }
}
