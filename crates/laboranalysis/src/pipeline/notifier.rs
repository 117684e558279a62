use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::order::{Order, OrderDocument};
use super::stage::WorkerRole;

/// Outbound message handed to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn is_addressed_to(&self, recipient: &str) -> bool {
        self.recipients.iter().any(|address| address == recipient)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode notification: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Delivery seam for operator and customer messages (mail, chat, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Builds the messages workers and intake send.
#[derive(Debug, Clone)]
pub struct NotificationTemplates {
    operator: String,
}

impl NotificationTemplates {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Operator-only report of a failed stage, carrying the raw document for
    /// manual triage.
    pub fn problem(&self, role: WorkerRole, document: &OrderDocument, reason: &str) -> Notification {
        Notification {
            recipients: vec![self.operator.clone()],
            subject: format!("{} application ran into an issue", role.label()),
            body: format!("{document}\n\nreason: {reason}"),
        }
    }

    /// Stage success. The notifying stage also addresses the customer.
    pub fn success(&self, role: WorkerRole, order: &Order) -> Notification {
        let mut recipients = vec![self.operator.clone()];
        let subject = if role.notifies_customer() {
            if let Some(customer) = order.customer.as_ref().filter(|c| !c.trim().is_empty()) {
                recipients.push(customer.clone());
            }
            "Your requested report is ready!".to_string()
        } else {
            format!("{} application completes successfully", role.label())
        };

        Notification {
            recipients,
            subject,
            body: order.subject.clone(),
        }
    }

    pub fn dead_letter(
        &self,
        role: WorkerRole,
        document: &OrderDocument,
        attempts: u32,
        reason: &str,
    ) -> Notification {
        Notification {
            recipients: vec![self.operator.clone()],
            subject: format!("{} application gave up on an order", role.label()),
            body: format!(
                "{document}\n\nmoved to dead_letter after {attempts} failed attempts\nlast reason: {reason}"
            ),
        }
    }

    pub fn new_order(&self, document: &OrderDocument) -> Notification {
        Notification {
            recipients: vec![self.operator.clone()],
            subject: "Laboranalysis application received a new order".to_string(),
            body: document.to_string(),
        }
    }
}

/// Logs every message instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            recipients = ?notification.recipients,
            subject = %notification.subject,
            "notification (not delivered)"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboxMessage<'a> {
    created_at: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Spools each message as a JSON file for an external mail transport to pick up.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, NotifyError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let now = Utc::now();
        let message = OutboxMessage {
            created_at: now.to_rfc3339(),
            notification,
        };
        let file_name = format!("{}-{}.json", now.format("%Y%m%dT%H%M%S%.3f"), Uuid::new_v4());
        let staging = self.dir.join(format!(".{file_name}.tmp"));

        std::fs::write(&staging, serde_json::to_vec_pretty(&message)?)?;
        std::fs::rename(&staging, self.dir.join(file_name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::order::OrderKind;

    #[test]
    fn success_at_notify_stage_addresses_customer() {
        let templates = NotificationTemplates::new("ops@lab.example");
        let order = Order::new(OrderKind::VacancyRequest, "a@x.com", "Engineer");

        let harvest = templates.success(WorkerRole::Harvest, &order);
        assert_eq!(harvest.recipients, vec!["ops@lab.example".to_string()]);
        assert_eq!(harvest.subject, "Harvest application completes successfully");

        let notify = templates.success(WorkerRole::Notify, &order);
        assert!(notify.is_addressed_to("a@x.com"));
        assert!(notify.is_addressed_to("ops@lab.example"));
        assert_eq!(notify.body, "Engineer");
    }

    #[test]
    fn problem_carries_document_and_reason() {
        let templates = NotificationTemplates::new("ops@lab.example");
        let doc = Order::new(OrderKind::ResumeRequest, "a@x.com", "analyst").to_document();

        let message = templates.problem(WorkerRole::Analyze, &doc, "timeout");

        assert_eq!(message.recipients, vec!["ops@lab.example".to_string()]);
        assert_eq!(message.subject, "Analyze application ran into an issue");
        assert!(message.body.contains("\"criteria\":\"analyst\""));
        assert!(message.body.contains("timeout"));
    }

    #[test]
    fn outbox_writes_one_file_per_message() {
        let dir = tempfile::tempdir().expect("temp dir");
        let outbox = OutboxNotifier::new(dir.path().join("outbox")).expect("outbox");
        let message = Notification {
            recipients: vec!["ops@lab.example".to_string()],
            subject: "hello".to_string(),
            body: "world".to_string(),
        };

        outbox.notify(&message).expect("first");
        outbox.notify(&message).expect("second");

        let files: Vec<_> = std::fs::read_dir(outbox.dir())
            .expect("read outbox")
            .map(|entry| entry.expect("entry").path())
            .collect();
        assert_eq!(files.len(), 2);

        let raw = std::fs::read_to_string(&files[0]).expect("read message");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(parsed["subject"], "hello");
        assert_eq!(parsed["recipients"][0], "ops@lab.example");
        assert!(parsed["created_at"].is_string());
    }
}
