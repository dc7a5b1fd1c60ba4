//! Outbound workflow notifications
//!
//! The engine emits events after a transition has been committed. Delivery
//! is best effort: a failed notification is logged and the transition stands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use workflow_types::{
    ActorId, DocumentId, StepId, StepKind, WorkflowInstanceId, WorkflowStatus,
};

/// Events delivered to the notification dispatcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A step became actionable for its participant
    StepActionable {
        document_id: DocumentId,
        step_id: StepId,
        participant: ActorId,
        kind: StepKind,
    },
    /// The workflow reached a terminal status
    WorkflowTerminal {
        document_id: DocumentId,
        instance_id: WorkflowInstanceId,
        status: WorkflowStatus,
    },
}

impl WorkflowEvent {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            WorkflowEvent::StepActionable { document_id, .. }
            | WorkflowEvent::WorkflowTerminal { document_id, .. } => document_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    Closed,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Notification dispatcher seam
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError>;
}

/// Discards every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: WorkflowEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Forwards events into a bounded channel without waiting for capacity
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<WorkflowEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
            mpsc::error::TrySendError::Full(_) => NotifyError::Delivery("channel full".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actionable(step: &str) -> WorkflowEvent {
        WorkflowEvent::StepActionable {
            document_id: DocumentId::new("d"),
            step_id: StepId::new(step),
            participant: ActorId::new("alice"),
            kind: StepKind::Signature,
        }
    }

    #[tokio::test]
    async fn channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        notifier.notify(actionable("s1")).await.unwrap();
        notifier.notify(actionable("s2")).await.unwrap();
        assert_eq!(rx.recv().await, Some(actionable("s1")));
        assert_eq!(rx.recv().await, Some(actionable("s2")));
    }

    #[tokio::test]
    async fn full_or_closed_channel_reports_failure() {
        let (notifier, rx) = ChannelNotifier::new(1);
        notifier.notify(actionable("s1")).await.unwrap();
        assert!(matches!(
            notifier.notify(actionable("s2")).await,
            Err(NotifyError::Delivery(_))
        ));

        drop(rx);
        assert_eq!(notifier.notify(actionable("s3")).await, Err(NotifyError::Closed));
    }
}
