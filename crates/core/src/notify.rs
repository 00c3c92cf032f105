use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Email,
    WhatsApp,
    Push,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
            Self::Push => "push",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    QuoteReceived,
    QuoteUpdated,
    QuoteWithdrawn,
    QuoteAccepted,
    QuoteRejected,
    CounterOfferReceived,
    CounterOfferAccepted,
    CounterOfferRejected,
    CounterOfferAutoAccepted,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuoteReceived => "quote_received",
            Self::QuoteUpdated => "quote_updated",
            Self::QuoteWithdrawn => "quote_withdrawn",
            Self::QuoteAccepted => "quote_accepted",
            Self::QuoteRejected => "quote_rejected",
            Self::CounterOfferReceived => "counter_offer_received",
            Self::CounterOfferAccepted => "counter_offer_accepted",
            Self::CounterOfferRejected => "counter_offer_rejected",
            Self::CounterOfferAutoAccepted => "counter_offer_auto_accepted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub channel: NotificationChannel,
    pub template: NotificationTemplate,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn in_app(user_id: UserId, template: NotificationTemplate) -> Self {
        Self { user_id, channel: NotificationChannel::InApp, template, data: BTreeMap::new() }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification queue is closed")]
    Closed,
    #[error("notification queue is full")]
    Full,
}

/// Hands notifications to an external delivery system. Must never block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Sends notifications over a bounded tokio channel; the receiving half is drained by
/// the daemon.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sender.try_send(notification).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => NotificationError::Full,
            mpsc::error::TrySendError::Closed(_) => NotificationError::Closed,
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl InMemoryNotifier {
    /// Notifier that refuses every notification.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, user_id: &UserId) -> Vec<NotificationTemplate> {
        self.sent()
            .into_iter()
            .filter(|notification| &notification.user_id == user_id)
            .map(|notification| notification.template)
            .collect()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.failing {
            return Err(NotificationError::Closed);
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Dispatches and swallows failures.
pub(crate) fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    let template = notification.template.as_str();
    let user_id = notification.user_id.0.clone();
    if let Err(error) = notifier.notify(notification) {
        tracing::warn!(
            event_name = "notification.dispatch_failed",
            template,
            user_id = %user_id,
            error = %error,
            "notification dropped"
        );
    }
}
