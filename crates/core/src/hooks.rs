use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::{OrderId, OrderIntent};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("order system rejected intent: {0}")]
    Rejected(String),
    #[error("order system unavailable: {0}")]
    Unavailable(String),
}

/// Turns a committed acceptance into a binding order in the downstream order system.
#[async_trait]
pub trait OrderConversionHook: Send + Sync {
    async fn materialize_order(&self, intent: &OrderIntent) -> Result<OrderId, HookError>;
}

/// Records intents and hands back `ORD-<quote id>` identifiers.
#[derive(Clone, Default)]
pub struct InMemoryOrderHook {
    received: Arc<Mutex<Vec<OrderIntent>>>,
    unavailable: bool,
}

impl InMemoryOrderHook {
    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    pub fn received(&self) -> Vec<OrderIntent> {
        match self.received.lock() {
            Ok(received) => received.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl OrderConversionHook for InMemoryOrderHook {
    async fn materialize_order(&self, intent: &OrderIntent) -> Result<OrderId, HookError> {
        match self.received.lock() {
            Ok(mut received) => received.push(intent.clone()),
            Err(poisoned) => poisoned.into_inner().push(intent.clone()),
        }
        if self.unavailable {
            return Err(HookError::Unavailable("order service offline".to_owned()));
        }
        Ok(OrderId(format!("ORD-{}", intent.quote_id.0)))
    }
}
