//! Counter-offer rounds between a quote's buyer and seller.

pub mod manager;
pub mod summary;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::acceptance::Acceptance;
use crate::domain::negotiation::NegotiationEntry;

pub use manager::NegotiationManager;
pub use summary::{summarize, UserNegotiationStats};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounterOffer {
    pub price: Decimal,
    pub terms: Option<String>,
    /// Defaults to the configured counter-offer validity.
    pub valid_until: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl CounterOffer {
    pub fn at_price(price: Decimal) -> Self {
        Self { price, terms: None, valid_until: None, message: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CounterOfferResponse {
    Accept,
    Reject {
        message: Option<String>,
    },
    Counter {
        /// Required; a missing price is a validation error.
        price: Option<Decimal>,
        terms: Option<String>,
        message: Option<String>,
        valid_until: Option<DateTime<Utc>>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResponseOutcome {
    Converted(Acceptance),
    Rejected(NegotiationEntry),
    Countered(NegotiationEntry),
}

impl ResponseOutcome {
    /// True when the response turned the quote into an order intent.
    pub fn converted(&self) -> bool {
        matches!(self, Self::Converted(_))
    }
}
