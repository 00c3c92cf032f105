use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteId;
use crate::domain::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NegotiationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    Original,
    Counter,
    Final,
}

impl OfferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Counter => "counter",
            Self::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "original" => Some(Self::Original),
            "counter" => Some(Self::Counter),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// One offer exchanged on a quote. Only `status`, `response_message` and
/// `responded_at` ever change after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationEntry {
    pub id: NegotiationId,
    pub quote_id: QuoteId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub offer_type: OfferType,
    pub price: Decimal,
    pub terms: Option<String>,
    pub message: Option<String>,
    pub response_message: Option<String>,
    pub status: NegotiationStatus,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl NegotiationEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    pub fn is_live(&self) -> bool {
        self.status == NegotiationStatus::Pending
    }

    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.from_user_id == user_id || &self.to_user_id == user_id
    }

    pub fn can_transition_to(&self, next: NegotiationStatus) -> bool {
        self.status == NegotiationStatus::Pending && next != NegotiationStatus::Pending
    }

    pub fn transition_to(&mut self, next: NegotiationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidNegotiationTransition { from: self.status, to: next })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationOutcome {
    Active,
    Completed,
    Expired,
    Cancelled,
}

/// Derived view over a quote's negotiation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSummary {
    pub quote_id: QuoteId,
    pub original_price: Decimal,
    pub current_price: Decimal,
    pub price_reduction: Decimal,
    pub price_reduction_percentage: Decimal,
    pub rounds: u32,
    pub status: NegotiationOutcome,
    pub history: Vec<NegotiationEntry>,
}
