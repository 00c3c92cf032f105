use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::rfq::RfqId;
use crate::domain::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Negotiating,
    Accepted,
    Rejected,
    Expired,
    Withdrawn,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 6] = [
        Self::Pending,
        Self::Negotiating,
        Self::Accepted,
        Self::Rejected,
        Self::Expired,
        Self::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Negotiating => "negotiating",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "negotiating" => Some(Self::Negotiating),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Negotiating)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl QuoteItem {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Decimal) -> Self {
        Self { product_id, quantity, unit_price, total_price: unit_price * Decimal::from(quantity) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub rfq_id: RfqId,
    pub seller_id: UserId,
    pub total_price: Decimal,
    /// Price before any negotiated acceptance rewrote `total_price`.
    pub original_price: Decimal,
    pub delivery_timeline: Option<String>,
    pub terms_conditions: Option<String>,
    /// Terms of the live counter-offer, shown alongside the seller's own terms.
    pub proposed_terms: Option<String>,
    pub valid_until: DateTime<Utc>,
    pub status: QuoteStatus,
    pub rejection_reason: Option<String>,
    pub items: Vec<QuoteItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Pending, QuoteStatus::Negotiating)
                | (QuoteStatus::Negotiating, QuoteStatus::Pending)
                | (QuoteStatus::Pending, QuoteStatus::Accepted)
                | (QuoteStatus::Negotiating, QuoteStatus::Accepted)
                | (QuoteStatus::Pending, QuoteStatus::Rejected)
                | (QuoteStatus::Negotiating, QuoteStatus::Rejected)
                | (QuoteStatus::Pending, QuoteStatus::Expired)
                | (QuoteStatus::Negotiating, QuoteStatus::Expired)
                | (QuoteStatus::Pending, QuoteStatus::Withdrawn)
                | (QuoteStatus::Negotiating, QuoteStatus::Withdrawn)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(|item| item.total_price).sum()
    }
}
