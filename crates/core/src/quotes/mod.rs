//! Seller quotes: creation, maintenance, buyer decisions and comparison.

pub mod comparison;
pub mod manager;
pub mod stats;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::quote::QuoteStatus;
use crate::domain::rfq::RfqId;
use crate::domain::UserId;
use crate::store::QuoteFilter;

pub use comparison::{QuoteComparison, QuoteScorer, ScoreBreakdown, ScoredQuote};
pub use manager::QuoteManager;
pub use stats::SellerQuoteStats;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteItemInput {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateQuote {
    pub rfq_id: RfqId,
    pub total_price: Decimal,
    pub items: Vec<QuoteItemInput>,
    pub delivery_timeline: Option<String>,
    pub terms_conditions: Option<String>,
    /// Defaults to the configured quote validity.
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub total_price: Option<Decimal>,
    pub delivery_timeline: Option<String>,
    pub terms_conditions: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub items: Option<Vec<QuoteItemInput>>,
}

impl QuoteUpdate {
    pub fn is_empty(&self) -> bool {
        self.total_price.is_none()
            && self.delivery_timeline.is_none()
            && self.terms_conditions.is_none()
            && self.valid_until.is_none()
            && self.items.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteListFilter {
    pub rfq_id: Option<RfqId>,
    pub seller_id: Option<UserId>,
    /// `pending` when unset.
    pub status: Option<QuoteStatus>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Only quotes whose `valid_until` is still in the future.
    pub valid_only: bool,
}

impl QuoteListFilter {
    pub fn to_store_filter(&self, now: DateTime<Utc>) -> QuoteFilter {
        QuoteFilter {
            rfq_id: self.rfq_id.clone(),
            seller_id: self.seller_id.clone(),
            statuses: vec![self.status.unwrap_or(QuoteStatus::Pending)],
            min_price: self.min_price,
            max_price: self.max_price,
            valid_at: self.valid_only.then_some(now),
        }
    }
}
