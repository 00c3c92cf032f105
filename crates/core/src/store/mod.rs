//! Persistence boundary for the quote and negotiation engine.
//!
//! Managers never write records one by one. Every state change is expressed as a
//! [`UnitOfWork`]: an ordered list of guarded writes that the store applies
//! atomically. Each guard names the pre-state it expects; if any guard misses, the
//! whole unit is rolled back and [`StoreError::PreconditionFailed`] is returned.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::negotiation::{NegotiationEntry, NegotiationId, NegotiationStatus};
use crate::domain::order::{OrderId, OrderIntent, OrderIntentId};
use crate::domain::product::{Product, ProductId};
use crate::domain::quote::{Quote, QuoteId, QuoteItem, QuoteStatus};
use crate::domain::rfq::{Rfq, RfqId, RfqStatus};
use crate::domain::seller::SellerProfile;
use crate::domain::UserId;

pub use memory::InMemoryStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Partial update applied to a quote by [`WriteOp::UpdateQuote`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuotePatch {
    pub status: Option<QuoteStatus>,
    pub total_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub delivery_timeline: Option<String>,
    pub terms_conditions: Option<String>,
    /// `Some(None)` clears the field.
    pub proposed_terms: Option<Option<String>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub items: Option<Vec<QuoteItem>>,
}

impl QuotePatch {
    pub fn status(status: QuoteStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn apply_to(&self, quote: &mut Quote, at: DateTime<Utc>) {
        if let Some(status) = self.status {
            quote.status = status;
        }
        if let Some(total_price) = self.total_price {
            quote.total_price = total_price;
        }
        if let Some(original_price) = self.original_price {
            quote.original_price = original_price;
        }
        if let Some(delivery_timeline) = &self.delivery_timeline {
            quote.delivery_timeline = Some(delivery_timeline.clone());
        }
        if let Some(terms_conditions) = &self.terms_conditions {
            quote.terms_conditions = Some(terms_conditions.clone());
        }
        if let Some(proposed_terms) = &self.proposed_terms {
            quote.proposed_terms = proposed_terms.clone();
        }
        if let Some(valid_until) = self.valid_until {
            quote.valid_until = valid_until;
        }
        if let Some(rejection_reason) = &self.rejection_reason {
            quote.rejection_reason = Some(rejection_reason.clone());
        }
        if let Some(items) = &self.items {
            quote.items = items.clone();
        }
        quote.updated_at = at;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Fails when the RFQ is missing or not in `expect`.
    AssertRfqStatus { rfq_id: RfqId, expect: RfqStatus },
    /// Fails when the seller already holds a non-withdrawn quote on the same RFQ.
    InsertQuote(Quote),
    /// Fails unless the quote's current status is one of `expect`.
    UpdateQuote { quote_id: QuoteId, expect: Vec<QuoteStatus>, patch: QuotePatch },
    /// Rejects every pending or negotiating quote on the RFQ other than `keep`.
    RejectSiblingQuotes { rfq_id: RfqId, keep: QuoteId, reason: String },
    /// Fails unless the RFQ is currently in `expect`.
    TransitionRfq { rfq_id: RfqId, expect: RfqStatus, to: RfqStatus },
    /// Fails when the quote already carries `max_rounds` entries.
    InsertNegotiation { entry: NegotiationEntry, max_rounds: u32 },
    /// Fails unless the entry is still pending and has not lapsed at the unit's time.
    ResolveNegotiation {
        negotiation_id: NegotiationId,
        to: NegotiationStatus,
        response_message: Option<String>,
    },
    /// Resolves whatever is still pending on the quote. Never fails on zero rows.
    CloseOpenNegotiations {
        quote_id: QuoteId,
        to: NegotiationStatus,
        response_message: Option<String>,
    },
    InsertOrderIntent(OrderIntent),
}

/// Atomic batch of guarded writes.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitOfWork {
    pub label: &'static str,
    pub at: DateTime<Utc>,
    pub ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new(label: &'static str, at: DateTime<Utc>) -> Self {
        Self { label, at, ops: Vec::new() }
    }

    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedQuote {
    pub quote_id: QuoteId,
    pub seller_id: UserId,
}

/// What a committed unit changed beyond the records it named explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitReceipt {
    pub rejected_quotes: Vec<RejectedQuote>,
    pub closed_negotiations: Vec<NegotiationId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NegotiationExpiry {
    pub expired: Vec<NegotiationId>,
    pub reverted_quotes: Vec<QuoteId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuoteFilter {
    pub rfq_id: Option<RfqId>,
    pub seller_id: Option<UserId>,
    /// Empty means any status.
    pub statuses: Vec<QuoteStatus>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Only quotes with `valid_until` after this instant.
    pub valid_at: Option<DateTime<Utc>>,
}

impl QuoteFilter {
    pub fn matches(&self, quote: &Quote) -> bool {
        self.rfq_id.as_ref().map_or(true, |rfq_id| &quote.rfq_id == rfq_id)
            && self.seller_id.as_ref().map_or(true, |seller_id| &quote.seller_id == seller_id)
            && (self.statuses.is_empty() || self.statuses.contains(&quote.status))
            && self.min_price.map_or(true, |min| quote.total_price >= min)
            && self.max_price.map_or(true, |max| quote.total_price <= max)
            && self.valid_at.map_or(true, |at| quote.valid_until > at)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSortField {
    #[default]
    CreatedAt,
    TotalPrice,
    ValidUntil,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSort {
    pub field: QuoteSortField,
    pub direction: SortDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn normalized(self) -> Self {
        Self { page: self.page.max(1), limit: self.limit.clamp(1, Self::MAX_LIMIT) }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: Self::DEFAULT_LIMIT }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn get_rfq(&self, id: &RfqId) -> Result<Option<Rfq>, StoreError>;
    async fn insert_rfq(&self, rfq: Rfq) -> Result<(), StoreError>;

    async fn get_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError>;
    /// The seller's non-withdrawn quote on the RFQ, if any.
    async fn find_active_quote_for_seller(
        &self,
        rfq_id: &RfqId,
        seller_id: &UserId,
    ) -> Result<Option<Quote>, StoreError>;
    async fn list_quotes(
        &self,
        filter: &QuoteFilter,
        sort: QuoteSort,
        pagination: Pagination,
    ) -> Result<Page<Quote>, StoreError>;
    async fn list_quotes_for_rfq(&self, rfq_id: &RfqId) -> Result<Vec<Quote>, StoreError>;
    async fn list_quotes_for_seller(&self, seller_id: &UserId) -> Result<Vec<Quote>, StoreError>;
    /// Quotes with at least one negotiation entry where the user is the seller or the
    /// RFQ's buyer.
    async fn list_negotiated_quotes_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Quote>, StoreError>;

    async fn get_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<NegotiationEntry>, StoreError>;
    /// Chronological history of a quote.
    async fn list_negotiations_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<NegotiationEntry>, StoreError>;
    /// Pending `counter` entries created before the cutoff and still valid at `now`,
    /// oldest first.
    async fn list_stale_counter_offers(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<NegotiationEntry>, StoreError>;

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;
    async fn upsert_product(&self, product: Product) -> Result<(), StoreError>;
    async fn get_seller_profile(
        &self,
        seller_id: &UserId,
    ) -> Result<Option<SellerProfile>, StoreError>;
    async fn upsert_seller_profile(&self, profile: SellerProfile) -> Result<(), StoreError>;

    async fn list_order_intents_for_rfq(
        &self,
        rfq_id: &RfqId,
    ) -> Result<Vec<OrderIntent>, StoreError>;
    async fn mark_order_materialized(
        &self,
        intent_id: &OrderIntentId,
        order_id: &OrderId,
    ) -> Result<(), StoreError>;

    /// Applies every op of the unit or none of them.
    async fn apply(&self, unit: UnitOfWork) -> Result<UnitReceipt, StoreError>;

    /// Pending entries past `valid_until` become expired; quotes left `negotiating`
    /// without a pending entry drop back to `pending` and lose their proposed terms.
    async fn expire_negotiations(&self, now: DateTime<Utc>)
        -> Result<NegotiationExpiry, StoreError>;
    /// Pending quotes past `valid_until` become expired.
    async fn expire_quotes(&self, now: DateTime<Utc>) -> Result<Vec<QuoteId>, StoreError>;
    /// Active RFQs past `expires_at` become expired.
    async fn expire_rfqs(&self, now: DateTime<Utc>) -> Result<Vec<RfqId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{Pagination, QuoteFilter};
    use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
    use crate::domain::rfq::RfqId;
    use crate::domain::UserId;

    fn quote(price: i64, status: QuoteStatus) -> Quote {
        let now = Utc::now();
        Quote {
            id: QuoteId(format!("Q-{price}")),
            rfq_id: RfqId("RFQ-1".to_string()),
            seller_id: UserId::new("seller-1"),
            total_price: Decimal::new(price, 0),
            original_price: Decimal::new(price, 0),
            delivery_timeline: None,
            terms_conditions: None,
            proposed_terms: None,
            valid_until: now + Duration::days(1),
            status,
            rejection_reason: None,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn filter_combines_status_and_price_range() {
        let filter = QuoteFilter {
            statuses: vec![QuoteStatus::Pending],
            min_price: Some(Decimal::new(1000, 0)),
            max_price: Some(Decimal::new(1500, 0)),
            ..QuoteFilter::default()
        };

        assert!(filter.matches(&quote(1200, QuoteStatus::Pending)));
        assert!(!filter.matches(&quote(1200, QuoteStatus::Rejected)));
        assert!(!filter.matches(&quote(1800, QuoteStatus::Pending)));
    }

    #[test]
    fn pagination_is_clamped() {
        let pagination = Pagination { page: 0, limit: 10_000 }.normalized();
        assert_eq!(pagination, Pagination { page: 1, limit: Pagination::MAX_LIMIT });
        assert_eq!(Pagination { page: 3, limit: 20 }.offset(), 40);
    }
}
