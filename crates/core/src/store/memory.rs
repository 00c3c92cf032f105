use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    MarketplaceStore, NegotiationExpiry, Page, Pagination, QuoteFilter, QuoteSort,
    QuoteSortField, RejectedQuote, SortDirection, StoreError, UnitOfWork, UnitReceipt, WriteOp,
};
use crate::domain::negotiation::{NegotiationEntry, NegotiationId, NegotiationStatus, OfferType};
use crate::domain::order::{OrderId, OrderIntent, OrderIntentId, OrderIntentStatus};
use crate::domain::product::{Product, ProductId};
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::domain::rfq::{Rfq, RfqId, RfqStatus};
use crate::domain::seller::SellerProfile;
use crate::domain::UserId;

#[derive(Clone, Debug, Default)]
struct MemoryState {
    rfqs: HashMap<String, Rfq>,
    /// Insertion order doubles as creation order.
    quotes: Vec<Quote>,
    negotiations: Vec<NegotiationEntry>,
    products: HashMap<String, Product>,
    sellers: HashMap<String, SellerProfile>,
    order_intents: Vec<OrderIntent>,
}

/// Store used by tests and local tooling. A unit of work is applied to a staged copy
/// of the state and only swapped in when every guard held.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a quote without any guard. Test setup only.
    pub async fn insert_quote_unchecked(&self, quote: Quote) {
        self.state.write().await.quotes.push(quote);
    }

    /// Seeds a negotiation entry without any guard. Test setup only.
    pub async fn insert_negotiation_unchecked(&self, entry: NegotiationEntry) {
        self.state.write().await.negotiations.push(entry);
    }
}

fn precondition(message: String) -> StoreError {
    StoreError::PreconditionFailed(message)
}

impl MemoryState {
    fn quote_mut(&mut self, id: &QuoteId) -> Option<&mut Quote> {
        self.quotes.iter_mut().find(|quote| &quote.id == id)
    }

    fn apply_op(
        &mut self,
        op: WriteOp,
        at: DateTime<Utc>,
        receipt: &mut UnitReceipt,
    ) -> Result<(), StoreError> {
        match op {
            WriteOp::AssertRfqStatus { rfq_id, expect } => {
                let rfq = self
                    .rfqs
                    .get(&rfq_id.0)
                    .ok_or_else(|| precondition(format!("rfq `{}` does not exist", rfq_id.0)))?;
                if rfq.status != expect {
                    return Err(precondition(format!(
                        "rfq `{}` is {} rather than {}",
                        rfq_id.0,
                        rfq.status.as_str(),
                        expect.as_str()
                    )));
                }
            }
            WriteOp::InsertQuote(quote) => {
                let duplicate = self.quotes.iter().any(|existing| {
                    existing.rfq_id == quote.rfq_id
                        && existing.seller_id == quote.seller_id
                        && existing.status != QuoteStatus::Withdrawn
                });
                if duplicate {
                    return Err(precondition(format!(
                        "seller `{}` already has an active quote on rfq `{}`",
                        quote.seller_id.0, quote.rfq_id.0
                    )));
                }
                self.quotes.push(quote);
            }
            WriteOp::UpdateQuote { quote_id, expect, patch } => {
                let quote = self.quote_mut(&quote_id).ok_or_else(|| {
                    precondition(format!("quote `{}` does not exist", quote_id.0))
                })?;
                if !expect.contains(&quote.status) {
                    return Err(precondition(format!(
                        "quote `{}` is no longer {}",
                        quote_id.0,
                        expect.iter().map(QuoteStatus::as_str).collect::<Vec<_>>().join("/")
                    )));
                }
                patch.apply_to(quote, at);
            }
            WriteOp::RejectSiblingQuotes { rfq_id, keep, reason } => {
                let mut closed_quotes = Vec::new();
                for quote in self.quotes.iter_mut().filter(|quote| {
                    quote.rfq_id == rfq_id
                        && quote.id != keep
                        && matches!(quote.status, QuoteStatus::Pending | QuoteStatus::Negotiating)
                }) {
                    quote.status = QuoteStatus::Rejected;
                    quote.rejection_reason = Some(reason.clone());
                    quote.updated_at = at;
                    closed_quotes.push(quote.id.clone());
                    receipt.rejected_quotes.push(RejectedQuote {
                        quote_id: quote.id.clone(),
                        seller_id: quote.seller_id.clone(),
                    });
                }
                for entry in self.negotiations.iter_mut().filter(|entry| {
                    entry.status == NegotiationStatus::Pending
                        && closed_quotes.contains(&entry.quote_id)
                }) {
                    entry.status = NegotiationStatus::Rejected;
                    entry.responded_at = Some(at);
                    receipt.closed_negotiations.push(entry.id.clone());
                }
            }
            WriteOp::TransitionRfq { rfq_id, expect, to } => {
                let rfq = self
                    .rfqs
                    .get_mut(&rfq_id.0)
                    .ok_or_else(|| precondition(format!("rfq `{}` does not exist", rfq_id.0)))?;
                if rfq.status != expect {
                    return Err(precondition(format!(
                        "rfq `{}` is no longer {}",
                        rfq_id.0,
                        expect.as_str()
                    )));
                }
                rfq.status = to;
                rfq.updated_at = at;
            }
            WriteOp::InsertNegotiation { entry, max_rounds } => {
                let rounds = self
                    .negotiations
                    .iter()
                    .filter(|existing| existing.quote_id == entry.quote_id)
                    .count();
                if rounds >= max_rounds as usize {
                    return Err(precondition(format!(
                        "quote `{}` reached the negotiation round limit of {max_rounds}",
                        entry.quote_id.0
                    )));
                }
                self.negotiations.push(entry);
            }
            WriteOp::ResolveNegotiation { negotiation_id, to, response_message } => {
                let entry = self
                    .negotiations
                    .iter_mut()
                    .find(|entry| entry.id == negotiation_id)
                    .ok_or_else(|| {
                        precondition(format!("negotiation `{}` does not exist", negotiation_id.0))
                    })?;
                if entry.status != NegotiationStatus::Pending {
                    return Err(precondition(format!(
                        "negotiation `{}` is no longer pending",
                        negotiation_id.0
                    )));
                }
                if entry.is_expired_at(at) {
                    return Err(precondition(format!(
                        "negotiation `{}` lapsed before it was resolved",
                        negotiation_id.0
                    )));
                }
                entry.status = to;
                entry.response_message = response_message;
                entry.responded_at = Some(at);
            }
            WriteOp::CloseOpenNegotiations { quote_id, to, response_message } => {
                for entry in self.negotiations.iter_mut().filter(|entry| {
                    entry.quote_id == quote_id && entry.status == NegotiationStatus::Pending
                }) {
                    entry.status = to;
                    entry.response_message = response_message.clone();
                    entry.responded_at = Some(at);
                    receipt.closed_negotiations.push(entry.id.clone());
                }
            }
            WriteOp::InsertOrderIntent(intent) => self.order_intents.push(intent),
        }
        Ok(())
    }
}

fn sort_quotes(quotes: &mut [Quote], sort: QuoteSort) {
    quotes.sort_by(|left, right| {
        let ordering = match sort.field {
            QuoteSortField::CreatedAt => left.created_at.cmp(&right.created_at),
            QuoteSortField::TotalPrice => left.total_price.cmp(&right.total_price),
            QuoteSortField::ValidUntil => left.valid_until.cmp(&right.valid_until),
        };
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

#[async_trait]
impl MarketplaceStore for InMemoryStore {
    async fn get_rfq(&self, id: &RfqId) -> Result<Option<Rfq>, StoreError> {
        Ok(self.state.read().await.rfqs.get(&id.0).cloned())
    }

    async fn insert_rfq(&self, rfq: Rfq) -> Result<(), StoreError> {
        self.state.write().await.rfqs.insert(rfq.id.0.clone(), rfq);
        Ok(())
    }

    async fn get_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.state.read().await.quotes.iter().find(|quote| &quote.id == id).cloned())
    }

    async fn find_active_quote_for_seller(
        &self,
        rfq_id: &RfqId,
        seller_id: &UserId,
    ) -> Result<Option<Quote>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .quotes
            .iter()
            .find(|quote| {
                &quote.rfq_id == rfq_id
                    && &quote.seller_id == seller_id
                    && quote.status != QuoteStatus::Withdrawn
            })
            .cloned())
    }

    async fn list_quotes(
        &self,
        filter: &QuoteFilter,
        sort: QuoteSort,
        pagination: Pagination,
    ) -> Result<Page<Quote>, StoreError> {
        let pagination = pagination.normalized();
        let mut matching: Vec<Quote> = self
            .state
            .read()
            .await
            .quotes
            .iter()
            .filter(|quote| filter.matches(quote))
            .cloned()
            .collect();
        sort_quotes(&mut matching, sort);

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(Page { items, total, page: pagination.page, limit: pagination.limit })
    }

    async fn list_quotes_for_rfq(&self, rfq_id: &RfqId) -> Result<Vec<Quote>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .quotes
            .iter()
            .filter(|quote| &quote.rfq_id == rfq_id)
            .cloned()
            .collect())
    }

    async fn list_quotes_for_seller(&self, seller_id: &UserId) -> Result<Vec<Quote>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .quotes
            .iter()
            .filter(|quote| &quote.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn list_negotiated_quotes_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Quote>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .quotes
            .iter()
            .filter(|quote| {
                let is_party = &quote.seller_id == user_id
                    || state.rfqs.get(&quote.rfq_id.0).is_some_and(|rfq| &rfq.buyer_id == user_id);
                is_party && state.negotiations.iter().any(|entry| entry.quote_id == quote.id)
            })
            .cloned()
            .collect())
    }

    async fn get_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<NegotiationEntry>, StoreError> {
        Ok(self.state.read().await.negotiations.iter().find(|entry| &entry.id == id).cloned())
    }

    async fn list_negotiations_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<NegotiationEntry>, StoreError> {
        let mut history: Vec<NegotiationEntry> = self
            .state
            .read()
            .await
            .negotiations
            .iter()
            .filter(|entry| &entry.quote_id == quote_id)
            .cloned()
            .collect();
        // stable: equal timestamps keep insertion order
        history.sort_by_key(|entry| entry.created_at);
        Ok(history)
    }

    async fn list_stale_counter_offers(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<NegotiationEntry>, StoreError> {
        let mut candidates: Vec<NegotiationEntry> = self
            .state
            .read()
            .await
            .negotiations
            .iter()
            .filter(|entry| {
                entry.status == NegotiationStatus::Pending
                    && entry.offer_type == OfferType::Counter
                    && entry.created_at < created_before
                    && !entry.is_expired_at(now)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|entry| entry.created_at);
        Ok(candidates)
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.get(&id.0).cloned())
    }

    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        self.state.write().await.products.insert(product.id.0.clone(), product);
        Ok(())
    }

    async fn get_seller_profile(
        &self,
        seller_id: &UserId,
    ) -> Result<Option<SellerProfile>, StoreError> {
        Ok(self.state.read().await.sellers.get(&seller_id.0).cloned())
    }

    async fn upsert_seller_profile(&self, profile: SellerProfile) -> Result<(), StoreError> {
        self.state.write().await.sellers.insert(profile.seller_id.0.clone(), profile);
        Ok(())
    }

    async fn list_order_intents_for_rfq(
        &self,
        rfq_id: &RfqId,
    ) -> Result<Vec<OrderIntent>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .order_intents
            .iter()
            .filter(|intent| &intent.rfq_id == rfq_id)
            .cloned()
            .collect())
    }

    async fn mark_order_materialized(
        &self,
        intent_id: &OrderIntentId,
        order_id: &OrderId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let intent = state
            .order_intents
            .iter_mut()
            .find(|intent| &intent.id == intent_id && intent.status == OrderIntentStatus::Pending)
            .ok_or_else(|| {
                precondition(format!("order intent `{}` is not pending", intent_id.0))
            })?;
        intent.status = OrderIntentStatus::Materialized;
        intent.order_id = Some(order_id.clone());
        Ok(())
    }

    async fn apply(&self, unit: UnitOfWork) -> Result<UnitReceipt, StoreError> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let mut receipt = UnitReceipt::default();

        for op in unit.ops {
            staged.apply_op(op, unit.at, &mut receipt)?;
        }

        *state = staged;
        Ok(receipt)
    }

    async fn expire_negotiations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<NegotiationExpiry, StoreError> {
        let mut state = self.state.write().await;
        let mut expiry = NegotiationExpiry::default();

        for entry in state
            .negotiations
            .iter_mut()
            .filter(|entry| entry.status == NegotiationStatus::Pending && entry.valid_until < now)
        {
            entry.status = NegotiationStatus::Expired;
            entry.responded_at = Some(now);
            expiry.expired.push(entry.id.clone());
        }

        let MemoryState { quotes, negotiations, .. } = &mut *state;
        for quote in quotes.iter_mut().filter(|quote| quote.status == QuoteStatus::Negotiating) {
            let has_live_offer = negotiations.iter().any(|entry| {
                entry.quote_id == quote.id && entry.status == NegotiationStatus::Pending
            });
            if !has_live_offer {
                quote.status = QuoteStatus::Pending;
                quote.proposed_terms = None;
                quote.updated_at = now;
                expiry.reverted_quotes.push(quote.id.clone());
            }
        }

        Ok(expiry)
    }

    async fn expire_quotes(&self, now: DateTime<Utc>) -> Result<Vec<QuoteId>, StoreError> {
        let mut state = self.state.write().await;
        let mut expired = Vec::new();
        for quote in state
            .quotes
            .iter_mut()
            .filter(|quote| quote.status == QuoteStatus::Pending && quote.valid_until < now)
        {
            quote.status = QuoteStatus::Expired;
            quote.updated_at = now;
            expired.push(quote.id.clone());
        }
        Ok(expired)
    }

    async fn expire_rfqs(&self, now: DateTime<Utc>) -> Result<Vec<RfqId>, StoreError> {
        let mut state = self.state.write().await;
        let mut expired = Vec::new();
        for rfq in state
            .rfqs
            .values_mut()
            .filter(|rfq| rfq.status == RfqStatus::Active && rfq.expires_at < now)
        {
            rfq.status = RfqStatus::Expired;
            rfq.updated_at = now;
            expired.push(rfq.id.clone());
        }
        expired.sort_by(|left, right| left.0.cmp(&right.0));
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::InMemoryStore;
    use crate::domain::negotiation::{NegotiationEntry, NegotiationId, NegotiationStatus, OfferType};
    use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
    use crate::domain::rfq::{Rfq, RfqId, RfqStatus};
    use crate::domain::UserId;
    use crate::store::{MarketplaceStore, QuotePatch, StoreError, UnitOfWork, WriteOp};

    fn rfq() -> Rfq {
        let now = Utc::now();
        Rfq {
            id: RfqId("RFQ-1".to_string()),
            buyer_id: UserId::new("buyer-1"),
            category_id: "packaging".to_string(),
            title: "Boxes".to_string(),
            quantity: 100,
            budget_min: None,
            budget_max: None,
            delivery_timeline: None,
            status: RfqStatus::Active,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    fn quote(id: &str, seller: &str, status: QuoteStatus) -> Quote {
        let now = Utc::now();
        Quote {
            id: QuoteId(id.to_string()),
            rfq_id: RfqId("RFQ-1".to_string()),
            seller_id: UserId::new(seller),
            total_price: Decimal::new(1000, 0),
            original_price: Decimal::new(1000, 0),
            delivery_timeline: None,
            terms_conditions: None,
            proposed_terms: None,
            valid_until: now + Duration::days(30),
            status,
            rejection_reason: None,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn counter(id: &str, quote_id: &str, valid_for: Duration) -> NegotiationEntry {
        let now = Utc::now();
        NegotiationEntry {
            id: NegotiationId(id.to_string()),
            quote_id: QuoteId(quote_id.to_string()),
            from_user_id: UserId::new("buyer-1"),
            to_user_id: UserId::new("seller-1"),
            offer_type: OfferType::Counter,
            price: Decimal::new(900, 0),
            terms: None,
            message: None,
            response_message: None,
            status: NegotiationStatus::Pending,
            valid_until: now + valid_for,
            created_at: now,
            responded_at: None,
        }
    }

    #[tokio::test]
    async fn failed_guard_rolls_back_earlier_ops() {
        let store = InMemoryStore::new();
        store.insert_rfq(rfq()).await.expect("rfq");
        store.insert_quote_unchecked(quote("Q-1", "seller-1", QuoteStatus::Pending)).await;

        let unit = UnitOfWork::new("test", Utc::now())
            .with(WriteOp::UpdateQuote {
                quote_id: QuoteId("Q-1".to_string()),
                expect: vec![QuoteStatus::Pending],
                patch: QuotePatch::status(QuoteStatus::Accepted),
            })
            .with(WriteOp::TransitionRfq {
                rfq_id: RfqId("RFQ-1".to_string()),
                expect: RfqStatus::Expired,
                to: RfqStatus::Completed,
            });

        let error = store.apply(unit).await.expect_err("rfq guard must miss");
        assert!(matches!(error, StoreError::PreconditionFailed(_)));

        let quote = store.get_quote(&QuoteId("Q-1".to_string())).await.expect("read");
        assert_eq!(quote.map(|quote| quote.status), Some(QuoteStatus::Pending));
    }

    #[tokio::test]
    async fn insert_quote_rejects_second_active_quote_for_seller() {
        let store = InMemoryStore::new();
        store.insert_quote_unchecked(quote("Q-1", "seller-1", QuoteStatus::Withdrawn)).await;

        let first = UnitOfWork::new("create", Utc::now())
            .with(WriteOp::InsertQuote(quote("Q-2", "seller-1", QuoteStatus::Pending)));
        store.apply(first).await.expect("withdrawn quote does not block");

        let second = UnitOfWork::new("create", Utc::now())
            .with(WriteOp::InsertQuote(quote("Q-3", "seller-1", QuoteStatus::Pending)));
        assert!(store.apply(second).await.is_err());
    }

    #[tokio::test]
    async fn resolving_a_lapsed_offer_misses_the_guard() {
        let store = InMemoryStore::new();
        store.insert_negotiation_unchecked(counter("N-1", "Q-1", Duration::hours(-1))).await;

        let unit = UnitOfWork::new("accept", Utc::now()).with(WriteOp::ResolveNegotiation {
            negotiation_id: NegotiationId("N-1".to_string()),
            to: NegotiationStatus::Accepted,
            response_message: None,
        });
        let error = store.apply(unit).await.expect_err("lapsed entry must not resolve");
        assert!(matches!(error, StoreError::PreconditionFailed(_)));

        let entry = store.get_negotiation(&NegotiationId("N-1".to_string())).await.expect("read");
        assert_eq!(entry.map(|entry| entry.status), Some(NegotiationStatus::Pending));
    }

    #[tokio::test]
    async fn negotiation_expiry_reverts_only_quotes_without_live_offers() {
        let store = InMemoryStore::new();
        store.insert_quote_unchecked(quote("Q-1", "seller-1", QuoteStatus::Negotiating)).await;
        store.insert_quote_unchecked(quote("Q-2", "seller-2", QuoteStatus::Negotiating)).await;
        store.insert_negotiation_unchecked(counter("N-1", "Q-1", Duration::hours(-1))).await;
        store.insert_negotiation_unchecked(counter("N-2", "Q-2", Duration::hours(5))).await;

        let expiry = store.expire_negotiations(Utc::now()).await.expect("sweep");
        assert_eq!(expiry.expired, vec![NegotiationId("N-1".to_string())]);
        assert_eq!(expiry.reverted_quotes, vec![QuoteId("Q-1".to_string())]);

        let again = store.expire_negotiations(Utc::now()).await.expect("second sweep");
        assert!(again.expired.is_empty());
        assert!(again.reverted_quotes.is_empty());
    }
}
