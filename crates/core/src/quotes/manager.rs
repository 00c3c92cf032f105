use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::comparison::{QuoteComparison, QuoteScorer};
use super::stats::{seller_quote_stats, SellerQuoteStats};
use super::{CreateQuote, QuoteItemInput, QuoteListFilter, QuoteUpdate};
use crate::acceptance::{complete_acceptance, plan_acceptance, Acceptance, Deal};
use crate::config::NegotiationConfig;
use crate::domain::negotiation::NegotiationStatus;
use crate::domain::order::ConversionSource;
use crate::domain::quote::{Quote, QuoteId, QuoteItem, QuoteStatus};
use crate::domain::rfq::{Rfq, RfqId, RfqStatus};
use crate::domain::seller::VerificationTier;
use crate::domain::UserId;
use crate::errors::{EngineError, EntityKind};
use crate::hooks::OrderConversionHook;
use crate::notify::{dispatch, Notification, NotificationTemplate, Notifier};
use crate::store::{
    MarketplaceStore, Page, Pagination, QuotePatch, QuoteSort, UnitOfWork, WriteOp,
};

pub struct QuoteManager<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
    order_hook: Option<Arc<dyn OrderConversionHook>>,
    settings: NegotiationConfig,
    scorer: QuoteScorer,
}

impl<S: MarketplaceStore> QuoteManager<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>, settings: NegotiationConfig) -> Self {
        Self { store, notifier, order_hook: None, settings, scorer: QuoteScorer::new() }
    }

    pub fn with_order_hook(mut self, order_hook: Arc<dyn OrderConversionHook>) -> Self {
        self.order_hook = Some(order_hook);
        self
    }

    pub async fn create_quote(
        &self,
        seller_id: &UserId,
        request: CreateQuote,
    ) -> Result<Quote, EngineError> {
        let now = Utc::now();
        if request.total_price <= Decimal::ZERO {
            return Err(EngineError::Validation("total_price must be positive".to_string()));
        }
        let valid_until = match request.valid_until {
            Some(valid_until) => ensure_future(valid_until, now)?,
            None => now + Duration::days(i64::from(self.settings.quote_validity_days)),
        };

        let rfq = self.load_rfq(&request.rfq_id).await?;
        if !rfq.is_open_at(now) {
            return Err(EngineError::Conflict(format!(
                "rfq `{}` is not accepting quotes",
                rfq.id.0
            )));
        }
        if self.store.find_active_quote_for_seller(&rfq.id, seller_id).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "seller `{}` already has an active quote on rfq `{}`",
                seller_id.0, rfq.id.0
            )));
        }
        let items = self.build_items(seller_id, &request.items).await?;

        let quote = Quote {
            id: QuoteId(Uuid::new_v4().to_string()),
            rfq_id: rfq.id.clone(),
            seller_id: seller_id.clone(),
            total_price: request.total_price,
            original_price: request.total_price,
            delivery_timeline: request.delivery_timeline,
            terms_conditions: request.terms_conditions,
            proposed_terms: None,
            valid_until,
            status: QuoteStatus::Pending,
            rejection_reason: None,
            items,
            created_at: now,
            updated_at: now,
        };

        let unit = UnitOfWork::new("create_quote", now)
            .with(WriteOp::AssertRfqStatus { rfq_id: rfq.id.clone(), expect: RfqStatus::Active })
            .with(WriteOp::InsertQuote(quote.clone()));
        self.store.apply(unit).await?;

        info!(
            event_name = "quote.created",
            quote_id = %quote.id.0,
            rfq_id = %rfq.id.0,
            seller_id = %seller_id.0,
            total_price = %quote.total_price,
            "quote created"
        );
        dispatch(
            self.notifier.as_ref(),
            Notification::in_app(rfq.buyer_id.clone(), NotificationTemplate::QuoteReceived)
                .with_data("quote_id", quote.id.0.clone())
                .with_data("rfq_id", rfq.id.0.clone())
                .with_data("seller_id", seller_id.0.clone())
                .with_data("total_price", quote.total_price.to_string()),
        );

        Ok(quote)
    }

    pub async fn get_quote(&self, quote_id: &QuoteId) -> Result<Quote, EngineError> {
        self.load_quote(quote_id).await
    }

    pub async fn list_quotes(
        &self,
        filter: &QuoteListFilter,
        sort: QuoteSort,
        pagination: Pagination,
    ) -> Result<Page<Quote>, EngineError> {
        let store_filter = filter.to_store_filter(Utc::now());
        Ok(self.store.list_quotes(&store_filter, sort, pagination.normalized()).await?)
    }

    pub async fn update_quote(
        &self,
        quote_id: &QuoteId,
        seller_id: &UserId,
        update: QuoteUpdate,
    ) -> Result<Quote, EngineError> {
        let now = Utc::now();
        let mut quote = self.load_quote(quote_id).await?;
        ensure_seller(&quote, seller_id)?;
        if quote.status != QuoteStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and can no longer be edited",
                quote.id.0,
                quote.status.as_str()
            )));
        }
        if quote.is_expired_at(now) {
            return Err(EngineError::Expired(format!("quote `{}` has expired", quote.id.0)));
        }
        let rfq = self.load_rfq(&quote.rfq_id).await?;
        if rfq.status != RfqStatus::Active {
            return Err(EngineError::Conflict(format!("rfq `{}` is no longer active", rfq.id.0)));
        }
        if update.is_empty() {
            return Ok(quote);
        }

        if let Some(price) = update.total_price {
            if price <= Decimal::ZERO {
                return Err(EngineError::Validation("total_price must be positive".to_string()));
            }
        }
        let valid_until = update.valid_until.map(|at| ensure_future(at, now)).transpose()?;
        let items = match &update.items {
            Some(items) => Some(self.build_items(seller_id, items).await?),
            None => None,
        };

        let patch = QuotePatch {
            total_price: update.total_price,
            original_price: update.total_price,
            delivery_timeline: update.delivery_timeline,
            terms_conditions: update.terms_conditions,
            valid_until,
            items,
            ..QuotePatch::default()
        };
        let unit = UnitOfWork::new("update_quote", now)
            .with(WriteOp::AssertRfqStatus { rfq_id: rfq.id.clone(), expect: RfqStatus::Active })
            .with(WriteOp::UpdateQuote {
                quote_id: quote.id.clone(),
                expect: vec![QuoteStatus::Pending],
                patch: patch.clone(),
            });
        self.store.apply(unit).await?;
        patch.apply_to(&mut quote, now);

        info!(event_name = "quote.updated", quote_id = %quote.id.0, "quote updated");
        dispatch(
            self.notifier.as_ref(),
            Notification::in_app(rfq.buyer_id, NotificationTemplate::QuoteUpdated)
                .with_data("quote_id", quote.id.0.clone())
                .with_data("total_price", quote.total_price.to_string()),
        );

        Ok(quote)
    }

    pub async fn withdraw_quote(
        &self,
        quote_id: &QuoteId,
        seller_id: &UserId,
    ) -> Result<Quote, EngineError> {
        let now = Utc::now();
        let mut quote = self.load_quote(quote_id).await?;
        ensure_seller(&quote, seller_id)?;
        if !quote.can_transition_to(QuoteStatus::Withdrawn) {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and cannot be withdrawn",
                quote.id.0,
                quote.status.as_str()
            )));
        }
        let rfq = self.load_rfq(&quote.rfq_id).await?;

        let patch = QuotePatch {
            status: Some(QuoteStatus::Withdrawn),
            proposed_terms: Some(None),
            ..QuotePatch::default()
        };
        let unit = UnitOfWork::new("withdraw_quote", now)
            .with(WriteOp::UpdateQuote {
                quote_id: quote.id.clone(),
                expect: vec![QuoteStatus::Pending, QuoteStatus::Negotiating],
                patch: patch.clone(),
            })
            .with(WriteOp::CloseOpenNegotiations {
                quote_id: quote.id.clone(),
                to: NegotiationStatus::Rejected,
                response_message: Some("quote withdrawn by seller".to_string()),
            });
        let receipt = self.store.apply(unit).await?;
        patch.apply_to(&mut quote, now);

        info!(
            event_name = "quote.withdrawn",
            quote_id = %quote.id.0,
            closed_negotiations = receipt.closed_negotiations.len(),
            "quote withdrawn"
        );
        dispatch(
            self.notifier.as_ref(),
            Notification::in_app(rfq.buyer_id, NotificationTemplate::QuoteWithdrawn)
                .with_data("quote_id", quote.id.0.clone())
                .with_data("rfq_id", quote.rfq_id.0.clone()),
        );

        Ok(quote)
    }

    pub async fn accept_quote(
        &self,
        quote_id: &QuoteId,
        buyer_id: &UserId,
    ) -> Result<Acceptance, EngineError> {
        let now = Utc::now();
        let quote = self.load_quote(quote_id).await?;
        let rfq = self.load_rfq(&quote.rfq_id).await?;
        ensure_buyer(&rfq, buyer_id)?;
        if quote.status != QuoteStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and cannot be accepted",
                quote.id.0,
                quote.status.as_str()
            )));
        }
        if quote.is_expired_at(now) {
            return Err(EngineError::Expired(format!("quote `{}` has expired", quote.id.0)));
        }
        if rfq.status != RfqStatus::Active {
            return Err(EngineError::Conflict(format!("rfq `{}` is no longer active", rfq.id.0)));
        }

        let deal = Deal {
            price: quote.total_price,
            terms: None,
            entry: None,
            source: ConversionSource::QuoteAcceptance,
        };
        let plan = plan_acceptance(&quote, &rfq, vec![QuoteStatus::Pending], deal, now);
        let receipt = self.store.apply(plan.unit.clone()).await?;

        dispatch(
            self.notifier.as_ref(),
            Notification::in_app(quote.seller_id.clone(), NotificationTemplate::QuoteAccepted)
                .with_data("quote_id", quote.id.0.clone())
                .with_data("rfq_id", rfq.id.0.clone())
                .with_data("final_price", quote.total_price.to_string()),
        );

        Ok(complete_acceptance(
            &self.store,
            self.notifier.as_ref(),
            self.order_hook.as_ref(),
            plan,
            receipt,
        )
        .await)
    }

    pub async fn reject_quote(
        &self,
        quote_id: &QuoteId,
        buyer_id: &UserId,
        reason: Option<String>,
    ) -> Result<Quote, EngineError> {
        let now = Utc::now();
        let mut quote = self.load_quote(quote_id).await?;
        let rfq = self.load_rfq(&quote.rfq_id).await?;
        ensure_buyer(&rfq, buyer_id)?;
        if quote.status != QuoteStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and cannot be rejected",
                quote.id.0,
                quote.status.as_str()
            )));
        }

        let patch = QuotePatch {
            status: Some(QuoteStatus::Rejected),
            rejection_reason: reason.clone(),
            ..QuotePatch::default()
        };
        let unit = UnitOfWork::new("reject_quote", now).with(WriteOp::UpdateQuote {
            quote_id: quote.id.clone(),
            expect: vec![QuoteStatus::Pending],
            patch: patch.clone(),
        });
        self.store.apply(unit).await?;
        patch.apply_to(&mut quote, now);

        info!(event_name = "quote.rejected", quote_id = %quote.id.0, "quote rejected by buyer");
        let mut notification =
            Notification::in_app(quote.seller_id.clone(), NotificationTemplate::QuoteRejected)
                .with_data("quote_id", quote.id.0.clone())
                .with_data("rfq_id", quote.rfq_id.0.clone());
        if let Some(reason) = reason {
            notification = notification.with_data("reason", reason);
        }
        dispatch(self.notifier.as_ref(), notification);

        Ok(quote)
    }

    pub async fn compare_quotes(
        &self,
        rfq_id: &RfqId,
        buyer_id: &UserId,
    ) -> Result<QuoteComparison, EngineError> {
        let now = Utc::now();
        let rfq = self.load_rfq(rfq_id).await?;
        ensure_buyer(&rfq, buyer_id)?;

        let quotes = self.store.list_quotes_for_rfq(rfq_id).await?;
        let mut candidates = Vec::new();
        for quote in quotes
            .into_iter()
            .filter(|quote| quote.status == QuoteStatus::Pending && quote.valid_until > now)
        {
            let tier = self
                .store
                .get_seller_profile(&quote.seller_id)
                .await?
                .map(|profile| profile.verification_tier)
                .unwrap_or(VerificationTier::Basic);
            candidates.push((quote, tier));
        }

        Ok(self.scorer.compare(rfq.id, candidates))
    }

    pub async fn seller_quote_stats(
        &self,
        seller_id: &UserId,
    ) -> Result<SellerQuoteStats, EngineError> {
        let quotes = self.store.list_quotes_for_seller(seller_id).await?;
        Ok(seller_quote_stats(seller_id.clone(), &quotes))
    }

    async fn load_quote(&self, quote_id: &QuoteId) -> Result<Quote, EngineError> {
        self.store
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Quote, quote_id.0.clone()))
    }

    async fn load_rfq(&self, rfq_id: &RfqId) -> Result<Rfq, EngineError> {
        self.store
            .get_rfq(rfq_id)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Rfq, rfq_id.0.clone()))
    }

    /// Validates line items against the seller's catalog and computes line totals.
    async fn build_items(
        &self,
        seller_id: &UserId,
        inputs: &[QuoteItemInput],
    ) -> Result<Vec<QuoteItem>, EngineError> {
        if inputs.is_empty() {
            return Err(EngineError::Validation("a quote needs at least one item".to_string()));
        }

        let mut items = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.quantity == 0 {
                return Err(EngineError::Validation(format!(
                    "item `{}` must have a positive quantity",
                    input.product_id.0
                )));
            }
            if input.unit_price < Decimal::ZERO {
                return Err(EngineError::Validation(format!(
                    "item `{}` has a negative unit price",
                    input.product_id.0
                )));
            }

            // a product outside the seller's active catalog is reported as absent
            let product = self
                .store
                .get_product(&input.product_id)
                .await?
                .filter(|product| &product.seller_id == seller_id && product.active)
                .ok_or_else(|| {
                    EngineError::not_found(EntityKind::Product, input.product_id.0.clone())
                })?;
            if !product.can_supply(input.quantity) {
                return Err(EngineError::Validation(format!(
                    "insufficient stock for product `{}`: requested {}, available {}",
                    product.id.0, input.quantity, product.stock_quantity
                )));
            }

            items.push(QuoteItem::new(input.product_id.clone(), input.quantity, input.unit_price));
        }
        Ok(items)
    }
}

fn ensure_future(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
    if at <= now {
        return Err(EngineError::Validation("valid_until must be in the future".to_string()));
    }
    Ok(at)
}

fn ensure_seller(quote: &Quote, seller_id: &UserId) -> Result<(), EngineError> {
    if &quote.seller_id != seller_id {
        return Err(EngineError::Authorization(format!(
            "`{}` does not own quote `{}`",
            seller_id.0, quote.id.0
        )));
    }
    Ok(())
}

pub(crate) fn ensure_buyer(rfq: &Rfq, buyer_id: &UserId) -> Result<(), EngineError> {
    if &rfq.buyer_id != buyer_id {
        return Err(EngineError::Authorization(format!(
            "`{}` does not own rfq `{}`",
            buyer_id.0, rfq.id.0
        )));
    }
    Ok(())
}
