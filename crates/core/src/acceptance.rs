//! The single atomic path that turns a quote (or a counter-offer on it) into a deal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::negotiation::{NegotiationId, NegotiationStatus};
use crate::domain::order::{
    ConversionSource, OrderId, OrderIntent, OrderIntentId, OrderIntentStatus,
};
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::domain::rfq::{Rfq, RfqStatus};
use crate::errors::EngineError;
use crate::hooks::OrderConversionHook;
use crate::notify::{dispatch, Notification, NotificationTemplate, Notifier};
use crate::store::{MarketplaceStore, QuotePatch, UnitOfWork, UnitReceipt, WriteOp};

pub const SIBLING_REJECTION_REASON: &str = "another quote was accepted";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    pub quote: Quote,
    pub order_intent: OrderIntent,
    pub rejected_quotes: Vec<QuoteId>,
    /// Set once the order hook materialized the intent.
    pub order_id: Option<OrderId>,
}

pub(crate) struct AcceptancePlan {
    pub unit: UnitOfWork,
    pub quote: Quote,
    pub intent: OrderIntent,
}

/// Agreed price and terms, plus the negotiation entry that produced them if any.
pub(crate) struct Deal<'a> {
    pub price: Decimal,
    pub terms: Option<String>,
    pub entry: Option<&'a NegotiationId>,
    pub source: ConversionSource,
}

/// Builds the unit that accepts `quote` on the given deal: resolves the accepted
/// negotiation entry, accepts the quote, rejects its siblings, completes the RFQ and
/// records the order intent.
pub(crate) fn plan_acceptance(
    quote: &Quote,
    rfq: &Rfq,
    expect: Vec<QuoteStatus>,
    deal: Deal<'_>,
    now: DateTime<Utc>,
) -> AcceptancePlan {
    let Deal { price: final_price, terms, entry: accepted_entry, source } = deal;
    let patch = QuotePatch {
        status: Some(QuoteStatus::Accepted),
        total_price: Some(final_price),
        terms_conditions: terms,
        proposed_terms: Some(None),
        ..QuotePatch::default()
    };
    let mut accepted = quote.clone();
    patch.apply_to(&mut accepted, now);

    let intent = OrderIntent {
        id: OrderIntentId(Uuid::new_v4().to_string()),
        rfq_id: rfq.id.clone(),
        quote_id: quote.id.clone(),
        buyer_id: rfq.buyer_id.clone(),
        seller_id: quote.seller_id.clone(),
        final_price,
        terms: accepted.terms_conditions.clone(),
        source,
        status: OrderIntentStatus::Pending,
        order_id: None,
        created_at: now,
    };

    let mut unit = UnitOfWork::new(source.as_str(), now);
    if let Some(negotiation_id) = accepted_entry {
        unit = unit.with(WriteOp::ResolveNegotiation {
            negotiation_id: negotiation_id.clone(),
            to: NegotiationStatus::Accepted,
            response_message: None,
        });
    }
    unit = unit
        .with(WriteOp::UpdateQuote { quote_id: quote.id.clone(), expect, patch })
        .with(WriteOp::RejectSiblingQuotes {
            rfq_id: rfq.id.clone(),
            keep: quote.id.clone(),
            reason: SIBLING_REJECTION_REASON.to_string(),
        })
        .with(WriteOp::TransitionRfq {
            rfq_id: rfq.id.clone(),
            expect: RfqStatus::Active,
            to: RfqStatus::Completed,
        })
        .with(WriteOp::InsertOrderIntent(intent.clone()));

    AcceptancePlan { unit, quote: accepted, intent }
}

/// Post-commit side effects: sibling notifications and order materialization. Nothing
/// here can undo the committed acceptance.
pub(crate) async fn complete_acceptance<S: MarketplaceStore>(
    store: &S,
    notifier: &dyn Notifier,
    order_hook: Option<&Arc<dyn OrderConversionHook>>,
    plan: AcceptancePlan,
    receipt: UnitReceipt,
) -> Acceptance {
    let AcceptancePlan { quote, intent, .. } = plan;

    for rejected in &receipt.rejected_quotes {
        dispatch(
            notifier,
            Notification::in_app(rejected.seller_id.clone(), NotificationTemplate::QuoteRejected)
                .with_data("quote_id", rejected.quote_id.0.clone())
                .with_data("rfq_id", quote.rfq_id.0.clone())
                .with_data("reason", SIBLING_REJECTION_REASON),
        );
    }

    let order_id = match order_hook {
        Some(hook) => materialize(store, hook.as_ref(), &intent).await,
        None => None,
    };

    info!(
        event_name = "quote.accepted",
        quote_id = %quote.id.0,
        rfq_id = %quote.rfq_id.0,
        source = intent.source.as_str(),
        final_price = %intent.final_price,
        rejected_siblings = receipt.rejected_quotes.len(),
        "quote accepted"
    );

    Acceptance {
        quote,
        rejected_quotes: receipt.rejected_quotes.into_iter().map(|r| r.quote_id).collect(),
        order_intent: intent,
        order_id,
    }
}

async fn materialize<S: MarketplaceStore>(
    store: &S,
    hook: &dyn OrderConversionHook,
    intent: &OrderIntent,
) -> Option<OrderId> {
    let order_id = match hook.materialize_order(intent).await {
        Ok(order_id) => order_id,
        Err(error) => {
            warn!(
                event_name = "order.materialize_failed",
                quote_id = %intent.quote_id.0,
                order_intent_id = %intent.id.0,
                error = %error,
                "order hook failed; intent left pending"
            );
            return None;
        }
    };

    if let Err(error) = store.mark_order_materialized(&intent.id, &order_id).await {
        warn!(
            event_name = "order.mark_materialized_failed",
            order_intent_id = %intent.id.0,
            order_id = %order_id.0,
            error = %EngineError::from(error),
            "order created but intent status was not updated"
        );
    }

    Some(order_id)
}
