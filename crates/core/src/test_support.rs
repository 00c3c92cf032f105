//! Fixtures shared by the inline manager tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::config::NegotiationConfig;
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::domain::rfq::{Rfq, RfqId, RfqStatus};
use crate::domain::UserId;
use crate::negotiation::NegotiationManager;
use crate::notify::InMemoryNotifier;
use crate::quotes::QuoteManager;
use crate::store::{InMemoryStore, MarketplaceStore};

pub(crate) const BUYER: &str = "buyer-1";
pub(crate) const RFQ: &str = "RFQ-1";

pub(crate) fn rfq_at(now: DateTime<Utc>) -> Rfq {
    Rfq {
        id: RfqId(RFQ.to_string()),
        buyer_id: UserId::new(BUYER),
        category_id: "packaging".to_string(),
        title: "Corrugated boxes".to_string(),
        quantity: 500,
        budget_min: None,
        budget_max: Some(Decimal::new(2000, 0)),
        delivery_timeline: None,
        status: RfqStatus::Active,
        expires_at: now + Duration::days(7),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn quote_at(id: &str, seller: &str, price: i64, now: DateTime<Utc>) -> Quote {
    Quote {
        id: QuoteId(id.to_string()),
        rfq_id: RfqId(RFQ.to_string()),
        seller_id: UserId::new(seller),
        total_price: Decimal::new(price, 0),
        original_price: Decimal::new(price, 0),
        delivery_timeline: Some("7 days".to_string()),
        terms_conditions: Some("net 30".to_string()),
        proposed_terms: None,
        valid_until: now + Duration::days(30),
        status: QuoteStatus::Pending,
        rejection_reason: None,
        items: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) struct Harness {
    pub store: InMemoryStore,
    pub notifier: InMemoryNotifier,
    pub quotes: QuoteManager<InMemoryStore>,
    pub negotiations: NegotiationManager<InMemoryStore>,
}

/// One active RFQ owned by `buyer-1` with the given `(quote id, seller, price)` quotes.
pub(crate) async fn harness(quotes: &[(&str, &str, i64)]) -> Harness {
    let now = Utc::now();
    let store = InMemoryStore::new();
    store.insert_rfq(rfq_at(now)).await.expect("seed rfq");
    for (id, seller, price) in quotes {
        store.insert_quote_unchecked(quote_at(id, seller, *price, now)).await;
    }

    let notifier = InMemoryNotifier::default();
    let shared: Arc<dyn crate::notify::Notifier> = Arc::new(notifier.clone());
    Harness {
        quotes: QuoteManager::new(store.clone(), shared.clone(), NegotiationConfig::default()),
        negotiations: NegotiationManager::new(store.clone(), shared, NegotiationConfig::default()),
        store,
        notifier,
    }
}

pub(crate) fn buyer() -> UserId {
    UserId::new(BUYER)
}

pub(crate) fn quote_id(id: &str) -> QuoteId {
    QuoteId(id.to_string())
}
