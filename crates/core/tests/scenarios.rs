use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use souk_core::config::{AutoConversionConfig, NegotiationConfig};
use souk_core::{
    CounterOffer, CounterOfferResponse, ErrorKind, InMemoryNotifier, InMemoryStore,
    MarketplaceStore, NegotiationEntry, NegotiationId, NegotiationManager, NegotiationStatus,
    Notifier, OfferType, Quote, QuoteId, QuoteManager, QuoteStatus, ResponseOutcome, Rfq, RfqId,
    RfqStatus, SellerProfile, Sweeper, UserId, VerificationTier,
};

struct Market {
    store: InMemoryStore,
    quotes: QuoteManager<InMemoryStore>,
    negotiations: NegotiationManager<InMemoryStore>,
    sweeper: Sweeper<InMemoryStore>,
}

fn market() -> Market {
    let store = InMemoryStore::new();
    let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::default());
    let settings = NegotiationConfig::default();
    let quotes = QuoteManager::new(store.clone(), notifier.clone(), settings.clone());
    let negotiations = NegotiationManager::new(store.clone(), notifier.clone(), settings.clone());
    let sweeper = Sweeper::new(
        store.clone(),
        NegotiationManager::new(store.clone(), notifier, settings),
        AutoConversionConfig::default(),
    );
    Market { store, quotes, negotiations, sweeper }
}

fn buyer() -> UserId {
    UserId::new("buyer-acme")
}

fn rfq_id() -> RfqId {
    RfqId("RFQ-100".to_string())
}

fn quote_a() -> QuoteId {
    QuoteId("Q-A".to_string())
}

fn rfq(now: DateTime<Utc>) -> Rfq {
    Rfq {
        id: rfq_id(),
        buyer_id: buyer(),
        category_id: "industrial-fasteners".to_string(),
        title: "M8 stainless bolts".to_string(),
        quantity: 10_000,
        budget_min: Some(Decimal::new(1000, 0)),
        budget_max: Some(Decimal::new(2000, 0)),
        delivery_timeline: Some("2 weeks".to_string()),
        status: RfqStatus::Active,
        expires_at: now + Duration::days(14),
        created_at: now,
        updated_at: now,
    }
}

fn quote(id: &str, seller: &str, price: i64, now: DateTime<Utc>) -> Quote {
    Quote {
        id: QuoteId(id.to_string()),
        rfq_id: rfq_id(),
        seller_id: UserId::new(seller),
        total_price: Decimal::new(price, 0),
        original_price: Decimal::new(price, 0),
        delivery_timeline: Some("7 days".to_string()),
        terms_conditions: Some("FOB, net 30".to_string()),
        proposed_terms: None,
        valid_until: now + Duration::days(30),
        status: QuoteStatus::Pending,
        rejection_reason: None,
        items: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn entry(
    id: &str,
    quote_id: &str,
    status: NegotiationStatus,
    valid_until: DateTime<Utc>,
) -> NegotiationEntry {
    NegotiationEntry {
        id: NegotiationId(id.to_string()),
        quote_id: QuoteId(quote_id.to_string()),
        from_user_id: buyer(),
        to_user_id: UserId::new("seller-a"),
        offer_type: OfferType::Counter,
        price: Decimal::new(1500, 0),
        terms: None,
        message: None,
        response_message: None,
        status,
        valid_until,
        created_at: valid_until - Duration::hours(24),
        responded_at: None,
    }
}

async fn seeded(quotes: &[(&str, &str, i64)]) -> Market {
    let now = Utc::now();
    let market = market();
    market.store.insert_rfq(rfq(now)).await.expect("seed rfq");
    for (id, seller, price) in quotes {
        market.store.insert_quote_unchecked(quote(id, seller, *price, now)).await;
    }
    market
}

#[tokio::test]
async fn counter_offer_accepted_by_seller_completes_the_rfq() {
    let market = seeded(&[("Q-A", "seller-a", 1800)]).await;

    let counter = market
        .negotiations
        .create_counter_offer(
            &buyer(),
            &quote_a(),
            CounterOffer::at_price(Decimal::new(1500, 0)),
        )
        .await
        .expect("buyer counters");

    let outcome = market
        .negotiations
        .respond_to_counter_offer(
            &UserId::new("seller-a"),
            &counter.id,
            CounterOfferResponse::Accept,
        )
        .await
        .expect("seller accepts");
    let ResponseOutcome::Converted(acceptance) = outcome else {
        panic!("expected the counter to convert");
    };

    assert_eq!(acceptance.quote.status, QuoteStatus::Accepted);
    assert_eq!(acceptance.quote.total_price, Decimal::new(1500, 0));
    assert_eq!(acceptance.order_intent.final_price, Decimal::new(1500, 0));

    let rfq = market.store.get_rfq(&rfq_id()).await.expect("read").expect("rfq");
    assert_eq!(rfq.status, RfqStatus::Completed);
}

#[tokio::test]
async fn sixth_counter_offer_is_a_conflict() {
    let now = Utc::now();
    let market = seeded(&[("Q-A", "seller-a", 1800)]).await;
    for round in 1..=5 {
        market
            .store
            .insert_negotiation_unchecked(entry(
                &format!("N-{round}"),
                "Q-A",
                NegotiationStatus::Rejected,
                now + Duration::hours(round),
            ))
            .await;
    }

    let error = market
        .negotiations
        .create_counter_offer(
            &buyer(),
            &quote_a(),
            CounterOffer::at_price(Decimal::new(1400, 0)),
        )
        .await
        .expect_err("round limit");
    assert_eq!(error.kind(), ErrorKind::Conflict);

    let history = market.store.list_negotiations_for_quote(&quote_a()).await.expect("history");
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn lapsed_counter_is_expired_by_the_sweep() {
    let now = Utc::now();
    let market = market();
    market.store.insert_rfq(rfq(now)).await.expect("seed rfq");
    let mut negotiating = quote("Q-A", "seller-a", 1800, now);
    negotiating.status = QuoteStatus::Negotiating;
    market.store.insert_quote_unchecked(negotiating).await;
    market
        .store
        .insert_negotiation_unchecked(entry(
            "N-1",
            "Q-A",
            NegotiationStatus::Pending,
            now - Duration::hours(1),
        ))
        .await;

    let report = market.sweeper.run_sweep().await.expect("sweep");
    assert_eq!(report.negotiations.expired_negotiations, vec![NegotiationId("N-1".to_string())]);

    let lapsed = market
        .store
        .get_negotiation(&NegotiationId("N-1".to_string()))
        .await
        .expect("read")
        .expect("entry");
    assert_eq!(lapsed.status, NegotiationStatus::Expired);
    let reverted = market.store.get_quote(&quote_a()).await.expect("read").expect("quote");
    assert_eq!(reverted.status, QuoteStatus::Pending);

    let again = market.sweeper.run_sweep().await.expect("second sweep");
    assert_eq!(again.total_changes(), 0);
}

#[tokio::test]
async fn cheaper_premium_quote_is_best_value() {
    let market = seeded(&[("Q-PREMIUM", "seller-a", 1200), ("Q-BASIC", "seller-b", 1500)]).await;
    let tiers = [("seller-a", VerificationTier::Premium), ("seller-b", VerificationTier::Basic)];
    for (seller, tier) in tiers {
        market
            .store
            .upsert_seller_profile(SellerProfile {
                seller_id: UserId::new(seller),
                display_name: seller.to_string(),
                verification_tier: tier,
            })
            .await
            .expect("seed profile");
    }

    let comparison = market.quotes.compare_quotes(&rfq_id(), &buyer()).await.expect("compare");

    assert_eq!(comparison.best_value, Some(QuoteId("Q-PREMIUM".to_string())));
    assert!(comparison.quotes[0].is_best_value);
    assert!(comparison.quotes[0].score.total > comparison.quotes[1].score.total);
}

#[tokio::test]
async fn concurrent_acceptances_produce_a_single_winner() {
    let market = seeded(&[("Q-A", "seller-a", 1800), ("Q-B", "seller-b", 1700)]).await;
    let quote_a = QuoteId("Q-A".to_string());
    let quote_b = QuoteId("Q-B".to_string());
    let buyer = buyer();

    let (first, second) = tokio::join!(
        market.quotes.accept_quote(&quote_a, &buyer),
        market.quotes.accept_quote(&quote_b, &buyer),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = first.err().or(second.err()).expect("one acceptance loses");
    assert_eq!(loser.kind(), ErrorKind::Conflict);

    let quotes = market.store.list_quotes_for_rfq(&rfq_id()).await.expect("quotes");
    assert_eq!(quotes.iter().filter(|quote| quote.status == QuoteStatus::Accepted).count(), 1);
    let intents = market.store.list_order_intents_for_rfq(&rfq_id()).await.expect("intents");
    assert_eq!(intents.len(), 1);
}

#[tokio::test]
async fn accepting_the_same_quote_twice_conflicts() {
    let market = seeded(&[("Q-A", "seller-a", 1800)]).await;
    let quote_id = QuoteId("Q-A".to_string());
    let buyer = buyer();

    let (first, second) = tokio::join!(
        market.quotes.accept_quote(&quote_id, &buyer),
        market.quotes.accept_quote(&quote_id, &buyer),
    );

    assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = first.err().or(second.err()).expect("one acceptance loses");
    assert_eq!(loser.kind(), ErrorKind::Conflict);
}
