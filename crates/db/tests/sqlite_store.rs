use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use souk_core::config::{AutoConversionConfig, NegotiationConfig};
use souk_core::store::{QuotePatch, QuoteSort, QuoteSortField, SortDirection, UnitOfWork, WriteOp};
use souk_core::{
    CounterOffer, CounterOfferResponse, ErrorKind, InMemoryNotifier, InMemoryOrderHook,
    MarketplaceStore, NegotiationEntry, NegotiationId, NegotiationManager, NegotiationStatus,
    Notifier, OfferType, OrderConversionHook, OrderIntentStatus, Pagination, QuoteId,
    QuoteListFilter, QuoteManager, QuoteStatus, RfqId, RfqStatus, StoreError, Sweeper, UserId,
};
use souk_db::fixtures::{DEMO_BUYER_ID, DEMO_RFQ_ID};
use souk_db::{connect_with_settings, migrations, DemoSeedDataset, SqliteStore};

const PREMIUM_QUOTE: &str = "quote-demo-001";
const BASIC_QUOTE: &str = "quote-demo-002";

async fn memory_store() -> SqliteStore {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    SqliteStore::new(pool)
}

async fn seeded_store(now: DateTime<Utc>) -> SqliteStore {
    let store = memory_store().await;
    DemoSeedDataset::load(&store, now).await.expect("seed");
    store
}

fn buyer() -> UserId {
    UserId::new(DEMO_BUYER_ID)
}

fn rfq_id() -> RfqId {
    RfqId(DEMO_RFQ_ID.to_string())
}

fn quote_id(id: &str) -> QuoteId {
    QuoteId(id.to_string())
}

fn counter_entry(id: &str, status: NegotiationStatus, now: DateTime<Utc>) -> NegotiationEntry {
    NegotiationEntry {
        id: NegotiationId(id.to_string()),
        quote_id: quote_id(BASIC_QUOTE),
        from_user_id: buyer(),
        to_user_id: UserId::new("seller-demo-basic"),
        offer_type: OfferType::Counter,
        price: Decimal::new(1400, 0),
        terms: None,
        message: None,
        response_message: None,
        status,
        valid_until: now + Duration::hours(24),
        created_at: now,
        responded_at: None,
    }
}

#[tokio::test]
async fn quote_round_trips_with_items_and_exact_prices() {
    let store = seeded_store(Utc::now()).await;

    let quote = store.get_quote(&quote_id(PREMIUM_QUOTE)).await.expect("read").expect("exists");

    assert_eq!(quote.status, QuoteStatus::Pending);
    assert_eq!(quote.total_price, Decimal::new(1200, 0));
    assert_eq!(quote.original_price, Decimal::new(1200, 0));
    assert_eq!(quote.items.len(), 1);
    assert_eq!(quote.items[0].quantity, 100);
    assert_eq!(quote.items[0].unit_price, Decimal::new(12, 0));
    assert_eq!(quote.proposed_terms, None);
}

#[tokio::test]
async fn failed_guard_rolls_back_the_whole_unit() {
    let now = Utc::now();
    let store = seeded_store(now).await;

    let unit = UnitOfWork::new("test", now)
        .with(WriteOp::UpdateQuote {
            quote_id: quote_id(PREMIUM_QUOTE),
            expect: vec![QuoteStatus::Pending],
            patch: QuotePatch::status(QuoteStatus::Withdrawn),
        })
        .with(WriteOp::TransitionRfq {
            rfq_id: rfq_id(),
            expect: RfqStatus::Completed,
            to: RfqStatus::Expired,
        });

    let error = store.apply(unit).await.expect_err("rfq guard should miss");
    assert!(matches!(error, StoreError::PreconditionFailed(_)));

    let quote = store.get_quote(&quote_id(PREMIUM_QUOTE)).await.expect("read").expect("exists");
    assert_eq!(quote.status, QuoteStatus::Pending);
}

#[tokio::test]
async fn second_active_quote_from_the_same_seller_is_refused_until_withdrawn() {
    let now = Utc::now();
    let store = seeded_store(now).await;
    let mut duplicate =
        store.get_quote(&quote_id(PREMIUM_QUOTE)).await.expect("read").expect("exists");
    duplicate.id = quote_id("quote-demo-dup");

    let error = store
        .apply(UnitOfWork::new("test", now).with(WriteOp::InsertQuote(duplicate.clone())))
        .await
        .expect_err("duplicate");
    assert!(matches!(error, StoreError::PreconditionFailed(_)));

    store
        .apply(UnitOfWork::new("test", now).with(WriteOp::UpdateQuote {
            quote_id: quote_id(PREMIUM_QUOTE),
            expect: vec![QuoteStatus::Pending],
            patch: QuotePatch::status(QuoteStatus::Withdrawn),
        }))
        .await
        .expect("withdraw");
    store
        .apply(UnitOfWork::new("test", now).with(WriteOp::InsertQuote(duplicate)))
        .await
        .expect("slot is free after withdrawal");
}

#[tokio::test]
async fn negotiation_inserts_are_bounded_and_single_live() {
    let now = Utc::now();
    let store = seeded_store(now).await;

    for index in 0..5 {
        let entry = counter_entry(&format!("N-{index}"), NegotiationStatus::Rejected, now);
        store
            .apply(
                UnitOfWork::new("test", now)
                    .with(WriteOp::InsertNegotiation { entry, max_rounds: 5 }),
            )
            .await
            .expect("within the round limit");
    }
    let sixth = counter_entry("N-5", NegotiationStatus::Pending, now);
    let error = store
        .apply(
            UnitOfWork::new("test", now)
                .with(WriteOp::InsertNegotiation { entry: sixth, max_rounds: 5 }),
        )
        .await
        .expect_err("round limit");
    assert!(matches!(error, StoreError::PreconditionFailed(_)));
    let history = store.list_negotiations_for_quote(&quote_id(BASIC_QUOTE)).await.expect("list");
    assert_eq!(history.len(), 5);

    let live = counter_entry("N-live", NegotiationStatus::Pending, now);
    store
        .apply(
            UnitOfWork::new("test", now)
                .with(WriteOp::InsertNegotiation { entry: live, max_rounds: 10 }),
        )
        .await
        .expect("first live entry");
    let second_live = counter_entry("N-live-2", NegotiationStatus::Pending, now);
    let error = store
        .apply(UnitOfWork::new("test", now).with(WriteOp::InsertNegotiation {
            entry: second_live,
            max_rounds: 10,
        }))
        .await
        .expect_err("second live entry");
    assert!(matches!(error, StoreError::PreconditionFailed(_)));
}

#[tokio::test]
async fn counter_offer_acceptance_converts_through_sqlite() {
    let store = seeded_store(Utc::now()).await;
    let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::default());
    let hook = Arc::new(InMemoryOrderHook::default());
    let negotiations =
        NegotiationManager::new(store.clone(), notifier, NegotiationConfig::default())
            .with_order_hook(hook.clone() as Arc<dyn OrderConversionHook>);

    let entry = negotiations
        .create_counter_offer(
            &buyer(),
            &quote_id(BASIC_QUOTE),
            CounterOffer::at_price(Decimal::new(1400, 0)),
        )
        .await
        .expect("counter");
    let negotiating = store.get_quote(&quote_id(BASIC_QUOTE)).await.expect("read").expect("exists");
    assert_eq!(negotiating.status, QuoteStatus::Negotiating);

    let outcome = negotiations
        .respond_to_counter_offer(
            &UserId::new("seller-demo-basic"),
            &entry.id,
            CounterOfferResponse::Accept,
        )
        .await
        .expect("accept");
    assert!(outcome.converted());

    let accepted = store.get_quote(&quote_id(BASIC_QUOTE)).await.expect("read").expect("exists");
    assert_eq!(accepted.status, QuoteStatus::Accepted);
    assert_eq!(accepted.total_price, Decimal::new(1400, 0));
    assert_eq!(accepted.original_price, Decimal::new(1500, 0));

    let sibling = store.get_quote(&quote_id(PREMIUM_QUOTE)).await.expect("read").expect("exists");
    assert_eq!(sibling.status, QuoteStatus::Rejected);
    let rfq = store.get_rfq(&rfq_id()).await.expect("read").expect("exists");
    assert_eq!(rfq.status, RfqStatus::Completed);

    let intents = store.list_order_intents_for_rfq(&rfq_id()).await.expect("intents");
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, OrderIntentStatus::Materialized);
    assert_eq!(intents[0].final_price, Decimal::new(1400, 0));
    assert_eq!(hook.received().len(), 1);

    let summary = negotiations
        .negotiation_history(&quote_id(BASIC_QUOTE), &buyer())
        .await
        .expect("history");
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.price_reduction, Decimal::new(100, 0));
}

#[tokio::test]
async fn list_quotes_filters_sorts_and_paginates() {
    let store = seeded_store(Utc::now()).await;
    let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::default());
    let quotes = QuoteManager::new(store, notifier, NegotiationConfig::default());
    let filter = QuoteListFilter { rfq_id: Some(rfq_id()), ..QuoteListFilter::default() };
    let sort = QuoteSort { field: QuoteSortField::TotalPrice, direction: SortDirection::Desc };

    let first = Pagination { page: 1, limit: 1 };
    let page = quotes.list_quotes(&filter, sort, first).await.expect("page");
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, quote_id(BASIC_QUOTE));

    let second = Pagination { page: 2, limit: 1 };
    let second = quotes.list_quotes(&filter, sort, second).await.expect("page");
    assert_eq!(second.items[0].id, quote_id(PREMIUM_QUOTE));

    let cheap = QuoteListFilter { max_price: Some(Decimal::new(1300, 0)), ..filter.clone() };
    let page = quotes.list_quotes(&cheap, sort, Pagination::default()).await.expect("page");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, quote_id(PREMIUM_QUOTE));
}

#[tokio::test]
async fn sweep_expires_lapsed_records_once() {
    let now = Utc::now();
    let store = seeded_store(now).await;
    let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::default());
    let sweeper = Sweeper::new(
        store.clone(),
        NegotiationManager::new(store.clone(), notifier, NegotiationConfig::default()),
        AutoConversionConfig::default(),
    );
    let later = now + Duration::days(31);

    let first = sweeper.run_sweep_at(later).await.expect("sweep");
    assert_eq!(first.expired_quotes, vec![quote_id(PREMIUM_QUOTE), quote_id(BASIC_QUOTE)]);
    assert_eq!(first.expired_rfqs, vec![rfq_id()]);

    let second = sweeper.run_sweep_at(later).await.expect("second sweep");
    assert_eq!(second.total_changes(), 0);
}

#[tokio::test]
async fn lapsed_stale_counter_is_neither_selected_nor_resolvable() {
    let now = Utc::now();
    let store = seeded_store(now).await;
    let mut lapsed = counter_entry("N-lapsed", NegotiationStatus::Pending, now);
    lapsed.price = Decimal::new(1490, 0);
    lapsed.created_at = now - Duration::hours(49);
    lapsed.valid_until = now - Duration::hours(25);
    store
        .apply(
            UnitOfWork::new("test", now)
                .with(WriteOp::UpdateQuote {
                    quote_id: quote_id(BASIC_QUOTE),
                    expect: vec![QuoteStatus::Pending],
                    patch: QuotePatch::status(QuoteStatus::Negotiating),
                })
                .with(WriteOp::InsertNegotiation { entry: lapsed, max_rounds: 5 }),
        )
        .await
        .expect("stage lapsed counter");

    let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::default());
    let sweeper = Sweeper::new(
        store.clone(),
        NegotiationManager::new(store.clone(), notifier, NegotiationConfig::default()),
        AutoConversionConfig::default(),
    );
    let report = sweeper.process_auto_conversion_at(None, now).await.expect("auto-conversion");
    assert_eq!(report.examined, 0);
    assert!(report.converted.is_empty());

    let error = store
        .apply(UnitOfWork::new("test", now).with(WriteOp::ResolveNegotiation {
            negotiation_id: NegotiationId("N-lapsed".to_string()),
            to: NegotiationStatus::Accepted,
            response_message: None,
        }))
        .await
        .expect_err("lapsed entry must not resolve");
    assert!(matches!(error, StoreError::PreconditionFailed(_)));

    let quote = store.get_quote(&quote_id(BASIC_QUOTE)).await.expect("read").expect("exists");
    assert_eq!(quote.status, QuoteStatus::Negotiating);
    assert!(store.list_order_intents_for_rfq(&rfq_id()).await.expect("intents").is_empty());
}

#[tokio::test]
async fn concurrent_acceptances_produce_a_single_winner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let store = SqliteStore::new(pool);
    DemoSeedDataset::load(&store, Utc::now()).await.expect("seed");

    let quotes = QuoteManager::new(
        store.clone(),
        Arc::new(InMemoryNotifier::default()),
        NegotiationConfig::default(),
    );
    let premium = quote_id(PREMIUM_QUOTE);
    let basic = quote_id(BASIC_QUOTE);
    let buyer = buyer();
    let (left, right) =
        tokio::join!(quotes.accept_quote(&premium, &buyer), quotes.accept_quote(&basic, &buyer));

    let outcomes = [left.is_ok(), right.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "exactly one acceptance wins");
    let loser = if left.is_ok() { right } else { left };
    assert_eq!(loser.expect_err("loser").kind(), ErrorKind::Conflict);

    let intents = store.list_order_intents_for_rfq(&rfq_id()).await.expect("intents");
    assert_eq!(intents.len(), 1);
}
