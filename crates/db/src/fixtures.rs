use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use souk_core::domain::product::{Product, ProductId, ProductKind};
use souk_core::domain::quote::{Quote, QuoteId, QuoteItem, QuoteStatus};
use souk_core::domain::rfq::{Rfq, RfqId, RfqStatus};
use souk_core::domain::seller::{SellerProfile, VerificationTier};
use souk_core::domain::UserId;
use souk_core::store::{MarketplaceStore, StoreError, UnitOfWork, WriteOp};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqliteStore};

pub const DEMO_RFQ_ID: &str = "rfq-demo-001";
pub const DEMO_BUYER_ID: &str = "buyer-demo";

const SEED_SELLERS: &[SeedSeller] = &[
    SeedSeller {
        seller_id: "seller-demo-premium",
        display_name: "Atlas Industrial Supply",
        tier: VerificationTier::Premium,
        product_id: "prod-demo-valve",
        product_name: "Stainless ball valve DN50",
        quote_id: "quote-demo-001",
        unit_price: 12,
        delivery_timeline: "7-10 days",
        terms: "net 30, free shipping",
    },
    SeedSeller {
        seller_id: "seller-demo-basic",
        display_name: "Harbor Trading Co.",
        tier: VerificationTier::Basic,
        product_id: "prod-demo-valve-b",
        product_name: "Ball valve DN50",
        quote_id: "quote-demo-002",
        unit_price: 15,
        delivery_timeline: "14 days",
        terms: "net 15",
    },
];

const SEED_QUANTITY: u32 = 100;

#[derive(Debug, Clone, Copy)]
struct SeedSeller {
    seller_id: &'static str,
    display_name: &'static str,
    tier: VerificationTier,
    product_id: &'static str,
    product_name: &'static str,
    quote_id: &'static str,
    unit_price: i64,
    delivery_timeline: &'static str,
    terms: &'static str,
}

impl SeedSeller {
    fn total_price(&self) -> Decimal {
        Decimal::from(self.unit_price) * Decimal::from(SEED_QUANTITY)
    }

    fn quote(&self, now: DateTime<Utc>) -> Quote {
        Quote {
            id: QuoteId(self.quote_id.to_string()),
            rfq_id: RfqId(DEMO_RFQ_ID.to_string()),
            seller_id: UserId(self.seller_id.to_string()),
            total_price: self.total_price(),
            original_price: self.total_price(),
            delivery_timeline: Some(self.delivery_timeline.to_string()),
            terms_conditions: Some(self.terms.to_string()),
            proposed_terms: None,
            valid_until: now + Duration::days(30),
            status: QuoteStatus::Pending,
            rejection_reason: None,
            items: vec![QuoteItem {
                product_id: ProductId(self.product_id.to_string()),
                quantity: SEED_QUANTITY,
                unit_price: Decimal::from(self.unit_price),
                total_price: self.total_price(),
            }],
            created_at: now,
            updated_at: now,
        }
    }
}

/// Demo marketplace: one open RFQ, two sellers of different tiers, one pending quote each.
///
/// Loading is idempotent; records that already exist are left untouched.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(store: &SqliteStore, now: DateTime<Utc>) -> Result<SeedResult, StoreError> {
        let rfq_id = RfqId(DEMO_RFQ_ID.to_string());
        let rfq_created = if store.get_rfq(&rfq_id).await?.is_none() {
            store
                .insert_rfq(Rfq {
                    id: rfq_id.clone(),
                    buyer_id: UserId(DEMO_BUYER_ID.to_string()),
                    category_id: "industrial-valves".to_string(),
                    title: "100 stainless ball valves".to_string(),
                    quantity: SEED_QUANTITY,
                    budget_min: Some(Decimal::from(1_000)),
                    budget_max: Some(Decimal::from(2_000)),
                    delivery_timeline: Some("within 3 weeks".to_string()),
                    status: RfqStatus::Active,
                    expires_at: now + Duration::days(14),
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            true
        } else {
            false
        };

        let mut quotes_seeded = Vec::new();
        for seller in SEED_SELLERS {
            let seller_id = UserId(seller.seller_id.to_string());
            store
                .upsert_seller_profile(SellerProfile {
                    seller_id: seller_id.clone(),
                    display_name: seller.display_name.to_string(),
                    verification_tier: seller.tier,
                })
                .await?;
            store
                .upsert_product(Product {
                    id: ProductId(seller.product_id.to_string()),
                    seller_id: seller_id.clone(),
                    name: seller.product_name.to_string(),
                    kind: ProductKind::Physical,
                    active: true,
                    stock_quantity: 500,
                })
                .await?;

            if store.get_quote(&QuoteId(seller.quote_id.to_string())).await?.is_some() {
                continue;
            }
            let unit = UnitOfWork::new("seed_quote", now)
                .with(WriteOp::AssertRfqStatus {
                    rfq_id: rfq_id.clone(),
                    expect: RfqStatus::Active,
                })
                .with(WriteOp::InsertQuote(seller.quote(now)));
            store.apply(unit).await?;
            quotes_seeded.push(SeededQuote {
                quote_id: seller.quote_id,
                seller_id: seller.seller_id,
                total_price: seller.total_price(),
            });
        }

        Ok(SeedResult { rfq_id: DEMO_RFQ_ID, rfq_created, quotes_seeded })
    }

    /// Checks that every demo record exists.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let rfq_exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM rfq WHERE id = ?1)")
            .bind(DEMO_RFQ_ID)
            .fetch_one(pool)
            .await?;
        checks.push(("demo-rfq", rfq_exists == 1));

        let sellers = seed_ids(|seller| seller.seller_id);
        let profile_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM seller_profile WHERE seller_id IN {sellers}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-seller-profiles", profile_count == SEED_SELLERS.len() as i64));

        let products = seed_ids(|seller| seller.product_id);
        let product_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM product WHERE id IN {products}"))
                .fetch_one(pool)
                .await?;
        checks.push(("demo-products", product_count == SEED_SELLERS.len() as i64));

        let quotes = seed_ids(|seller| seller.quote_id);
        let item_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM quote_item WHERE quote_id IN {quotes}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-quote-items", item_count == SEED_SELLERS.len() as i64));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo records, including any negotiation and order state built on them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quotes = seed_ids(|seller| seller.quote_id);
        let products = seed_ids(|seller| seller.product_id);
        let sellers = seed_ids(|seller| seller.seller_id);

        sqlx::query("DELETE FROM order_intent WHERE rfq_id = ?1")
            .bind(DEMO_RFQ_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM negotiation_entry WHERE quote_id IN {quotes}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM quote_item WHERE quote_id IN {quotes}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM quote WHERE id IN {quotes}")).execute(&mut *tx).await?;
        sqlx::query(&format!("DELETE FROM product WHERE id IN {products}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM seller_profile WHERE seller_id IN {sellers}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM rfq WHERE id = ?1").bind(DEMO_RFQ_ID).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

fn seed_ids(field: fn(&SeedSeller) -> &'static str) -> String {
    let ids = SEED_SELLERS.iter().map(field).collect::<Vec<_>>();
    sql_array_from_ids(&ids)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub rfq_id: &'static str,
    pub rfq_created: bool,
    pub quotes_seeded: Vec<SeededQuote>,
}

#[derive(Debug, Serialize)]
pub struct SeededQuote {
    pub quote_id: &'static str,
    pub seller_id: &'static str,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
