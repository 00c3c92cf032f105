//! SQLite-backed [`MarketplaceStore`].
//!
//! Every timestamp is stored as RFC 3339 with microseconds and a `Z` suffix so that
//! string comparison in SQL matches chronological order. Money is stored as decimal
//! text and only cast to REAL for ordering and range filters.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use souk_core::domain::negotiation::{NegotiationEntry, NegotiationId};
use souk_core::domain::order::{OrderId, OrderIntent, OrderIntentId};
use souk_core::domain::product::{Product, ProductId};
use souk_core::domain::quote::{Quote, QuoteId};
use souk_core::domain::rfq::{Rfq, RfqId};
use souk_core::domain::seller::SellerProfile;
use souk_core::domain::UserId;
use souk_core::store::{
    MarketplaceStore, NegotiationExpiry, Page, Pagination, QuoteFilter, QuoteSort, StoreError,
    UnitOfWork, UnitReceipt,
};

use crate::DbPool;

pub mod catalog;
pub mod negotiation;
pub mod order_intent;
pub mod quote;
pub mod rfq;
pub mod unit;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Precondition(message) => StoreError::PreconditionFailed(message),
        }
    }
}

/// Maps a unique-index violation onto a failed guard; anything else stays a backend error.
pub(crate) fn unique_as_precondition(error: sqlx::Error, message: String) -> RepositoryError {
    match &error {
        sqlx::Error::Database(database) if database.is_unique_violation() => {
            RepositoryError::Precondition(message)
        }
        _ => RepositoryError::Database(error),
    }
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|decimal| parse_decimal(column, decimal)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_enum<T>(
    column: &str,
    value: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown value in `{column}`: `{value}`")))
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl MarketplaceStore for SqliteStore {
    async fn get_rfq(&self, id: &RfqId) -> Result<Option<Rfq>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(rfq::fetch(&mut conn, id).await?)
    }

    async fn insert_rfq(&self, rfq: Rfq) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(rfq::insert(&mut conn, &rfq).await?)
    }

    async fn get_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::fetch(&mut conn, id).await?)
    }

    async fn find_active_quote_for_seller(
        &self,
        rfq_id: &RfqId,
        seller_id: &UserId,
    ) -> Result<Option<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::find_active_for_seller(&mut conn, rfq_id, seller_id).await?)
    }

    async fn list_quotes(
        &self,
        filter: &QuoteFilter,
        sort: QuoteSort,
        pagination: Pagination,
    ) -> Result<Page<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::list(&mut conn, filter, sort, pagination.normalized()).await?)
    }

    async fn list_quotes_for_rfq(&self, rfq_id: &RfqId) -> Result<Vec<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::list_for_rfq(&mut conn, rfq_id).await?)
    }

    async fn list_quotes_for_seller(&self, seller_id: &UserId) -> Result<Vec<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::list_for_seller(&mut conn, seller_id).await?)
    }

    async fn list_negotiated_quotes_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::list_negotiated_for_user(&mut conn, user_id).await?)
    }

    async fn get_negotiation(
        &self,
        id: &NegotiationId,
    ) -> Result<Option<NegotiationEntry>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(negotiation::fetch(&mut conn, id).await?)
    }

    async fn list_negotiations_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<NegotiationEntry>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(negotiation::list_for_quote(&mut conn, quote_id).await?)
    }

    async fn list_stale_counter_offers(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<NegotiationEntry>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(negotiation::list_stale_counters(&mut conn, created_before, now).await?)
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(catalog::fetch_product(&mut conn, id).await?)
    }

    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(catalog::upsert_product(&mut conn, &product).await?)
    }

    async fn get_seller_profile(
        &self,
        seller_id: &UserId,
    ) -> Result<Option<SellerProfile>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(catalog::fetch_seller_profile(&mut conn, seller_id).await?)
    }

    async fn upsert_seller_profile(&self, profile: SellerProfile) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(catalog::upsert_seller_profile(&mut conn, &profile).await?)
    }

    async fn list_order_intents_for_rfq(
        &self,
        rfq_id: &RfqId,
    ) -> Result<Vec<OrderIntent>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(order_intent::list_for_rfq(&mut conn, rfq_id).await?)
    }

    async fn mark_order_materialized(
        &self,
        intent_id: &OrderIntentId,
        order_id: &OrderId,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(order_intent::mark_materialized(&mut conn, intent_id, order_id).await?)
    }

    async fn apply(&self, unit: UnitOfWork) -> Result<UnitReceipt, StoreError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let receipt = unit::apply(&mut tx, unit).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(receipt)
    }

    async fn expire_negotiations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<NegotiationExpiry, StoreError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let expiry = negotiation::expire(&mut tx, now).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(expiry)
    }

    async fn expire_quotes(&self, now: DateTime<Utc>) -> Result<Vec<QuoteId>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(quote::expire(&mut conn, now).await?)
    }

    async fn expire_rfqs(&self, now: DateTime<Utc>) -> Result<Vec<RfqId>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(rfq::expire(&mut conn, now).await?)
    }
}
