use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use souk_core::domain::order::{
    ConversionSource, OrderId, OrderIntent, OrderIntentId, OrderIntentStatus,
};
use souk_core::domain::quote::QuoteId;
use souk_core::domain::rfq::RfqId;
use souk_core::domain::UserId;

use super::{
    format_timestamp, parse_decimal, parse_enum, parse_timestamp, unique_as_precondition,
    RepositoryError,
};

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    intent: &OrderIntent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO order_intent (
            id,
            rfq_id,
            quote_id,
            buyer_id,
            seller_id,
            final_price,
            terms,
            source,
            status,
            order_id,
            created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&intent.id.0)
    .bind(&intent.rfq_id.0)
    .bind(&intent.quote_id.0)
    .bind(&intent.buyer_id.0)
    .bind(&intent.seller_id.0)
    .bind(intent.final_price.to_string())
    .bind(intent.terms.as_deref())
    .bind(intent.source.as_str())
    .bind(intent.status.as_str())
    .bind(intent.order_id.as_ref().map(|order_id| order_id.0.clone()))
    .bind(format_timestamp(intent.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|error| {
        unique_as_precondition(
            error,
            format!("rfq `{}` already produced an order intent", intent.rfq_id.0),
        )
    })?;

    Ok(())
}

pub(crate) async fn list_for_rfq(
    conn: &mut SqliteConnection,
    rfq_id: &RfqId,
) -> Result<Vec<OrderIntent>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, rfq_id, quote_id, buyer_id, seller_id, final_price, terms, source, status,
                order_id, created_at
         FROM order_intent
         WHERE rfq_id = ?
         ORDER BY created_at ASC",
    )
    .bind(&rfq_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(intent_from_row).collect()
}

pub(crate) async fn mark_materialized(
    conn: &mut SqliteConnection,
    intent_id: &OrderIntentId,
    order_id: &OrderId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE order_intent SET status = 'materialized', order_id = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(&order_id.0)
    .bind(&intent_id.0)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Precondition(format!(
            "order intent `{}` is not pending",
            intent_id.0
        )));
    }
    Ok(())
}

fn intent_from_row(row: SqliteRow) -> Result<OrderIntent, RepositoryError> {
    Ok(OrderIntent {
        id: OrderIntentId(row.try_get("id")?),
        rfq_id: RfqId(row.try_get("rfq_id")?),
        quote_id: QuoteId(row.try_get("quote_id")?),
        buyer_id: UserId(row.try_get("buyer_id")?),
        seller_id: UserId(row.try_get("seller_id")?),
        final_price: parse_decimal("final_price", row.try_get("final_price")?)?,
        terms: row.try_get("terms")?,
        source: parse_enum("source", row.try_get("source")?, ConversionSource::parse)?,
        status: parse_enum("status", row.try_get("status")?, OrderIntentStatus::parse)?,
        order_id: row.try_get::<Option<String>, _>("order_id")?.map(OrderId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
