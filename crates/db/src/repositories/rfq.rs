use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use souk_core::domain::rfq::{Rfq, RfqId, RfqStatus};
use souk_core::domain::UserId;

use super::{
    format_timestamp, parse_enum, parse_optional_decimal, parse_timestamp, parse_u32,
    RepositoryError,
};

const RFQ_COLUMNS: &str = "id, buyer_id, category_id, title, quantity, budget_min, budget_max,
    delivery_timeline, status, expires_at, created_at, updated_at";

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: &RfqId,
) -> Result<Option<Rfq>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {RFQ_COLUMNS} FROM rfq WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(rfq_from_row).transpose()
}

pub(crate) async fn insert(conn: &mut SqliteConnection, rfq: &Rfq) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO rfq (
            id,
            buyer_id,
            category_id,
            title,
            quantity,
            budget_min,
            budget_max,
            delivery_timeline,
            status,
            expires_at,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&rfq.id.0)
    .bind(&rfq.buyer_id.0)
    .bind(&rfq.category_id)
    .bind(&rfq.title)
    .bind(i64::from(rfq.quantity))
    .bind(rfq.budget_min.map(|value| value.to_string()))
    .bind(rfq.budget_max.map(|value| value.to_string()))
    .bind(rfq.delivery_timeline.as_deref())
    .bind(rfq.status.as_str())
    .bind(format_timestamp(rfq.expires_at))
    .bind(format_timestamp(rfq.created_at))
    .bind(format_timestamp(rfq.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Guarded status move; zero affected rows means the RFQ was missing or had moved on.
pub(crate) async fn transition(
    conn: &mut SqliteConnection,
    id: &RfqId,
    expect: RfqStatus,
    to: RfqStatus,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE rfq SET status = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(format_timestamp(at))
    .bind(&id.0)
    .bind(expect.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Precondition(format!(
            "rfq `{}` is no longer {}",
            id.0,
            expect.as_str()
        )));
    }
    Ok(())
}

/// Checks the RFQ status with a no-op write so the unit holds the write lock from here on.
pub(crate) async fn assert_status(
    conn: &mut SqliteConnection,
    id: &RfqId,
    expect: RfqStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("UPDATE rfq SET updated_at = updated_at WHERE id = ? AND status = ?")
        .bind(&id.0)
        .bind(expect.as_str())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Precondition(format!(
            "rfq `{}` is missing or not {}",
            id.0,
            expect.as_str()
        )));
    }
    Ok(())
}

pub(crate) async fn expire(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<RfqId>, RepositoryError> {
    let stamp = format_timestamp(now);
    let rows = sqlx::query(
        "UPDATE rfq SET status = 'expired', updated_at = ?
         WHERE status = 'active' AND expires_at < ?
         RETURNING id",
    )
    .bind(&stamp)
    .bind(&stamp)
    .fetch_all(&mut *conn)
    .await?;

    let mut expired = rows
        .into_iter()
        .map(|row| row.try_get::<String, _>("id").map(RfqId))
        .collect::<Result<Vec<_>, _>>()?;
    expired.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(expired)
}

fn rfq_from_row(row: SqliteRow) -> Result<Rfq, RepositoryError> {
    Ok(Rfq {
        id: RfqId(row.try_get("id")?),
        buyer_id: UserId(row.try_get("buyer_id")?),
        category_id: row.try_get("category_id")?,
        title: row.try_get("title")?,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        budget_min: parse_optional_decimal("budget_min", row.try_get("budget_min")?)?,
        budget_max: parse_optional_decimal("budget_max", row.try_get("budget_max")?)?,
        delivery_timeline: row.try_get("delivery_timeline")?,
        status: parse_enum("status", row.try_get("status")?, RfqStatus::parse)?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
