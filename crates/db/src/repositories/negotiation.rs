use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use souk_core::domain::negotiation::{
    NegotiationEntry, NegotiationId, NegotiationStatus, OfferType,
};
use souk_core::domain::quote::QuoteId;
use souk_core::domain::UserId;
use souk_core::store::NegotiationExpiry;

use super::{
    format_timestamp, parse_decimal, parse_enum, parse_optional_timestamp, parse_timestamp,
    unique_as_precondition, RepositoryError,
};

const ENTRY_COLUMNS: &str = "id, quote_id, from_user_id, to_user_id, offer_type, price, terms,
    message, response_message, status, valid_until, created_at, responded_at";

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: &NegotiationId,
) -> Result<Option<NegotiationEntry>, RepositoryError> {
    let row =
        sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM negotiation_entry WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(entry_from_row).transpose()
}

/// Chronological; rowid breaks ties between entries written in the same microsecond.
pub(crate) async fn list_for_quote(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
) -> Result<Vec<NegotiationEntry>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM negotiation_entry
         WHERE quote_id = ?
         ORDER BY created_at ASC, rowid ASC"
    ))
    .bind(&quote_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(entry_from_row).collect()
}

pub(crate) async fn list_stale_counters(
    conn: &mut SqliteConnection,
    created_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<NegotiationEntry>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM negotiation_entry
         WHERE status = 'pending' AND offer_type = 'counter' AND created_at < ?
           AND valid_until > ?
         ORDER BY created_at ASC, rowid ASC"
    ))
    .bind(format_timestamp(created_before))
    .bind(format_timestamp(now))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(entry_from_row).collect()
}

/// Inserts only while the quote carries fewer than `max_rounds` entries.
pub(crate) async fn insert_bounded(
    conn: &mut SqliteConnection,
    entry: &NegotiationEntry,
    max_rounds: u32,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO negotiation_entry (
            id,
            quote_id,
            from_user_id,
            to_user_id,
            offer_type,
            price,
            terms,
            message,
            response_message,
            status,
            valid_until,
            created_at,
            responded_at
         )
         SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
         WHERE (SELECT COUNT(*) FROM negotiation_entry WHERE quote_id = ?) < ?",
    )
    .bind(&entry.id.0)
    .bind(&entry.quote_id.0)
    .bind(&entry.from_user_id.0)
    .bind(&entry.to_user_id.0)
    .bind(entry.offer_type.as_str())
    .bind(entry.price.to_string())
    .bind(entry.terms.as_deref())
    .bind(entry.message.as_deref())
    .bind(entry.response_message.as_deref())
    .bind(entry.status.as_str())
    .bind(format_timestamp(entry.valid_until))
    .bind(format_timestamp(entry.created_at))
    .bind(entry.responded_at.map(format_timestamp))
    .bind(&entry.quote_id.0)
    .bind(i64::from(max_rounds))
    .execute(&mut *conn)
    .await
    .map_err(|error| {
        unique_as_precondition(
            error,
            format!("quote `{}` already has a live counter-offer", entry.quote_id.0),
        )
    })?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Precondition(format!(
            "quote `{}` reached the negotiation round limit of {max_rounds}",
            entry.quote_id.0
        )));
    }
    Ok(())
}

pub(crate) async fn resolve(
    conn: &mut SqliteConnection,
    id: &NegotiationId,
    to: NegotiationStatus,
    response_message: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE negotiation_entry
         SET status = ?, response_message = ?, responded_at = ?
         WHERE id = ? AND status = 'pending' AND valid_until > ?",
    )
    .bind(to.as_str())
    .bind(response_message)
    .bind(format_timestamp(at))
    .bind(&id.0)
    .bind(format_timestamp(at))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Precondition(format!(
            "negotiation `{}` is missing, no longer pending or lapsed",
            id.0
        )));
    }
    Ok(())
}

/// Resolves whatever is still pending on the quote.
pub(crate) async fn close_open(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
    to: NegotiationStatus,
    response_message: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Vec<NegotiationId>, RepositoryError> {
    let rows = sqlx::query(
        "UPDATE negotiation_entry
         SET status = ?, response_message = ?, responded_at = ?
         WHERE quote_id = ? AND status = 'pending'
         RETURNING id",
    )
    .bind(to.as_str())
    .bind(response_message)
    .bind(format_timestamp(at))
    .bind(&quote_id.0)
    .fetch_all(&mut *conn)
    .await?;

    ids(rows)
}

pub(crate) async fn expire(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<NegotiationExpiry, RepositoryError> {
    let stamp = format_timestamp(now);
    let expired = sqlx::query(
        "UPDATE negotiation_entry SET status = 'expired', responded_at = ?
         WHERE status = 'pending' AND valid_until < ?
         RETURNING id",
    )
    .bind(&stamp)
    .bind(&stamp)
    .fetch_all(&mut *conn)
    .await?;

    let reverted = sqlx::query(
        "UPDATE quote SET status = 'pending', proposed_terms = NULL, updated_at = ?
         WHERE status = 'negotiating'
           AND NOT EXISTS (
               SELECT 1 FROM negotiation_entry e
               WHERE e.quote_id = quote.id AND e.status = 'pending'
           )
         RETURNING id",
    )
    .bind(&stamp)
    .fetch_all(&mut *conn)
    .await?;

    let mut reverted_quotes = reverted
        .into_iter()
        .map(|row| row.try_get::<String, _>("id").map(QuoteId))
        .collect::<Result<Vec<_>, _>>()?;
    reverted_quotes.sort_by(|left, right| left.0.cmp(&right.0));

    Ok(NegotiationExpiry { expired: ids(expired)?, reverted_quotes })
}

fn ids(rows: Vec<SqliteRow>) -> Result<Vec<NegotiationId>, RepositoryError> {
    let mut ids = rows
        .into_iter()
        .map(|row| row.try_get::<String, _>("id").map(NegotiationId))
        .collect::<Result<Vec<_>, _>>()?;
    ids.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(ids)
}

fn entry_from_row(row: SqliteRow) -> Result<NegotiationEntry, RepositoryError> {
    Ok(NegotiationEntry {
        id: NegotiationId(row.try_get("id")?),
        quote_id: QuoteId(row.try_get("quote_id")?),
        from_user_id: UserId(row.try_get("from_user_id")?),
        to_user_id: UserId(row.try_get("to_user_id")?),
        offer_type: parse_enum("offer_type", row.try_get("offer_type")?, OfferType::parse)?,
        price: parse_decimal("price", row.try_get("price")?)?,
        terms: row.try_get("terms")?,
        message: row.try_get("message")?,
        response_message: row.try_get("response_message")?,
        status: parse_enum("status", row.try_get("status")?, NegotiationStatus::parse)?,
        valid_until: parse_timestamp("valid_until", row.try_get("valid_until")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        responded_at: parse_optional_timestamp("responded_at", row.try_get("responded_at")?)?,
    })
}
