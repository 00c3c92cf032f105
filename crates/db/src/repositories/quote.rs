use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use souk_core::domain::product::ProductId;
use souk_core::domain::quote::{Quote, QuoteId, QuoteItem, QuoteStatus};
use souk_core::domain::rfq::RfqId;
use souk_core::domain::UserId;
use souk_core::store::{
    Page, Pagination, QuoteFilter, QuotePatch, QuoteSort, QuoteSortField, RejectedQuote,
    SortDirection,
};

use super::{
    format_timestamp, parse_decimal, parse_enum, parse_timestamp, parse_u32,
    unique_as_precondition, RepositoryError,
};

const QUOTE_COLUMNS: &str = "q.id, q.rfq_id, q.seller_id, q.total_price, q.original_price,
    q.delivery_timeline, q.terms_conditions, q.proposed_terms, q.valid_until, q.status,
    q.rejection_reason, q.created_at, q.updated_at";

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    id: &QuoteId,
) -> Result<Option<Quote>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quote q WHERE q.id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let mut quote = quote_from_row(row)?;
            quote.items = load_items(conn, &quote.id).await?;
            Ok(Some(quote))
        }
        None => Ok(None),
    }
}

pub(crate) async fn find_active_for_seller(
    conn: &mut SqliteConnection,
    rfq_id: &RfqId,
    seller_id: &UserId,
) -> Result<Option<Quote>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote q
         WHERE q.rfq_id = ? AND q.seller_id = ? AND q.status != 'withdrawn'
         LIMIT 1"
    ))
    .bind(&rfq_id.0)
    .bind(&seller_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let mut quote = quote_from_row(row)?;
            quote.items = load_items(conn, &quote.id).await?;
            Ok(Some(quote))
        }
        None => Ok(None),
    }
}

pub(crate) async fn list(
    conn: &mut SqliteConnection,
    filter: &QuoteFilter,
    sort: QuoteSort,
    pagination: Pagination,
) -> Result<Page<Quote>, RepositoryError> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM quote q");
    push_filter(&mut count, filter);
    let total: i64 = count.build().fetch_one(&mut *conn).await?.try_get("count")?;

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {QUOTE_COLUMNS} FROM quote q"));
    push_filter(&mut select, filter);
    let column = match sort.field {
        QuoteSortField::CreatedAt => "q.created_at",
        QuoteSortField::TotalPrice => "CAST(q.total_price AS REAL)",
        QuoteSortField::ValidUntil => "q.valid_until",
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    select.push(format!(" ORDER BY {column} {direction}, q.id {direction}"));
    select.push(" LIMIT ").push_bind(i64::from(pagination.limit));
    select.push(" OFFSET ").push_bind(pagination.offset() as i64);
    let rows = select.build().fetch_all(&mut *conn).await?;

    let items = with_items(conn, rows).await?;
    Ok(Page {
        items,
        total: u64::try_from(total).unwrap_or_default(),
        page: pagination.page,
        limit: pagination.limit,
    })
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &QuoteFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(rfq_id) = &filter.rfq_id {
        builder.push(" AND q.rfq_id = ").push_bind(rfq_id.0.clone());
    }
    if let Some(seller_id) = &filter.seller_id {
        builder.push(" AND q.seller_id = ").push_bind(seller_id.0.clone());
    }
    if !filter.statuses.is_empty() {
        builder.push(" AND q.status IN (");
        let mut statuses = builder.separated(", ");
        for status in &filter.statuses {
            statuses.push_bind(status.as_str());
        }
        statuses.push_unseparated(")");
    }
    if let Some(min) = filter.min_price {
        builder
            .push(" AND CAST(q.total_price AS REAL) >= CAST(")
            .push_bind(min.to_string())
            .push(" AS REAL)");
    }
    if let Some(max) = filter.max_price {
        builder
            .push(" AND CAST(q.total_price AS REAL) <= CAST(")
            .push_bind(max.to_string())
            .push(" AS REAL)");
    }
    if let Some(at) = filter.valid_at {
        builder.push(" AND q.valid_until > ").push_bind(format_timestamp(at));
    }
}

pub(crate) async fn list_for_rfq(
    conn: &mut SqliteConnection,
    rfq_id: &RfqId,
) -> Result<Vec<Quote>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote q WHERE q.rfq_id = ? ORDER BY q.created_at, q.id"
    ))
    .bind(&rfq_id.0)
    .fetch_all(&mut *conn)
    .await?;

    with_items(conn, rows).await
}

pub(crate) async fn list_for_seller(
    conn: &mut SqliteConnection,
    seller_id: &UserId,
) -> Result<Vec<Quote>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote q WHERE q.seller_id = ? ORDER BY q.created_at, q.id"
    ))
    .bind(&seller_id.0)
    .fetch_all(&mut *conn)
    .await?;

    with_items(conn, rows).await
}

pub(crate) async fn list_negotiated_for_user(
    conn: &mut SqliteConnection,
    user_id: &UserId,
) -> Result<Vec<Quote>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote q
         JOIN rfq r ON r.id = q.rfq_id
         WHERE (q.seller_id = ? OR r.buyer_id = ?)
           AND EXISTS (SELECT 1 FROM negotiation_entry e WHERE e.quote_id = q.id)
         ORDER BY q.created_at, q.id"
    ))
    .bind(&user_id.0)
    .bind(&user_id.0)
    .fetch_all(&mut *conn)
    .await?;

    with_items(conn, rows).await
}

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    quote: &Quote,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO quote (
            id,
            rfq_id,
            seller_id,
            total_price,
            original_price,
            delivery_timeline,
            terms_conditions,
            proposed_terms,
            valid_until,
            status,
            rejection_reason,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&quote.id.0)
    .bind(&quote.rfq_id.0)
    .bind(&quote.seller_id.0)
    .bind(quote.total_price.to_string())
    .bind(quote.original_price.to_string())
    .bind(quote.delivery_timeline.as_deref())
    .bind(quote.terms_conditions.as_deref())
    .bind(quote.proposed_terms.as_deref())
    .bind(format_timestamp(quote.valid_until))
    .bind(quote.status.as_str())
    .bind(quote.rejection_reason.as_deref())
    .bind(format_timestamp(quote.created_at))
    .bind(format_timestamp(quote.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|error| {
        unique_as_precondition(
            error,
            format!(
                "seller `{}` already has an active quote on rfq `{}`",
                quote.seller_id.0, quote.rfq_id.0
            ),
        )
    })?;

    replace_items(conn, &quote.id, &quote.items).await
}

/// Applies `patch` only while the quote is in one of the `expect` statuses.
pub(crate) async fn update_guarded(
    conn: &mut SqliteConnection,
    id: &QuoteId,
    expect: &[QuoteStatus],
    patch: &QuotePatch,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let mut update = QueryBuilder::<Sqlite>::new("UPDATE quote SET updated_at = ");
    update.push_bind(format_timestamp(at));
    if let Some(status) = patch.status {
        update.push(", status = ").push_bind(status.as_str());
    }
    if let Some(total_price) = patch.total_price {
        update.push(", total_price = ").push_bind(total_price.to_string());
    }
    if let Some(original_price) = patch.original_price {
        update.push(", original_price = ").push_bind(original_price.to_string());
    }
    if let Some(delivery_timeline) = &patch.delivery_timeline {
        update.push(", delivery_timeline = ").push_bind(delivery_timeline.clone());
    }
    if let Some(terms_conditions) = &patch.terms_conditions {
        update.push(", terms_conditions = ").push_bind(terms_conditions.clone());
    }
    if let Some(proposed_terms) = &patch.proposed_terms {
        update.push(", proposed_terms = ").push_bind(proposed_terms.clone());
    }
    if let Some(valid_until) = patch.valid_until {
        update.push(", valid_until = ").push_bind(format_timestamp(valid_until));
    }
    if let Some(rejection_reason) = &patch.rejection_reason {
        update.push(", rejection_reason = ").push_bind(rejection_reason.clone());
    }
    update.push(" WHERE id = ").push_bind(id.0.clone());
    update.push(" AND status IN (");
    let mut statuses = update.separated(", ");
    for status in expect {
        statuses.push_bind(status.as_str());
    }
    statuses.push_unseparated(")");

    let result = update.build().execute(&mut *conn).await.map_err(|error| {
        unique_as_precondition(error, format!("quote `{}` conflicts with another quote", id.0))
    })?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::Precondition(format!(
            "quote `{}` is missing or no longer {}",
            id.0,
            expect.iter().map(QuoteStatus::as_str).collect::<Vec<_>>().join("/")
        )));
    }

    if let Some(items) = &patch.items {
        replace_items(conn, id, items).await?;
    }
    Ok(())
}

/// Rejects every open quote on the RFQ other than `keep` and closes their live offers.
pub(crate) async fn reject_siblings(
    conn: &mut SqliteConnection,
    rfq_id: &RfqId,
    keep: &QuoteId,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<Vec<RejectedQuote>, RepositoryError> {
    let rows = sqlx::query(
        "UPDATE quote SET status = 'rejected', rejection_reason = ?, updated_at = ?
         WHERE rfq_id = ? AND id != ? AND status IN ('pending', 'negotiating')
         RETURNING id, seller_id",
    )
    .bind(reason)
    .bind(format_timestamp(at))
    .bind(&rfq_id.0)
    .bind(&keep.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut rejected = rows
        .into_iter()
        .map(|row| -> Result<RejectedQuote, sqlx::Error> {
            Ok(RejectedQuote {
                quote_id: QuoteId(row.try_get("id")?),
                seller_id: UserId(row.try_get("seller_id")?),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    rejected.sort_by(|left, right| left.quote_id.0.cmp(&right.quote_id.0));
    Ok(rejected)
}

pub(crate) async fn expire(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<QuoteId>, RepositoryError> {
    let stamp = format_timestamp(now);
    let rows = sqlx::query(
        "UPDATE quote SET status = 'expired', updated_at = ?
         WHERE status = 'pending' AND valid_until < ?
         RETURNING id",
    )
    .bind(&stamp)
    .bind(&stamp)
    .fetch_all(&mut *conn)
    .await?;

    let mut expired = rows
        .into_iter()
        .map(|row| row.try_get::<String, _>("id").map(QuoteId))
        .collect::<Result<Vec<_>, _>>()?;
    expired.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(expired)
}

async fn replace_items(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
    items: &[QuoteItem],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM quote_item WHERE quote_id = ?")
        .bind(&quote_id.0)
        .execute(&mut *conn)
        .await?;

    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO quote_item (
                quote_id,
                position,
                product_id,
                quantity,
                unit_price,
                total_price
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote_id.0)
        .bind(position as i64)
        .bind(&item.product_id.0)
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.to_string())
        .bind(item.total_price.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_items(
    conn: &mut SqliteConnection,
    quote_id: &QuoteId,
) -> Result<Vec<QuoteItem>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT product_id, quantity, unit_price, total_price
         FROM quote_item
         WHERE quote_id = ?
         ORDER BY position ASC",
    )
    .bind(&quote_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<QuoteItem, RepositoryError> {
            Ok(QuoteItem {
                product_id: ProductId(row.try_get("product_id")?),
                quantity: parse_u32("quantity", row.try_get("quantity")?)?,
                unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
                total_price: parse_decimal("total_price", row.try_get("total_price")?)?,
            })
        })
        .collect()
}

async fn with_items(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteRow>,
) -> Result<Vec<Quote>, RepositoryError> {
    let mut quotes = Vec::with_capacity(rows.len());
    for row in rows {
        let mut quote = quote_from_row(row)?;
        quote.items = load_items(conn, &quote.id).await?;
        quotes.push(quote);
    }
    Ok(quotes)
}

fn quote_from_row(row: SqliteRow) -> Result<Quote, RepositoryError> {
    Ok(Quote {
        id: QuoteId(row.try_get("id")?),
        rfq_id: RfqId(row.try_get("rfq_id")?),
        seller_id: UserId(row.try_get("seller_id")?),
        total_price: parse_decimal("total_price", row.try_get("total_price")?)?,
        original_price: parse_decimal("original_price", row.try_get("original_price")?)?,
        delivery_timeline: row.try_get("delivery_timeline")?,
        terms_conditions: row.try_get("terms_conditions")?,
        proposed_terms: row.try_get("proposed_terms")?,
        valid_until: parse_timestamp("valid_until", row.try_get("valid_until")?)?,
        status: parse_enum("status", row.try_get("status")?, QuoteStatus::parse)?,
        rejection_reason: row.try_get("rejection_reason")?,
        items: Vec::new(),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
