use sqlx::SqliteConnection;
use tracing::debug;

use souk_core::domain::negotiation::NegotiationStatus;
use souk_core::store::{UnitOfWork, UnitReceipt, WriteOp};

use super::{negotiation, order_intent, quote, rfq, RepositoryError};

/// Runs every op of `unit` on `conn`, which must be inside a transaction. The first
/// failed guard aborts; the caller's transaction is then dropped and rolled back.
pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    unit: UnitOfWork,
) -> Result<UnitReceipt, RepositoryError> {
    let UnitOfWork { label, at, ops } = unit;
    let mut receipt = UnitReceipt::default();

    for op in ops {
        match op {
            WriteOp::AssertRfqStatus { rfq_id, expect } => {
                rfq::assert_status(conn, &rfq_id, expect).await?;
            }
            WriteOp::InsertQuote(new_quote) => quote::insert(conn, &new_quote).await?,
            WriteOp::UpdateQuote { quote_id, expect, patch } => {
                quote::update_guarded(conn, &quote_id, &expect, &patch, at).await?;
            }
            WriteOp::RejectSiblingQuotes { rfq_id, keep, reason } => {
                let rejected = quote::reject_siblings(conn, &rfq_id, &keep, &reason, at).await?;
                for sibling in &rejected {
                    let closed = negotiation::close_open(
                        conn,
                        &sibling.quote_id,
                        NegotiationStatus::Rejected,
                        None,
                        at,
                    )
                    .await?;
                    receipt.closed_negotiations.extend(closed);
                }
                receipt.rejected_quotes.extend(rejected);
            }
            WriteOp::TransitionRfq { rfq_id, expect, to } => {
                rfq::transition(conn, &rfq_id, expect, to, at).await?;
            }
            WriteOp::InsertNegotiation { entry, max_rounds } => {
                negotiation::insert_bounded(conn, &entry, max_rounds).await?;
            }
            WriteOp::ResolveNegotiation { negotiation_id, to, response_message } => {
                negotiation::resolve(conn, &negotiation_id, to, response_message.as_deref(), at)
                    .await?;
            }
            WriteOp::CloseOpenNegotiations { quote_id, to, response_message } => {
                let closed =
                    negotiation::close_open(conn, &quote_id, to, response_message.as_deref(), at)
                        .await?;
                receipt.closed_negotiations.extend(closed);
            }
            WriteOp::InsertOrderIntent(intent) => order_intent::insert(conn, &intent).await?,
        }
    }

    debug!(
        unit = label,
        rejected_quotes = receipt.rejected_quotes.len(),
        closed_negotiations = receipt.closed_negotiations.len(),
        "unit of work applied"
    );
    Ok(receipt)
}
