use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Quote, QuoteStatus};
use crate::domain::UserId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SellerQuoteStats {
    pub seller_id: UserId,
    pub total: u64,
    /// Keyed by status storage name; every status is present.
    pub by_status: BTreeMap<String, u64>,
    /// Accepted quotes as a percentage of all quotes, 2 dp.
    pub acceptance_rate: Decimal,
    pub average_quote_value: Decimal,
}

/// Share of `part` in `whole` as a percentage rounded to 2 dp; zero for an empty whole.
pub fn percentage(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(2)
}

pub fn seller_quote_stats(seller_id: UserId, quotes: &[Quote]) -> SellerQuoteStats {
    let mut by_status: BTreeMap<String, u64> =
        QuoteStatus::ALL.iter().map(|status| (status.as_str().to_string(), 0)).collect();
    for quote in quotes {
        *by_status.entry(quote.status.as_str().to_string()).or_default() += 1;
    }

    let total = quotes.len() as u64;
    let accepted = by_status.get(QuoteStatus::Accepted.as_str()).copied().unwrap_or(0);
    let average_quote_value = if quotes.is_empty() {
        Decimal::ZERO
    } else {
        (quotes.iter().map(|quote| quote.total_price).sum::<Decimal>() / Decimal::from(total))
            .round_dp(2)
    };

    SellerQuoteStats {
        seller_id,
        total,
        by_status,
        acceptance_rate: percentage(accepted, total),
        average_quote_value,
    }
}
