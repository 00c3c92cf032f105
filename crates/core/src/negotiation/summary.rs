use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::negotiation::{
    NegotiationEntry, NegotiationOutcome, NegotiationStatus, NegotiationSummary,
};
use crate::domain::quote::{Quote, QuoteStatus};
use crate::domain::UserId;
use crate::quotes::stats::percentage;

/// Derives the summary of a quote's negotiation from its chronological history.
pub fn summarize(quote: &Quote, history: Vec<NegotiationEntry>) -> NegotiationSummary {
    let original_price = quote.original_price;
    let current_price = history.last().map_or(quote.total_price, |entry| entry.price);
    let price_reduction = original_price - current_price;
    let price_reduction_percentage = reduction_percentage(original_price, current_price);

    NegotiationSummary {
        quote_id: quote.id.clone(),
        original_price,
        current_price,
        price_reduction,
        price_reduction_percentage,
        rounds: history.len() as u32,
        status: outcome(quote, &history),
        history,
    }
}

/// (original - current) / original * 100, 2 dp. Zero when the original price is zero.
pub fn reduction_percentage(original: Decimal, current: Decimal) -> Decimal {
    if original.is_zero() {
        return Decimal::ZERO;
    }
    ((original - current) / original * Decimal::ONE_HUNDRED).round_dp(2)
}

fn outcome(quote: &Quote, history: &[NegotiationEntry]) -> NegotiationOutcome {
    if quote.status == QuoteStatus::Accepted {
        return NegotiationOutcome::Completed;
    }
    if history.iter().any(NegotiationEntry::is_live) {
        return NegotiationOutcome::Active;
    }
    match quote.status {
        QuoteStatus::Rejected | QuoteStatus::Withdrawn => return NegotiationOutcome::Cancelled,
        QuoteStatus::Expired => return NegotiationOutcome::Expired,
        QuoteStatus::Pending | QuoteStatus::Negotiating | QuoteStatus::Accepted => {}
    }
    match history.last().map(|entry| entry.status) {
        Some(NegotiationStatus::Expired) => NegotiationOutcome::Expired,
        Some(NegotiationStatus::Rejected) => NegotiationOutcome::Cancelled,
        Some(NegotiationStatus::Pending | NegotiationStatus::Accepted) | None => {
            NegotiationOutcome::Active
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserNegotiationStats {
    pub user_id: UserId,
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    /// Mean reduction over completed negotiations, 2 dp.
    pub average_price_reduction_percentage: Decimal,
    /// Completed as a percentage of total, 2 dp.
    pub success_rate: Decimal,
    pub average_rounds: Decimal,
}

pub fn user_negotiation_stats(
    user_id: UserId,
    summaries: &[NegotiationSummary],
) -> UserNegotiationStats {
    let total = summaries.len() as u64;
    let active = summaries
        .iter()
        .filter(|summary| summary.history.iter().any(NegotiationEntry::is_live))
        .count() as u64;
    let completed: Vec<&NegotiationSummary> = summaries
        .iter()
        .filter(|summary| summary.status == NegotiationOutcome::Completed)
        .collect();

    let average_price_reduction_percentage = if completed.is_empty() {
        Decimal::ZERO
    } else {
        (completed.iter().map(|summary| summary.price_reduction_percentage).sum::<Decimal>()
            / Decimal::from(completed.len()))
        .round_dp(2)
    };
    let average_rounds = if total == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(summaries.iter().map(|summary| u64::from(summary.rounds)).sum::<u64>())
            / Decimal::from(total))
        .round_dp(2)
    };

    UserNegotiationStats {
        user_id,
        total,
        active,
        completed: completed.len() as u64,
        average_price_reduction_percentage,
        success_rate: percentage(completed.len() as u64, total),
        average_rounds,
    }
}
