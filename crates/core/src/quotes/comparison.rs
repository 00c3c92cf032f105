//! Best-value scoring across competing quotes on one RFQ.

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Quote, QuoteId};
use crate::domain::rfq::RfqId;
use crate::domain::seller::VerificationTier;

/// Upper bound of each scoring component
pub const PRICE_WEIGHT: f64 = 40.0;
pub const SELLER_WEIGHT: f64 = 30.0;
pub const DELIVERY_WEIGHT: f64 = 20.0;
pub const TERMS_WEIGHT: f64 = 10.0;

/// Terms longer than this count as detailed.
const DETAILED_TERMS_CHARS: usize = 50;

/// Individual scoring components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreBreakdown {
    /// Relative price position (0 - 40)
    pub price: f64,
    /// Seller verification tier (0 - 30)
    pub seller: f64,
    /// Delivery speed (0 - 20)
    pub delivery: f64,
    /// Terms completeness (0 - 10)
    pub terms: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredQuote {
    pub quote: Quote,
    pub verification_tier: VerificationTier,
    pub score: ScoreBreakdown,
    pub is_best_value: bool,
    /// Human-readable reasoning, only filled for the best-value quote
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteComparison {
    pub rfq_id: RfqId,
    /// Ranked best first
    pub quotes: Vec<ScoredQuote>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub average_price: Option<Decimal>,
    pub best_value: Option<QuoteId>,
}

/// Score calculator for quote comparison
#[derive(Debug, Clone, Default)]
pub struct QuoteScorer;

impl QuoteScorer {
    pub fn new() -> Self {
        Self
    }

    /// Price score: the cheapest quote gets the full weight, the most expensive none.
    /// When every price is equal each quote gets the full weight.
    pub fn price_score(&self, price: Decimal, min: Decimal, max: Decimal) -> f64 {
        let spread = max - min;
        if spread <= Decimal::ZERO {
            return PRICE_WEIGHT;
        }

        let position = ((max - price) / spread).to_f64().unwrap_or(0.0);
        PRICE_WEIGHT * position.clamp(0.0, 1.0)
    }

    pub fn seller_score(&self, tier: VerificationTier) -> f64 {
        match tier {
            VerificationTier::Basic => 10.0,
            VerificationTier::Standard => 20.0,
            VerificationTier::Enhanced => 25.0,
            VerificationTier::Premium => SELLER_WEIGHT,
        }
    }

    /// Delivery score from the free-text timeline
    pub fn delivery_score(&self, delivery_timeline: Option<&str>) -> f64 {
        let Some(timeline) = delivery_timeline else {
            return 10.0;
        };

        let normalized = timeline.trim().to_ascii_lowercase().replace('\u{2013}', "-");
        if normalized.contains("immediate") || normalized.contains("same day") {
            DELIVERY_WEIGHT
        } else if normalized.contains("next day") {
            18.0
        } else if normalized.contains("2-3 days") || normalized.contains("2 to 3 days") {
            15.0
        } else {
            10.0
        }
    }

    pub fn terms_score(&self, terms_conditions: Option<&str>) -> f64 {
        match terms_conditions {
            Some(terms) if terms.chars().count() > DETAILED_TERMS_CHARS => TERMS_WEIGHT,
            _ => 5.0,
        }
    }

    pub fn score(
        &self,
        quote: &Quote,
        tier: VerificationTier,
        min: Decimal,
        max: Decimal,
    ) -> ScoreBreakdown {
        let price = self.price_score(quote.total_price, min, max);
        let seller = self.seller_score(tier);
        let delivery = self.delivery_score(quote.delivery_timeline.as_deref());
        let terms = self.terms_score(quote.terms_conditions.as_deref());

        ScoreBreakdown { price, seller, delivery, terms, total: price + seller + delivery + terms }
    }

    /// Scores and ranks the candidates. The top entry is flagged as best value.
    pub fn compare(
        &self,
        rfq_id: RfqId,
        candidates: Vec<(Quote, VerificationTier)>,
    ) -> QuoteComparison {
        let prices: Vec<Decimal> = candidates.iter().map(|(quote, _)| quote.total_price).collect();
        let (Some(min), Some(max)) = (prices.iter().min().copied(), prices.iter().max().copied())
        else {
            return QuoteComparison {
                rfq_id,
                quotes: Vec::new(),
                min_price: None,
                max_price: None,
                average_price: None,
                best_value: None,
            };
        };
        let average = prices.iter().copied().sum::<Decimal>() / Decimal::from(prices.len());

        let mut scored: Vec<ScoredQuote> = candidates
            .into_iter()
            .map(|(quote, tier)| {
                let score = self.score(&quote, tier, min, max);
                ScoredQuote {
                    quote,
                    verification_tier: tier,
                    score,
                    is_best_value: false,
                    reasons: Vec::new(),
                }
            })
            .collect();
        scored.sort_by(rank);

        let best_value = scored.first_mut().map(|best| {
            best.is_best_value = true;
            best.reasons = self.reasons(best, min);
            best.quote.id.clone()
        });

        QuoteComparison {
            rfq_id,
            quotes: scored,
            min_price: Some(min),
            max_price: Some(max),
            average_price: Some(average.round_dp(2)),
            best_value,
        }
    }

    fn reasons(&self, scored: &ScoredQuote, min: Decimal) -> Vec<String> {
        let mut reasons = Vec::new();
        if scored.quote.total_price == min {
            reasons.push("Lowest price".to_string());
        }
        match scored.verification_tier {
            VerificationTier::Premium => reasons.push("Premium verified seller".to_string()),
            VerificationTier::Enhanced => reasons.push("Enhanced verified seller".to_string()),
            VerificationTier::Basic | VerificationTier::Standard => {}
        }
        if scored.score.delivery >= 18.0 {
            reasons.push("Fast delivery".to_string());
        }
        if scored.score.terms >= TERMS_WEIGHT {
            reasons.push("Detailed terms provided".to_string());
        }
        reasons
    }
}

/// Higher total first, then lower price, then earlier creation.
fn rank(left: &ScoredQuote, right: &ScoredQuote) -> Ordering {
    right
        .score
        .total
        .partial_cmp(&left.score.total)
        .unwrap_or(Ordering::Equal)
        .then_with(|| left.quote.total_price.cmp(&right.quote.total_price))
        .then_with(|| left.quote.created_at.cmp(&right.quote.created_at))
}
