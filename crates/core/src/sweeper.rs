//! Timeout-driven maintenance: expiry of stale offers, quotes and RFQs, and automatic
//! acceptance of counter-offers that stalled close to the quoted price.
//!
//! Every pass is set-based and guarded on current status, so overlapping runs (or a run
//! racing a live response) find nothing left to do rather than double-applying.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AutoConversionConfig;
use crate::domain::negotiation::{NegotiationEntry, NegotiationId};
use crate::domain::quote::QuoteId;
use crate::domain::rfq::RfqId;
use crate::errors::{EngineError, EntityKind};
use crate::negotiation::manager::Acceptor;
use crate::negotiation::NegotiationManager;
use crate::store::MarketplaceStore;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpirySweepReport {
    pub expired_negotiations: Vec<NegotiationId>,
    pub reverted_quotes: Vec<QuoteId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoConversionFailure {
    pub negotiation_id: NegotiationId,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoConversionReport {
    pub examined: usize,
    pub converted: Vec<QuoteId>,
    /// Stale offers outside the threshold.
    pub skipped: Vec<NegotiationId>,
    pub failures: Vec<AutoConversionFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub negotiations: ExpirySweepReport,
    pub expired_quotes: Vec<QuoteId>,
    pub expired_rfqs: Vec<RfqId>,
    pub auto_conversion: AutoConversionReport,
}

impl SweepReport {
    pub fn total_changes(&self) -> usize {
        self.negotiations.expired_negotiations.len()
            + self.negotiations.reverted_quotes.len()
            + self.expired_quotes.len()
            + self.expired_rfqs.len()
            + self.auto_conversion.converted.len()
    }
}

pub struct Sweeper<S> {
    store: S,
    negotiations: NegotiationManager<S>,
    auto_conversion: AutoConversionConfig,
}

impl<S: MarketplaceStore> Sweeper<S> {
    /// `store` must be the same store `negotiations` writes through.
    pub fn new(
        store: S,
        negotiations: NegotiationManager<S>,
        auto_conversion: AutoConversionConfig,
    ) -> Self {
        Self { store, negotiations, auto_conversion }
    }

    pub async fn process_expired_negotiations(&self) -> Result<ExpirySweepReport, EngineError> {
        self.process_expired_negotiations_at(Utc::now()).await
    }

    pub async fn process_expired_negotiations_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpirySweepReport, EngineError> {
        let expiry = self.store.expire_negotiations(now).await?;
        if !expiry.expired.is_empty() {
            info!(
                event_name = "sweep.negotiations_expired",
                expired = expiry.expired.len(),
                reverted_quotes = expiry.reverted_quotes.len(),
                "expired lapsed counter-offers"
            );
        }
        Ok(ExpirySweepReport {
            expired_negotiations: expiry.expired,
            reverted_quotes: expiry.reverted_quotes,
        })
    }

    pub async fn process_expired_quotes(&self) -> Result<Vec<QuoteId>, EngineError> {
        self.process_expired_quotes_at(Utc::now()).await
    }

    pub async fn process_expired_quotes_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<QuoteId>, EngineError> {
        let expired = self.store.expire_quotes(now).await?;
        if !expired.is_empty() {
            info!(event_name = "sweep.quotes_expired", expired = expired.len(), "expired quotes");
        }
        Ok(expired)
    }

    pub async fn process_expired_rfqs(&self) -> Result<Vec<RfqId>, EngineError> {
        self.process_expired_rfqs_at(Utc::now()).await
    }

    pub async fn process_expired_rfqs_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RfqId>, EngineError> {
        let expired = self.store.expire_rfqs(now).await?;
        if !expired.is_empty() {
            info!(event_name = "sweep.rfqs_expired", expired = expired.len(), "expired rfqs");
        }
        Ok(expired)
    }

    /// Falls back to the configured settings when `settings` is `None`.
    pub async fn process_auto_conversion(
        &self,
        settings: Option<&AutoConversionConfig>,
    ) -> Result<AutoConversionReport, EngineError> {
        self.process_auto_conversion_at(settings, Utc::now()).await
    }

    pub async fn process_auto_conversion_at(
        &self,
        settings: Option<&AutoConversionConfig>,
        now: DateTime<Utc>,
    ) -> Result<AutoConversionReport, EngineError> {
        let settings = settings.unwrap_or(&self.auto_conversion);
        let mut report = AutoConversionReport::default();
        if !settings.enabled {
            return Ok(report);
        }

        let cutoff = now - Duration::hours(i64::from(settings.negotiation_timeout_hours));
        let candidates = self.store.list_stale_counter_offers(cutoff, now).await?;
        report.examined = candidates.len();

        for entry in candidates {
            let negotiation_id = entry.id.clone();
            match self.convert_candidate(entry, settings.auto_accept_threshold_pct, now).await {
                Ok(Some(quote_id)) => report.converted.push(quote_id),
                Ok(None) => report.skipped.push(negotiation_id),
                Err(error) => {
                    warn!(
                        event_name = "sweep.auto_conversion_failed",
                        negotiation_id = %negotiation_id.0,
                        error = %error,
                        "auto-conversion candidate failed"
                    );
                    report
                        .failures
                        .push(AutoConversionFailure { negotiation_id, error: error.to_string() });
                }
            }
        }

        info!(
            event_name = "sweep.auto_conversion",
            examined = report.examined,
            converted = report.converted.len(),
            failed = report.failures.len(),
            "auto-conversion pass finished"
        );
        Ok(report)
    }

    async fn convert_candidate(
        &self,
        entry: NegotiationEntry,
        threshold_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<QuoteId>, EngineError> {
        let quote = self
            .store
            .get_quote(&entry.quote_id)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Quote, entry.quote_id.0.clone()))?;

        let deviation = deviation_pct(quote.original_price, entry.price);
        if deviation > threshold_pct {
            debug!(
                negotiation_id = %entry.id.0,
                deviation = %deviation,
                "stale counter-offer outside auto-accept threshold"
            );
            return Ok(None);
        }

        let acceptance =
            self.negotiations.accept_counter_offer(entry, Acceptor::System, now).await?;
        Ok(Some(acceptance.quote.id))
    }

    pub async fn run_sweep(&self) -> Result<SweepReport, EngineError> {
        self.run_sweep_at(Utc::now()).await
    }

    /// Expired negotiations, expired quotes, expired RFQs, then auto-conversion.
    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let negotiations = self.process_expired_negotiations_at(now).await?;
        let expired_quotes = self.process_expired_quotes_at(now).await?;
        let expired_rfqs = self.process_expired_rfqs_at(now).await?;
        let auto_conversion = self.process_auto_conversion_at(None, now).await?;

        let report = SweepReport { negotiations, expired_quotes, expired_rfqs, auto_conversion };
        debug!(event_name = "sweep.finished", changes = report.total_changes(), "sweep finished");
        Ok(report)
    }
}

/// |offer - original| / original * 100. A zero original never qualifies.
fn deviation_pct(original: Decimal, offer: Decimal) -> Decimal {
    if original <= Decimal::ZERO {
        return Decimal::MAX;
    }
    ((offer - original).abs() / original * Decimal::ONE_HUNDRED).round_dp(4)
}
