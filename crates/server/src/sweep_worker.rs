use std::sync::Arc;
use std::time::Duration;

use souk_core::{MarketplaceStore, SweepReport, Sweeper};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Starts the periodic sweep. The handle never resolves on its own; abort it on shutdown.
pub fn start_sweep_worker<S>(sweeper: Arc<Sweeper<S>>, interval: Duration) -> JoinHandle<()>
where
    S: MarketplaceStore + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            event_name = "system.sweeper.started",
            interval_secs = interval.as_secs(),
            "sweep worker started"
        );
        loop {
            timer.tick().await;
            run_sweep_pass(&sweeper).await;
        }
    })
}

/// One sweep, logged. Errors are reported and left for the next tick.
pub async fn run_sweep_pass<S: MarketplaceStore>(sweeper: &Sweeper<S>) -> Option<SweepReport> {
    match sweeper.run_sweep().await {
        Ok(report) => {
            log_report(&report);
            Some(report)
        }
        Err(error) => {
            error!(
                event_name = "system.sweeper.error",
                error = %error,
                "sweep pass failed"
            );
            None
        }
    }
}

fn log_report(report: &SweepReport) {
    info!(
        event_name = "system.sweeper.completed",
        changes = report.total_changes(),
        expired_negotiations = report.negotiations.expired_negotiations.len(),
        reverted_quotes = report.negotiations.reverted_quotes.len(),
        expired_quotes = report.expired_quotes.len(),
        expired_rfqs = report.expired_rfqs.len(),
        auto_converted = report.auto_conversion.converted.len(),
        "sweep pass completed"
    );
    if !report.auto_conversion.converted.is_empty() {
        debug!(
            event_name = "system.sweeper.auto_converted",
            quote_ids = %report
                .auto_conversion
                .converted
                .iter()
                .map(|quote_id| quote_id.0.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            "stale counter-offers auto-accepted"
        );
    }
    for failure in &report.auto_conversion.failures {
        warn!(
            event_name = "system.sweeper.auto_conversion_failed",
            negotiation_id = %failure.negotiation_id.0,
            error = %failure.error,
            "auto-conversion candidate failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use souk_core::config::{AutoConversionConfig, NegotiationConfig};
    use souk_core::{
        InMemoryNotifier, InMemoryStore, MarketplaceStore, NegotiationManager, Notifier, Quote,
        QuoteId, QuoteStatus, Rfq, RfqId, RfqStatus, Sweeper, UserId,
    };

    use super::{run_sweep_pass, start_sweep_worker};

    async fn sweeper_with_lapsed_quote() -> (InMemoryStore, Sweeper<InMemoryStore>) {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert_rfq(Rfq {
                id: RfqId("RFQ-1".to_string()),
                buyer_id: UserId::new("buyer-1"),
                category_id: "packaging".to_string(),
                title: "Corrugated boxes".to_string(),
                quantity: 500,
                budget_min: None,
                budget_max: None,
                delivery_timeline: None,
                status: RfqStatus::Active,
                expires_at: now + ChronoDuration::days(7),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("rfq");
        store.insert_quote_unchecked(Quote {
            id: QuoteId("Q-1".to_string()),
            rfq_id: RfqId("RFQ-1".to_string()),
            seller_id: UserId::new("seller-1"),
            total_price: Decimal::new(900, 0),
            original_price: Decimal::new(900, 0),
            delivery_timeline: None,
            terms_conditions: None,
            proposed_terms: None,
            valid_until: now - ChronoDuration::minutes(5),
            status: QuoteStatus::Pending,
            rejection_reason: None,
            items: Vec::new(),
            created_at: now - ChronoDuration::days(30),
            updated_at: now - ChronoDuration::days(30),
        })
        .await;

        let notifier: Arc<dyn Notifier> = Arc::new(InMemoryNotifier::default());
        let sweeper = Sweeper::new(
            store.clone(),
            NegotiationManager::new(store.clone(), notifier, NegotiationConfig::default()),
            AutoConversionConfig::default(),
        );
        (store, sweeper)
    }

    #[tokio::test]
    async fn sweep_pass_reports_expired_quotes() {
        let (_store, sweeper) = sweeper_with_lapsed_quote().await;

        let report = run_sweep_pass(&sweeper).await.expect("report");
        assert_eq!(report.expired_quotes, vec![QuoteId("Q-1".to_string())]);

        let second = run_sweep_pass(&sweeper).await.expect("report");
        assert_eq!(second.total_changes(), 0);
    }

    #[tokio::test]
    async fn worker_sweeps_on_its_first_tick() {
        let (store, sweeper) = sweeper_with_lapsed_quote().await;

        let handle = start_sweep_worker(Arc::new(sweeper), Duration::from_secs(3600));
        let mut expired = false;
        for _ in 0..50 {
            let quote = store.get_quote(&QuoteId("Q-1".to_string())).await.expect("read");
            if quote.map(|quote| quote.status) == Some(QuoteStatus::Expired) {
                expired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(expired, "the first tick fires immediately");
    }
}
