use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::summary::{summarize, user_negotiation_stats, UserNegotiationStats};
use super::{CounterOffer, CounterOfferResponse, ResponseOutcome};
use crate::acceptance::{complete_acceptance, plan_acceptance, Acceptance, Deal};
use crate::config::NegotiationConfig;
use crate::domain::negotiation::{
    NegotiationEntry, NegotiationId, NegotiationStatus, NegotiationSummary, OfferType,
};
use crate::domain::order::ConversionSource;
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::domain::rfq::{Rfq, RfqId, RfqStatus};
use crate::domain::UserId;
use crate::errors::{EngineError, EntityKind};
use crate::hooks::OrderConversionHook;
use crate::notify::{dispatch, Notification, NotificationTemplate, Notifier};
use crate::quotes::manager::ensure_buyer;
use crate::store::{MarketplaceStore, QuotePatch, UnitOfWork, WriteOp};

/// Who is accepting a counter-offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Acceptor {
    /// The addressee of the offer.
    Party,
    /// Auto-conversion acting on behalf of the addressee.
    System,
}

pub struct NegotiationManager<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
    order_hook: Option<Arc<dyn OrderConversionHook>>,
    settings: NegotiationConfig,
}

impl<S: MarketplaceStore> NegotiationManager<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>, settings: NegotiationConfig) -> Self {
        Self { store, notifier, order_hook: None, settings }
    }

    pub fn with_order_hook(mut self, order_hook: Arc<dyn OrderConversionHook>) -> Self {
        self.order_hook = Some(order_hook);
        self
    }

    /// Opens a negotiation round: the RFQ's buyer proposes a new price on a pending quote.
    pub async fn create_counter_offer(
        &self,
        buyer_id: &UserId,
        quote_id: &QuoteId,
        offer: CounterOffer,
    ) -> Result<NegotiationEntry, EngineError> {
        let now = Utc::now();
        let quote = self.load_quote(quote_id).await?;
        let rfq = self.load_rfq(&quote.rfq_id).await?;
        ensure_buyer(&rfq, buyer_id)?;
        if quote.status != QuoteStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and cannot be countered",
                quote.id.0,
                quote.status.as_str()
            )));
        }
        if quote.is_expired_at(now) {
            return Err(EngineError::Expired(format!("quote `{}` has expired", quote.id.0)));
        }
        ensure_positive(offer.price)?;
        self.ensure_round_available(&quote.id).await?;
        let valid_until = self.offer_validity(offer.valid_until, now)?;

        let entry = NegotiationEntry {
            id: NegotiationId(Uuid::new_v4().to_string()),
            quote_id: quote.id.clone(),
            from_user_id: buyer_id.clone(),
            to_user_id: quote.seller_id.clone(),
            offer_type: OfferType::Counter,
            price: offer.price,
            terms: offer.terms.clone(),
            message: offer.message,
            response_message: None,
            status: NegotiationStatus::Pending,
            valid_until,
            created_at: now,
            responded_at: None,
        };

        let unit = UnitOfWork::new("create_counter_offer", now)
            .with(WriteOp::UpdateQuote {
                quote_id: quote.id.clone(),
                expect: vec![QuoteStatus::Pending],
                patch: QuotePatch {
                    status: Some(QuoteStatus::Negotiating),
                    proposed_terms: offer.terms.map(Some),
                    ..QuotePatch::default()
                },
            })
            .with(WriteOp::InsertNegotiation {
                entry: entry.clone(),
                max_rounds: self.settings.max_rounds,
            });
        self.store.apply(unit).await?;

        info!(
            event_name = "negotiation.counter_created",
            negotiation_id = %entry.id.0,
            quote_id = %quote.id.0,
            price = %entry.price,
            "buyer counter-offer created"
        );
        self.notify_counter(&entry, &quote);

        Ok(entry)
    }

    /// Answers the live offer addressed to `responder_id`.
    pub async fn respond_to_counter_offer(
        &self,
        responder_id: &UserId,
        negotiation_id: &NegotiationId,
        response: CounterOfferResponse,
    ) -> Result<ResponseOutcome, EngineError> {
        let now = Utc::now();
        let entry = self.load_entry(negotiation_id).await?;
        if &entry.to_user_id != responder_id {
            return Err(EngineError::Authorization(format!(
                "`{}` is not the recipient of negotiation `{}`",
                responder_id.0, entry.id.0
            )));
        }
        ensure_live(&entry, now)?;

        match response {
            CounterOfferResponse::Accept => self
                .accept_counter_offer(entry, Acceptor::Party, now)
                .await
                .map(ResponseOutcome::Converted),
            CounterOfferResponse::Reject { message } => {
                self.reject_counter_offer(entry, message, now).await.map(ResponseOutcome::Rejected)
            }
            CounterOfferResponse::Counter { price, terms, message, valid_until } => {
                let price = price.ok_or_else(|| {
                    EngineError::Validation("a counter response requires a price".to_string())
                })?;
                let offer = CounterOffer { price, terms, valid_until, message };
                self.counter_back(entry, offer, now).await.map(ResponseOutcome::Countered)
            }
        }
    }

    pub async fn get_negotiation(
        &self,
        negotiation_id: &NegotiationId,
        viewer_id: &UserId,
    ) -> Result<NegotiationEntry, EngineError> {
        let entry = self.load_entry(negotiation_id).await?;
        if !entry.involves(viewer_id) {
            return Err(EngineError::Authorization(format!(
                "`{}` is not a party to negotiation `{}`",
                viewer_id.0, entry.id.0
            )));
        }
        Ok(entry)
    }

    pub async fn negotiation_history(
        &self,
        quote_id: &QuoteId,
        viewer_id: &UserId,
    ) -> Result<NegotiationSummary, EngineError> {
        let quote = self.load_quote(quote_id).await?;
        let rfq = self.load_rfq(&quote.rfq_id).await?;
        if &quote.seller_id != viewer_id && &rfq.buyer_id != viewer_id {
            return Err(EngineError::Authorization(format!(
                "`{}` is not a party to quote `{}`",
                viewer_id.0, quote.id.0
            )));
        }
        let history = self.store.list_negotiations_for_quote(&quote.id).await?;
        Ok(summarize(&quote, history))
    }

    pub async fn user_negotiation_stats(
        &self,
        user_id: &UserId,
    ) -> Result<UserNegotiationStats, EngineError> {
        let quotes = self.store.list_negotiated_quotes_for_user(user_id).await?;
        let mut summaries = Vec::with_capacity(quotes.len());
        for quote in quotes {
            let history = self.store.list_negotiations_for_quote(&quote.id).await?;
            summaries.push(summarize(&quote, history));
        }
        Ok(user_negotiation_stats(user_id.clone(), &summaries))
    }

    /// Accepts `entry` atomically: the entry, the quote at the negotiated price, sibling
    /// rejection, RFQ completion and the order intent all commit together.
    pub(crate) async fn accept_counter_offer(
        &self,
        entry: NegotiationEntry,
        acceptor: Acceptor,
        now: DateTime<Utc>,
    ) -> Result<Acceptance, EngineError> {
        ensure_live(&entry, now)?;
        let quote = self.load_quote(&entry.quote_id).await?;
        let rfq = self.load_rfq(&quote.rfq_id).await?;
        if quote.status != QuoteStatus::Negotiating {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and has no open negotiation",
                quote.id.0,
                quote.status.as_str()
            )));
        }
        if rfq.status != RfqStatus::Active {
            return Err(EngineError::Conflict(format!("rfq `{}` is no longer active", rfq.id.0)));
        }

        let source = match acceptor {
            Acceptor::Party => ConversionSource::CounterOfferAcceptance,
            Acceptor::System => ConversionSource::AutoConversion,
        };
        let deal =
            Deal { price: entry.price, terms: entry.terms.clone(), entry: Some(&entry.id), source };
        let plan = plan_acceptance(&quote, &rfq, vec![QuoteStatus::Negotiating], deal, now);
        let receipt = self.store.apply(plan.unit.clone()).await?;

        let template = match acceptor {
            Acceptor::Party => NotificationTemplate::CounterOfferAccepted,
            Acceptor::System => NotificationTemplate::CounterOfferAutoAccepted,
        };
        for party in [&entry.from_user_id, &entry.to_user_id] {
            dispatch(
                self.notifier.as_ref(),
                Notification::in_app(party.clone(), template)
                    .with_data("negotiation_id", entry.id.0.clone())
                    .with_data("quote_id", quote.id.0.clone())
                    .with_data("final_price", entry.price.to_string()),
            );
        }

        Ok(complete_acceptance(
            &self.store,
            self.notifier.as_ref(),
            self.order_hook.as_ref(),
            plan,
            receipt,
        )
        .await)
    }

    async fn reject_counter_offer(
        &self,
        mut entry: NegotiationEntry,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<NegotiationEntry, EngineError> {
        let unit = UnitOfWork::new("reject_counter_offer", now)
            .with(WriteOp::ResolveNegotiation {
                negotiation_id: entry.id.clone(),
                to: NegotiationStatus::Rejected,
                response_message: message.clone(),
            })
            .with(WriteOp::UpdateQuote {
                quote_id: entry.quote_id.clone(),
                expect: vec![QuoteStatus::Negotiating],
                patch: QuotePatch {
                    status: Some(QuoteStatus::Pending),
                    proposed_terms: Some(None),
                    ..QuotePatch::default()
                },
            });
        self.store.apply(unit).await?;

        entry.transition_to(NegotiationStatus::Rejected)?;
        entry.response_message = message;
        entry.responded_at = Some(now);

        info!(
            event_name = "negotiation.counter_rejected",
            negotiation_id = %entry.id.0,
            quote_id = %entry.quote_id.0,
            "counter-offer rejected; quote back to pending"
        );
        let mut notification = Notification::in_app(
            entry.from_user_id.clone(),
            NotificationTemplate::CounterOfferRejected,
        )
        .with_data("negotiation_id", entry.id.0.clone())
        .with_data("quote_id", entry.quote_id.0.clone());
        if let Some(message) = &entry.response_message {
            notification = notification.with_data("message", message.clone());
        }
        dispatch(self.notifier.as_ref(), notification);

        Ok(entry)
    }

    /// Closes `prior` and opens a new counter addressed back to its sender.
    async fn counter_back(
        &self,
        prior: NegotiationEntry,
        offer: CounterOffer,
        now: DateTime<Utc>,
    ) -> Result<NegotiationEntry, EngineError> {
        ensure_positive(offer.price)?;
        let quote = self.load_quote(&prior.quote_id).await?;
        if quote.status != QuoteStatus::Negotiating {
            return Err(EngineError::Conflict(format!(
                "quote `{}` is {} and has no open negotiation",
                quote.id.0,
                quote.status.as_str()
            )));
        }
        self.ensure_round_available(&quote.id).await?;
        let valid_until = self.offer_validity(offer.valid_until, now)?;

        let entry = NegotiationEntry {
            id: NegotiationId(Uuid::new_v4().to_string()),
            quote_id: quote.id.clone(),
            from_user_id: prior.to_user_id.clone(),
            to_user_id: prior.from_user_id.clone(),
            offer_type: OfferType::Counter,
            price: offer.price,
            terms: offer.terms.clone(),
            message: offer.message,
            response_message: None,
            status: NegotiationStatus::Pending,
            valid_until,
            created_at: now,
            responded_at: None,
        };

        let unit = UnitOfWork::new("counter_back", now)
            .with(WriteOp::ResolveNegotiation {
                negotiation_id: prior.id.clone(),
                to: NegotiationStatus::Rejected,
                response_message: Some("countered".to_string()),
            })
            .with(WriteOp::UpdateQuote {
                quote_id: quote.id.clone(),
                expect: vec![QuoteStatus::Negotiating],
                patch: QuotePatch { proposed_terms: Some(offer.terms), ..QuotePatch::default() },
            })
            .with(WriteOp::InsertNegotiation {
                entry: entry.clone(),
                max_rounds: self.settings.max_rounds,
            });
        self.store.apply(unit).await?;

        info!(
            event_name = "negotiation.counter_returned",
            negotiation_id = %entry.id.0,
            prior_negotiation_id = %prior.id.0,
            quote_id = %quote.id.0,
            price = %entry.price,
            "counter-offer answered with a new counter"
        );
        self.notify_counter(&entry, &quote);

        Ok(entry)
    }

    fn notify_counter(&self, entry: &NegotiationEntry, quote: &Quote) {
        dispatch(
            self.notifier.as_ref(),
            Notification::in_app(
                entry.to_user_id.clone(),
                NotificationTemplate::CounterOfferReceived,
            )
            .with_data("negotiation_id", entry.id.0.clone())
            .with_data("quote_id", quote.id.0.clone())
            .with_data("price", entry.price.to_string())
            .with_data("valid_until", entry.valid_until.to_rfc3339()),
        );
    }

    async fn ensure_round_available(&self, quote_id: &QuoteId) -> Result<(), EngineError> {
        let rounds = self.store.list_negotiations_for_quote(quote_id).await?.len();
        if rounds >= self.settings.max_rounds as usize {
            warn!(
                event_name = "negotiation.round_limit_reached",
                quote_id = %quote_id.0,
                rounds,
                "negotiation round limit reached"
            );
            return Err(EngineError::Conflict(format!(
                "quote `{}` reached the negotiation round limit of {}",
                quote_id.0, self.settings.max_rounds
            )));
        }
        Ok(())
    }

    fn offer_validity(
        &self,
        requested: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        match requested {
            Some(valid_until) if valid_until <= now => {
                Err(EngineError::Validation("valid_until must be in the future".to_string()))
            }
            Some(valid_until) => Ok(valid_until),
            None => {
                Ok(now + Duration::hours(i64::from(self.settings.counter_offer_validity_hours)))
            }
        }
    }

    pub(crate) async fn load_quote(&self, quote_id: &QuoteId) -> Result<Quote, EngineError> {
        self.store
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Quote, quote_id.0.clone()))
    }

    async fn load_rfq(&self, rfq_id: &RfqId) -> Result<Rfq, EngineError> {
        self.store
            .get_rfq(rfq_id)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Rfq, rfq_id.0.clone()))
    }

    async fn load_entry(
        &self,
        negotiation_id: &NegotiationId,
    ) -> Result<NegotiationEntry, EngineError> {
        self.store.get_negotiation(negotiation_id).await?.ok_or_else(|| {
            EngineError::not_found(EntityKind::Negotiation, negotiation_id.0.clone())
        })
    }
}

fn ensure_positive(price: Decimal) -> Result<(), EngineError> {
    if price <= Decimal::ZERO {
        return Err(EngineError::Validation("counter-offer price must be positive".to_string()));
    }
    Ok(())
}

fn ensure_live(entry: &NegotiationEntry, now: DateTime<Utc>) -> Result<(), EngineError> {
    if !entry.is_live() {
        return Err(EngineError::Conflict(format!(
            "negotiation `{}` is already {}",
            entry.id.0,
            entry.status.as_str()
        )));
    }
    if entry.is_expired_at(now) {
        return Err(EngineError::Expired(format!(
            "counter-offer `{}` lapsed at {}",
            entry.id.0,
            entry.valid_until.to_rfc3339()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::negotiation::{
        NegotiationEntry, NegotiationId, NegotiationOutcome, NegotiationStatus, OfferType,
    };
    use crate::domain::quote::QuoteStatus;
    use crate::domain::rfq::{RfqId, RfqStatus};
    use crate::domain::UserId;
    use crate::errors::ErrorKind;
    use crate::negotiation::{CounterOffer, CounterOfferResponse, ResponseOutcome};
    use crate::notify::NotificationTemplate;
    use crate::store::MarketplaceStore;
    use crate::test_support::{buyer, harness, quote_at, quote_id};

    fn seller() -> UserId {
        UserId::new("seller-1")
    }

    #[tokio::test]
    async fn counter_offer_moves_quote_to_negotiating_and_notifies_seller() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;
        let before = Utc::now();

        let entry = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer {
                    terms: Some("net 45".to_string()),
                    ..CounterOffer::at_price(Decimal::new(1500, 0))
                },
            )
            .await
            .expect("counter-offer");

        assert_eq!(entry.to_user_id, seller());
        assert_eq!(entry.status, NegotiationStatus::Pending);
        assert!(entry.valid_until >= before + Duration::hours(24));

        let quote = h.store.get_quote(&quote_id("Q-1")).await.expect("read").expect("quote");
        assert_eq!(quote.status, QuoteStatus::Negotiating);
        assert_eq!(quote.proposed_terms.as_deref(), Some("net 45"));
        assert_eq!(quote.terms_conditions.as_deref(), Some("net 30"));
        assert_eq!(h.notifier.sent_to(&seller()), vec![NotificationTemplate::CounterOfferReceived]);
    }

    #[tokio::test]
    async fn only_the_rfq_buyer_may_counter_with_a_positive_price() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;

        let stranger = h
            .negotiations
            .create_counter_offer(
                &UserId::new("buyer-2"),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1500, 0)),
            )
            .await
            .expect_err("not the buyer");
        assert_eq!(stranger.kind(), ErrorKind::Authorization);

        let zero = h
            .negotiations
            .create_counter_offer(&buyer(), &quote_id("Q-1"), CounterOffer::at_price(Decimal::ZERO))
            .await
            .expect_err("zero price");
        assert_eq!(zero.kind(), ErrorKind::Validation);

        let past = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer {
                    valid_until: Some(Utc::now() - Duration::minutes(1)),
                    ..CounterOffer::at_price(Decimal::new(1500, 0))
                },
            )
            .await
            .expect_err("validity in the past");
        assert_eq!(past.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn second_counter_on_a_negotiating_quote_conflicts() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;
        h.negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1500, 0)),
            )
            .await
            .expect("first counter");

        let error = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1400, 0)),
            )
            .await
            .expect_err("quote is negotiating");
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn rejecting_a_counter_restores_the_original_quote() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;
        let entry = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer {
                    terms: Some("net 60".to_string()),
                    ..CounterOffer::at_price(Decimal::new(1500, 0))
                },
            )
            .await
            .expect("counter");

        let outcome = h
            .negotiations
            .respond_to_counter_offer(
                &seller(),
                &entry.id,
                CounterOfferResponse::Reject { message: Some("too low".to_string()) },
            )
            .await
            .expect("reject");

        let ResponseOutcome::Rejected(rejected) = outcome else {
            panic!("expected a rejection outcome");
        };
        assert_eq!(rejected.status, NegotiationStatus::Rejected);
        assert_eq!(rejected.response_message.as_deref(), Some("too low"));

        let quote = h.store.get_quote(&quote_id("Q-1")).await.expect("read").expect("quote");
        assert_eq!(quote.status, QuoteStatus::Pending);
        assert_eq!(quote.total_price, Decimal::new(1800, 0));
        assert_eq!(quote.proposed_terms, None);
        assert!(h.notifier.sent_to(&buyer()).contains(&NotificationTemplate::CounterOfferRejected));
    }

    #[tokio::test]
    async fn seller_counter_then_buyer_accept_converts_at_negotiated_price() {
        let h = harness(&[("Q-1", "seller-1", 1800), ("Q-2", "seller-2", 1900)]).await;
        let opening = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1500, 0)),
            )
            .await
            .expect("buyer counter");

        let ResponseOutcome::Countered(reply) = h
            .negotiations
            .respond_to_counter_offer(
                &seller(),
                &opening.id,
                CounterOfferResponse::Counter {
                    price: Some(Decimal::new(1650, 0)),
                    terms: Some("net 15".to_string()),
                    message: None,
                    valid_until: None,
                },
            )
            .await
            .expect("seller counter")
        else {
            panic!("expected a counter outcome");
        };
        assert_eq!(reply.to_user_id, buyer());

        let outcome = h
            .negotiations
            .respond_to_counter_offer(&buyer(), &reply.id, CounterOfferResponse::Accept)
            .await
            .expect("accept");
        assert!(outcome.converted());
        let ResponseOutcome::Converted(acceptance) = outcome else {
            unreachable!();
        };

        assert_eq!(acceptance.quote.status, QuoteStatus::Accepted);
        assert_eq!(acceptance.quote.total_price, Decimal::new(1650, 0));
        assert_eq!(acceptance.quote.terms_conditions.as_deref(), Some("net 15"));
        assert_eq!(acceptance.order_intent.final_price, Decimal::new(1650, 0));
        assert_eq!(acceptance.rejected_quotes, vec![quote_id("Q-2")]);

        let rfq = h.store.get_rfq(&RfqId("RFQ-1".to_string())).await.expect("read").expect("rfq");
        assert_eq!(rfq.status, RfqStatus::Completed);

        let summary =
            h.negotiations.negotiation_history(&quote_id("Q-1"), &buyer()).await.expect("summary");
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.status, NegotiationOutcome::Completed);
        assert_eq!(summary.price_reduction, Decimal::new(150, 0));
        assert_eq!(summary.history[0].status, NegotiationStatus::Rejected);
        assert_eq!(summary.history[1].status, NegotiationStatus::Accepted);
    }

    #[tokio::test]
    async fn rounds_stop_at_the_configured_limit() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;
        let mut live = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1000, 0)),
            )
            .await
            .expect("round 1");

        for round in 2..=5 {
            let responder = live.to_user_id.clone();
            let outcome = h
                .negotiations
                .respond_to_counter_offer(
                    &responder,
                    &live.id,
                    CounterOfferResponse::Counter {
                        price: Some(Decimal::new(1000 + round * 100, 0)),
                        terms: None,
                        message: None,
                        valid_until: None,
                    },
                )
                .await
                .expect("counter within limit");
            let ResponseOutcome::Countered(next) = outcome else {
                panic!("expected a counter outcome");
            };
            live = next;
        }

        let responder = live.to_user_id.clone();
        let error = h
            .negotiations
            .respond_to_counter_offer(
                &responder,
                &live.id,
                CounterOfferResponse::Counter {
                    price: Some(Decimal::new(1700, 0)),
                    terms: None,
                    message: None,
                    valid_until: None,
                },
            )
            .await
            .expect_err("sixth round");
        assert_eq!(error.kind(), ErrorKind::Conflict);

        let history = h.store.list_negotiations_for_quote(&quote_id("Q-1")).await.expect("history");
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter().filter(|entry| entry.is_live()).count(), 1);

        h.negotiations
            .respond_to_counter_offer(&responder, &live.id, CounterOfferResponse::Accept)
            .await
            .expect("the live offer can still be accepted");
    }

    #[tokio::test]
    async fn only_the_addressee_may_respond() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;
        let entry = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1500, 0)),
            )
            .await
            .expect("counter");

        let error = h
            .negotiations
            .respond_to_counter_offer(&buyer(), &entry.id, CounterOfferResponse::Accept)
            .await
            .expect_err("sender cannot accept own offer");
        assert_eq!(error.kind(), ErrorKind::Authorization);

        let missing_price = h
            .negotiations
            .respond_to_counter_offer(
                &seller(),
                &entry.id,
                CounterOfferResponse::Counter {
                    price: None,
                    terms: None,
                    message: None,
                    valid_until: None,
                },
            )
            .await
            .expect_err("counter without price");
        assert_eq!(missing_price.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn lapsed_offer_cannot_be_accepted() {
        let h = harness(&[]).await;
        let now = Utc::now();
        let mut quote = quote_at("Q-1", "seller-1", 1800, now);
        quote.status = QuoteStatus::Negotiating;
        h.store.insert_quote_unchecked(quote).await;
        h.store
            .insert_negotiation_unchecked(NegotiationEntry {
                id: NegotiationId("N-1".to_string()),
                quote_id: quote_id("Q-1"),
                from_user_id: buyer(),
                to_user_id: seller(),
                offer_type: OfferType::Counter,
                price: Decimal::new(1500, 0),
                terms: None,
                message: None,
                response_message: None,
                status: NegotiationStatus::Pending,
                valid_until: now - Duration::minutes(5),
                created_at: now - Duration::hours(25),
                responded_at: None,
            })
            .await;

        let error = h
            .negotiations
            .respond_to_counter_offer(
                &seller(),
                &NegotiationId("N-1".to_string()),
                CounterOfferResponse::Accept,
            )
            .await
            .expect_err("lapsed");
        assert_eq!(error.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn history_and_entries_are_visible_to_parties_only() {
        let h = harness(&[("Q-1", "seller-1", 1800)]).await;
        let entry = h
            .negotiations
            .create_counter_offer(
                &buyer(),
                &quote_id("Q-1"),
                CounterOffer::at_price(Decimal::new(1500, 0)),
            )
            .await
            .expect("counter");
        let outsider = UserId::new("seller-9");

        let error = h
            .negotiations
            .negotiation_history(&quote_id("Q-1"), &outsider)
            .await
            .expect_err("outsider history");
        assert_eq!(error.kind(), ErrorKind::Authorization);

        let error =
            h.negotiations.get_negotiation(&entry.id, &outsider).await.expect_err("outsider entry");
        assert_eq!(error.kind(), ErrorKind::Authorization);

        let seen = h.negotiations.get_negotiation(&entry.id, &seller()).await.expect("seller view");
        assert_eq!(seen.id, entry.id);

        let stats = h.negotiations.user_negotiation_stats(&buyer()).await.expect("stats");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
    }
}
