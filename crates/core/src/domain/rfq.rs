use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RfqId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfqStatus {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl RfqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A buyer's sourcing request. The engine only ever moves it out of `Active`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rfq {
    pub id: RfqId,
    pub buyer_id: UserId,
    pub category_id: String,
    pub title: String,
    pub quantity: u32,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub delivery_timeline: Option<String>,
    pub status: RfqStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rfq {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RfqStatus::Active && self.expires_at > now
    }

    pub fn can_transition_to(&self, next: RfqStatus) -> bool {
        matches!(
            (self.status, next),
            (RfqStatus::Active, RfqStatus::Completed)
                | (RfqStatus::Active, RfqStatus::Expired)
                | (RfqStatus::Active, RfqStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: RfqStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidRfqTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Rfq, RfqId, RfqStatus};
    use crate::domain::UserId;
    use crate::errors::DomainError;

    fn rfq(status: RfqStatus) -> Rfq {
        let now = Utc::now();
        Rfq {
            id: RfqId("RFQ-1".to_string()),
            buyer_id: UserId::new("buyer-1"),
            category_id: "packaging".to_string(),
            title: "Corrugated boxes".to_string(),
            quantity: 500,
            budget_min: None,
            budget_max: None,
            delivery_timeline: None,
            status,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_rfq_completes_once() {
        let mut rfq = rfq(RfqStatus::Active);
        rfq.transition_to(RfqStatus::Completed).expect("active -> completed");

        let error = rfq.transition_to(RfqStatus::Expired).expect_err("completed is terminal");
        assert!(matches!(error, DomainError::InvalidRfqTransition { .. }));
    }

    #[test]
    fn expired_deadline_closes_rfq_even_while_active() {
        let mut rfq = rfq(RfqStatus::Active);
        rfq.expires_at = Utc::now() - Duration::minutes(1);

        assert!(!rfq.is_open_at(Utc::now()));
    }
}
