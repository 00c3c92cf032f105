use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteId;
use crate::domain::rfq::RfqId;
use crate::domain::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderIntentId(pub String);

/// Identifier handed back by the downstream order system.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSource {
    QuoteAcceptance,
    CounterOfferAcceptance,
    AutoConversion,
}

impl ConversionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuoteAcceptance => "quote_acceptance",
            Self::CounterOfferAcceptance => "counter_offer_acceptance",
            Self::AutoConversion => "auto_conversion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quote_acceptance" => Some(Self::QuoteAcceptance),
            "counter_offer_acceptance" => Some(Self::CounterOfferAcceptance),
            "auto_conversion" => Some(Self::AutoConversion),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderIntentStatus {
    Pending,
    Materialized,
}

impl OrderIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Materialized => "materialized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "materialized" => Some(Self::Materialized),
            _ => None,
        }
    }
}

/// Everything the order system needs to turn an accepted quote into a binding order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: OrderIntentId,
    pub rfq_id: RfqId,
    pub quote_id: QuoteId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub final_price: Decimal,
    pub terms: Option<String>,
    pub source: ConversionSource,
    pub status: OrderIntentStatus,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}
