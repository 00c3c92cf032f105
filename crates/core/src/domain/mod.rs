pub mod negotiation;
pub mod order;
pub mod product;
pub mod quote;
pub mod rfq;
pub mod seller;

use serde::{Deserialize, Serialize};

/// Marketplace participant. Buyers and sellers share one id space.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}
