use serde::{Deserialize, Serialize};

use crate::domain::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Physical,
    Digital,
    Service,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Digital => "digital",
            Self::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "physical" => Some(Self::Physical),
            "digital" => Some(Self::Digital),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub kind: ProductKind,
    pub active: bool,
    pub stock_quantity: u32,
}

impl Product {
    /// Only physical goods are stock-limited.
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.kind != ProductKind::Physical || self.stock_quantity >= quantity
    }
}
