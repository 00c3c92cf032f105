pub mod acceptance;
pub mod config;
pub mod domain;
pub mod errors;
pub mod hooks;
pub mod negotiation;
pub mod notify;
pub mod quotes;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod test_support;

pub use acceptance::Acceptance;
pub use domain::negotiation::{
    NegotiationEntry, NegotiationId, NegotiationOutcome, NegotiationStatus, NegotiationSummary,
    OfferType,
};
pub use domain::order::{ConversionSource, OrderId, OrderIntent, OrderIntentId, OrderIntentStatus};
pub use domain::product::{Product, ProductId, ProductKind};
pub use domain::quote::{Quote, QuoteId, QuoteItem, QuoteStatus};
pub use domain::rfq::{Rfq, RfqId, RfqStatus};
pub use domain::seller::{SellerProfile, VerificationTier};
pub use domain::UserId;
pub use errors::{DomainError, EngineError, EntityKind, ErrorKind, InterfaceError};
pub use hooks::{HookError, InMemoryOrderHook, OrderConversionHook};
pub use negotiation::{
    CounterOffer, CounterOfferResponse, NegotiationManager, ResponseOutcome, UserNegotiationStats,
};
pub use notify::{
    ChannelNotifier, InMemoryNotifier, Notification, NotificationChannel, NotificationError,
    NotificationTemplate, Notifier,
};
pub use quotes::{
    CreateQuote, QuoteComparison, QuoteItemInput, QuoteListFilter, QuoteManager, QuoteUpdate,
    ScoredQuote, SellerQuoteStats,
};
pub use store::{InMemoryStore, MarketplaceStore, Page, Pagination, StoreError};
pub use sweeper::{AutoConversionReport, ExpirySweepReport, SweepReport, Sweeper};
