//! Domain types: symbols, securities, holdings, cash, orders, fills, slices.

pub mod cash;
pub mod holding;
pub mod ids;
pub mod market;
pub mod order;
pub mod order_event;
pub mod security;
pub mod slice;
pub mod symbol;
pub mod trade;

pub use cash::{Cash, CashBook, UnsettledFunds};
pub use holding::Holding;
pub use ids::{IdGen, OrderId};
pub use market::{Bar, Quote};
pub use order::{
    Order, OrderDirection, OrderError, OrderRequest, OrderStatus, OrderType, TimeInForce,
    UpdateOrderFields,
};
pub use order_event::OrderEvent;
pub use security::{
    DataNormalizationMode, Exchange, MarketHours, Securities, Security, SecuritySeed,
};
pub use slice::{Delisting, DelistingKind, Dividend, SecurityChanges, Split, TimeSlice};
pub use symbol::{SecurityType, Symbol, SymbolProperties};
pub use trade::TradeRecord;
