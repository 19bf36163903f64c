//! Order management: tickets, responses, and the transaction manager.

pub mod manager;

pub use manager::{
    OrderResponse, OrderTicket, ReconcileState, ResponseCode, TransactionManager,
};
