use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned order identifier. Monotonically increasing within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generator for engine-assigned identifiers.
///
/// Ids start at 1 so that 0 can never collide with a real order in logs.
#[derive(Debug, Default)]
pub struct IdGen {
    next_order: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(self.next_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_increase_monotonically() {
        let mut gen = IdGen::default();
        let a = gen.next_order_id();
        let b = gen.next_order_id();
        let c = gen.next_order_id();
        assert!(a < b && b < c);
        assert_eq!(a, OrderId(1));
    }

    #[test]
    fn order_id_display() {
        assert_eq!(OrderId(42).to_string(), "42");
    }
}
