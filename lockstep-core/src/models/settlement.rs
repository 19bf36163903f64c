//! Settlement models: when trade proceeds become usable cash.
//!
//! Debits always apply immediately — buying power is consumed at execution.
//! Credits may be deferred (T+N) to model cash-account settlement delays.

use super::{SettlementModel, SettlementTerms};
use chrono::{DateTime, Duration, NaiveTime, Utc};

/// All proceeds available immediately (margin-account behavior).
pub struct ImmediateSettlementModel;

impl SettlementModel for ImmediateSettlementModel {
    fn settle(&self, _time: DateTime<Utc>, _amount: f64) -> SettlementTerms {
        SettlementTerms::Immediate
    }

    fn name(&self) -> &str {
        "ImmediateSettlementModel"
    }
}

/// Credits settle N days later at a fixed time of day; debits immediately.
pub struct DelayedSettlementModel {
    pub days: i64,
    pub settlement_time: NaiveTime,
}

impl DelayedSettlementModel {
    pub fn new(days: i64, settlement_time: NaiveTime) -> Self {
        Self {
            days,
            settlement_time,
        }
    }

    /// T+2 at 08:00 UTC, the common equity cash-account schedule.
    pub fn t_plus_two() -> Self {
        Self::new(2, NaiveTime::from_hms_opt(8, 0, 0).expect("static time"))
    }
}

impl SettlementModel for DelayedSettlementModel {
    fn settle(&self, time: DateTime<Utc>, amount: f64) -> SettlementTerms {
        if amount <= 0.0 {
            return SettlementTerms::Immediate;
        }
        let date = (time + Duration::days(self.days)).date_naive();
        let available_at = date.and_time(self.settlement_time).and_utc();
        SettlementTerms::Delayed { available_at }
    }

    fn name(&self) -> &str {
        "DelayedSettlementModel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn immediate_model_is_immediate() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        assert_eq!(
            ImmediateSettlementModel.settle(t, 1_000.0),
            SettlementTerms::Immediate
        );
    }

    #[test]
    fn delayed_model_defers_credits() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        let model = DelayedSettlementModel::t_plus_two();
        match model.settle(t, 1_000.0) {
            SettlementTerms::Delayed { available_at } => {
                assert_eq!(
                    available_at,
                    Utc.with_ymd_and_hms(2024, 3, 6, 8, 0, 0).unwrap()
                );
            }
            SettlementTerms::Immediate => panic!("credit should be deferred"),
        }
    }

    #[test]
    fn delayed_model_debits_are_immediate() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        let model = DelayedSettlementModel::t_plus_two();
        assert_eq!(model.settle(t, -1_000.0), SettlementTerms::Immediate);
    }
}
