//! Time-triggered strategy callbacks.

use chrono::{DateTime, Duration, Utc};

/// A named event firing at a fixed time, optionally repeating.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub name: String,
    pub next_fire: DateTime<Utc>,
    pub period: Option<Duration>,
}

/// The set of registered scheduled events, consulted once per slice.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    events: Vec<ScheduledEvent>,
}

impl Schedule {
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self { events }
    }

    pub fn add(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Names of events due at or before `now`, in registration order.
    /// Periodic events advance past `now`; one-shots are removed. An event
    /// fires once per poll even if several periods were skipped.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut fired = Vec::new();
        self.events.retain_mut(|event| {
            if event.next_fire > now {
                return true;
            }
            fired.push(event.name.clone());
            match event.period {
                Some(period) => {
                    while event.next_fire <= now {
                        event.next_fire += period;
                    }
                    true
                }
                None => false,
            }
        });
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 15, m, 0).unwrap()
    }

    #[test]
    fn one_shot_fires_once() {
        let mut schedule = Schedule::new(vec![ScheduledEvent {
            name: "rebalance".into(),
            next_fire: t(5),
            period: None,
        }]);

        assert!(schedule.due(t(4)).is_empty());
        assert_eq!(schedule.due(t(5)), vec!["rebalance".to_string()]);
        assert!(schedule.due(t(6)).is_empty());
        assert!(schedule.is_empty());
    }

    #[test]
    fn periodic_event_reschedules() {
        let mut schedule = Schedule::new(vec![ScheduledEvent {
            name: "tick".into(),
            next_fire: t(1),
            period: Some(Duration::minutes(5)),
        }]);

        assert_eq!(schedule.due(t(1)).len(), 1);
        assert!(schedule.due(t(2)).is_empty());
        assert_eq!(schedule.due(t(6)).len(), 1);
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn skipped_periods_fire_once() {
        let mut schedule = Schedule::new(vec![ScheduledEvent {
            name: "tick".into(),
            next_fire: t(0),
            period: Some(Duration::minutes(1)),
        }]);

        // A large time jump: fires once, not once per missed minute.
        assert_eq!(schedule.due(t(30)).len(), 1);
        // Next fire is past the jump.
        assert!(schedule.due(t(30)).is_empty());
    }
}
