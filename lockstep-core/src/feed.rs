//! Data-source boundary: slice feeds and the warm-up history provider.
//!
//! The loop blocks only here. Backtests consume a finite, pre-ordered
//! sequence; live runs block on a channel fed by an ingestion thread.

use crate::domain::TimeSlice;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

/// An ordered, possibly-infinite producer of time slices.
///
/// Implementations must deliver non-decreasing timestamps; the engine treats
/// a violation as fatal rather than reordering.
pub trait SliceFeed: Send {
    /// Next slice, or `None` when the stream is exhausted (backtest end, or
    /// a live feed shutting down).
    fn next_slice(&mut self) -> Option<TimeSlice>;
}

/// Finite feed over a pre-built sequence. Backtest / catch-up mode.
pub struct VecFeed {
    slices: VecDeque<TimeSlice>,
}

impl VecFeed {
    pub fn new(slices: Vec<TimeSlice>) -> Self {
        Self {
            slices: slices.into(),
        }
    }
}

impl SliceFeed for VecFeed {
    fn next_slice(&mut self) -> Option<TimeSlice> {
        self.slices.pop_front()
    }
}

/// Unbounded feed over a channel. Live mode: an ingestion thread owns the
/// sender; the loop blocks on the receiver.
pub struct ChannelFeed {
    rx: Receiver<TimeSlice>,
}

impl ChannelFeed {
    pub fn new(rx: Receiver<TimeSlice>) -> Self {
        Self { rx }
    }
}

impl SliceFeed for ChannelFeed {
    fn next_slice(&mut self) -> Option<TimeSlice> {
        self.rx.recv().ok()
    }
}

/// Historical catch-up source used to prime state before the run proper.
pub trait HistoryProvider: Send {
    /// A finite, time-ordered sequence covering `[start, end)`.
    fn history(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<TimeSlice>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::mpsc::channel;

    fn t(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 15, m, 0).unwrap()
    }

    #[test]
    fn vec_feed_drains_in_order() {
        let mut feed = VecFeed::new(vec![TimeSlice::empty(t(0)), TimeSlice::empty(t(1))]);
        assert_eq!(feed.next_slice().unwrap().time, t(0));
        assert_eq!(feed.next_slice().unwrap().time, t(1));
        assert!(feed.next_slice().is_none());
    }

    #[test]
    fn channel_feed_ends_when_sender_drops() {
        let (tx, rx) = channel();
        let mut feed = ChannelFeed::new(rx);
        tx.send(TimeSlice::empty(t(0))).unwrap();
        drop(tx);
        assert!(feed.next_slice().is_some());
        assert!(feed.next_slice().is_none());
    }
}
