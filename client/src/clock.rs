//! Client-side estimate of the server clock
//!
//! Each sync round pings the server and timestamps the send and the reply on
//! the local monotonic clock. Assuming a symmetric path, the server read its
//! clock halfway through the round trip, which gives a one-shot offset
//! estimate. Estimates are smoothed with an exponential moving average so a
//! single delayed reply does not yank the interpolation timeline around.

use log::debug;
use shared::CLOCK_SYNC_EMA_WEIGHT;
use std::time::Instant;

/// Monotonic local time in milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    origin: Instant,
}

impl LocalClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One completed ping round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Local time the ping was sent
    pub t0: f64,
    /// Local time the pong arrived
    pub t1: f64,
    /// Server epoch time carried by the pong
    pub server_time: f64,
}

impl ClockSample {
    pub fn rtt(&self) -> f64 {
        self.t1 - self.t0
    }

    pub fn offset_estimate(&self) -> f64 {
        self.server_time - (self.t0 + self.rtt() / 2.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    offset_ms: Option<f64>,
    last_rtt_ms: Option<f64>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a sample into the smoothed offset and returns the new offset.
    /// The first sample is taken as is.
    pub fn record(&mut self, sample: ClockSample) -> f64 {
        let estimate = sample.offset_estimate();
        let offset = match self.offset_ms {
            Some(previous) => {
                previous * (1.0 - CLOCK_SYNC_EMA_WEIGHT) + estimate * CLOCK_SYNC_EMA_WEIGHT
            }
            None => estimate,
        };

        self.offset_ms = Some(offset);
        self.last_rtt_ms = Some(sample.rtt());
        debug!(
            "Clock sync: RTT={:.2}ms, offset={:.2}ms",
            sample.rtt(),
            offset
        );

        offset
    }

    /// Smoothed offset, zero until the first sample.
    pub fn offset_ms(&self) -> f64 {
        self.offset_ms.unwrap_or(0.0)
    }

    pub fn last_rtt_ms(&self) -> Option<f64> {
        self.last_rtt_ms
    }

    /// Maps a local timestamp onto the estimated server clock.
    pub fn server_time(&self, local_ms: f64) -> f64 {
        local_ms + self.offset_ms()
    }

    pub fn is_synced(&self) -> bool {
        self.offset_ms.is_some()
    }
}
