//! Bus timing configuration

use fugit::{ExtU32, HertzU32, MicrosDurationU32, MillisDurationU32};

/// Timing and bound settings of a bit-banged bus.
///
/// The default is the slow demo timing: every pin operation settles for
/// 1 ms, which gives a bus clock of roughly 250 Hz. Use
/// [`Config::from_frequency`] for real devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Wait after every single pin write or read.
    pub settle: MicrosDurationU32,
    /// Wait after [`init`](crate::i2c::BitBangI2c::init) released the lines.
    pub stabilization: MillisDurationU32,
    /// Number of data line samples taken by
    /// [`await_ack`](crate::i2c::BitBangI2c::await_ack) before giving up.
    pub ack_polls: u8,
    /// Maximum clock pulses issued by
    /// [`recover`](crate::i2c::BitBangI2c::recover).
    pub recovery_clocks: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle: 1_000.micros(),
            stabilization: 800.millis(),
            ack_polls: 255,
            recovery_clocks: 16,
        }
    }
}

impl Config {
    /// Derive the settle delay from the desired bus clock.
    ///
    /// A clock period consists of one High and one Low phase, each lasting
    /// one settle delay. The delay is rounded down to whole microseconds and
    /// never drops below 1 us.
    pub fn from_frequency(frequency: HertzU32) -> Self {
        let hz = frequency.raw().max(1);
        let half_period_us = (1_000_000 / hz / 2).max(1);
        Self {
            settle: MicrosDurationU32::from_ticks(half_period_us),
            ..Self::default()
        }
    }

    /// Set the per-operation settle delay
    pub fn with_settle(mut self, settle: MicrosDurationU32) -> Self {
        self.settle = settle;
        self
    }

    /// Set the delay applied after releasing the lines in `init`
    pub fn with_stabilization(mut self, stabilization: MillisDurationU32) -> Self {
        self.stabilization = stabilization;
        self
    }

    /// Set how many samples `await_ack` takes
    pub fn with_ack_polls(mut self, polls: u8) -> Self {
        self.ack_polls = polls;
        self
    }

    /// Set how many clock pulses `recover` may issue
    pub fn with_recovery_clocks(mut self, clocks: u8) -> Self {
        self.recovery_clocks = clocks;
        self
    }
}
