//! # Sensor Health Monitoring
//!
//! Each physical measurement is a [`SensorChannel`]: it owns the driver, the
//! validity range, and the recovery bookkeeping for that channel. A channel
//! is driven once per telemetry cycle with [`SensorChannel::tick`], which
//!
//! 1. attempts a validated read,
//! 2. counts consecutive failed attempts and resets the sensor once the
//!    count reaches the configured maximum,
//! 3. forces a reset when no read has succeeded for longer than the
//!    staleness timeout, even if nothing reported an error.
//!
//! Failures are contained here: they come back as a typed [`SensorError`]
//! for the caller to skip, never as a panic.
//!
//! ```text
//!            success                     failure, count < max
//!   ┌──────────────────────┐          ┌───────────────────────┐
//!   ▼                      │          │                       ▼
//! Healthy ──failure──▶ Degraded ──────┘                   Degraded
//!   ▲                      │
//!   │ reset ok             │ count >= max  or  stale
//!   └───────────────── TimedOut ◀─┐
//!                          │      │ reset failed
//!                          └──────┘
//! ```

use embassy_time::Instant;

use crate::config::ChannelConfig;
use crate::fmt::DebugFmt;

/// Access to one sensor measurement.
///
/// Implementations wrap the actual bus driver. One driver instance belongs
/// to exactly one channel.
#[allow(async_fn_in_trait)]
pub trait SensorDriver {
    /// The error type for bus or device faults.
    type Error: core::fmt::Debug;

    /// Whether a new measurement is available. Drivers that can always be
    /// read leave the default.
    async fn data_ready(&mut self) -> bool {
        true
    }

    /// Reads the raw measurement.
    async fn read(&mut self) -> Result<f32, Self::Error>;

    /// Reinitializes the sensor after it got stuck.
    async fn reset(&mut self) -> Result<(), Self::Error>;
}

/// Health of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// The last attempt succeeded (or nothing has been attempted yet).
    Healthy,
    /// One or more consecutive attempts failed, below the reset threshold.
    Degraded,
    /// The channel hit its failure limit or went stale and needs a reset.
    TimedOut,
}

/// A validated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub name: &'static str,
    pub value: f32,
}

/// Why a read attempt did not produce a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError<E> {
    /// The value was outside the channel's physical range.
    Validation { value: f32, min: f32, max: f32 },
    /// The driver reported a bus or device fault.
    Transport(E),
    /// The sensor had no new measurement.
    NotReady,
}

impl<E> SensorError<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            SensorError::Validation { .. } => "validation",
            SensorError::Transport(_) => "transport",
            SensorError::NotReady => "not ready",
        }
    }
}

/// The sensor could not be reinitialized; the channel stays timed out.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetFailure<E> {
    pub channel: &'static str,
    pub error: E,
}

/// Snapshot of a channel's recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStatus {
    pub name: &'static str,
    pub state: ChannelState,
    pub failures: u32,
    pub resets: u32,
}

/// One monitored sensor channel.
///
/// A channel carries one scalar. A device that measures several values at
/// once (an SCD4x gives CO2, temperature, and humidity) is wired as one
/// channel per value, each holding a clone of a shared driver handle that
/// caches the last measurement. Each of those channels keeps its own
/// failure count and calls `data_ready` and `reset` on its own, so a stuck
/// device is reset once per failing channel, and the handle's `reset`
/// should tolerate being called again right after a successful one.
pub struct SensorChannel<D> {
    driver: D,
    config: ChannelConfig,
    state: ChannelState,
    failures: u32,
    last_success: Option<Instant>,
    resets: u32,
}

impl<D: SensorDriver> SensorChannel<D> {
    pub fn new(driver: D, config: ChannelConfig) -> Self {
        Self {
            driver,
            config,
            state: ChannelState::Healthy,
            failures: 0,
            last_success: None,
            resets: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Consecutive failed attempts since the last success or successful reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            name: self.config.name,
            state: self.state,
            failures: self.failures,
            resets: self.resets,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// One scheduler tick: a read attempt followed by the staleness check.
    ///
    /// The staleness check does not fire a second reset if the read attempt
    /// already reset the sensor during this tick.
    pub async fn tick(&mut self, now: Instant) -> Result<Reading, SensorError<D::Error>> {
        let resets_before = self.resets;
        let result = self.read(now).await;
        if self.resets == resets_before {
            self.check_staleness(now).await;
        }
        result
    }

    /// Attempts a validated read.
    ///
    /// A failed attempt increments the failure count; reaching the limit
    /// moves the channel to [`ChannelState::TimedOut`] and resets the sensor.
    pub async fn read(&mut self, now: Instant) -> Result<Reading, SensorError<D::Error>> {
        self.last_success.get_or_insert(now);

        if !self.driver.data_ready().await {
            return Err(self.record_failure(now, SensorError::NotReady).await);
        }

        let value = match self.driver.read().await {
            Ok(value) => value,
            Err(e) => return Err(self.record_failure(now, SensorError::Transport(e)).await),
        };

        if !self.config.accepts(value) {
            let err = SensorError::Validation {
                value,
                min: self.config.min,
                max: self.config.max,
            };
            return Err(self.record_failure(now, err).await);
        }

        if self.state != ChannelState::Healthy {
            info!("sensor {}: recovered after {} failures", self.config.name, self.failures);
        }
        self.failures = 0;
        self.last_success = Some(now);
        self.state = ChannelState::Healthy;
        trace!("sensor {}: {}", self.config.name, value);

        Ok(Reading {
            name: self.config.name,
            value,
        })
    }

    async fn record_failure(
        &mut self,
        now: Instant,
        err: SensorError<D::Error>,
    ) -> SensorError<D::Error> {
        self.failures = self.failures.saturating_add(1);
        match &err {
            SensorError::Validation { value, .. } => warn!(
                "sensor {}: value {} out of range ({}/{})",
                self.config.name, value, self.failures, self.config.max_failures
            ),
            _ => warn!(
                "sensor {}: {} ({}/{})",
                self.config.name,
                err.kind(),
                self.failures,
                self.config.max_failures
            ),
        }

        if self.failures >= self.config.max_failures {
            warn!(
                "sensor {}: failed {} times, resetting",
                self.config.name, self.failures
            );
            self.state = ChannelState::TimedOut;
            if self.reset(now).await.is_err() {
                debug!("sensor {}: reset retried on next failure", self.config.name);
            }
        } else {
            self.state = ChannelState::Degraded;
        }
        err
    }

    /// Forces a reset if no read has succeeded within the staleness timeout.
    ///
    /// Returns `true` if a reset was attempted.
    pub async fn check_staleness(&mut self, now: Instant) -> bool {
        let last_success = *self.last_success.get_or_insert(now);
        if now.saturating_duration_since(last_success) <= self.config.timeout {
            return false;
        }
        warn!(
            "sensor {}: no data for {}s, forcing reset",
            self.config.name,
            now.saturating_duration_since(last_success).as_secs()
        );
        self.state = ChannelState::TimedOut;
        if self.reset(now).await.is_err() {
            debug!("sensor {}: reset retried on next stale tick", self.config.name);
        }
        true
    }

    /// Reinitializes the sensor.
    ///
    /// On success the channel is healthy again with a clean failure count
    /// and a fresh staleness window. On failure it stays timed out.
    pub async fn reset(&mut self, now: Instant) -> Result<(), ResetFailure<D::Error>> {
        info!("sensor {}: resetting", self.config.name);
        self.resets = self.resets.wrapping_add(1);
        match self.driver.reset().await {
            Ok(()) => {
                self.failures = 0;
                self.last_success = Some(now);
                self.state = ChannelState::Healthy;
                info!("sensor {}: reset complete", self.config.name);
                Ok(())
            }
            Err(error) => {
                self.state = ChannelState::TimedOut;
                error!(
                    "sensor {}: reset failed: {:?}",
                    self.config.name,
                    DebugFmt(&error)
                );
                Err(ResetFailure {
                    channel: self.config.name,
                    error,
                })
            }
        }
    }
}

/// A set of channels polled together, once per telemetry cycle.
///
/// Implemented for a single channel, for arrays of channels sharing a driver
/// type, and for [`ChannelPair`] to combine channels with different drivers.
#[allow(async_fn_in_trait)]
pub trait ChannelGroup {
    /// Ticks every channel in order, passing each successful reading to `sink`.
    async fn tick(&mut self, now: Instant, sink: &mut dyn FnMut(Reading));

    /// Reports the status of every channel in order.
    fn statuses(&self, visit: &mut dyn FnMut(ChannelStatus));
}

impl<D: SensorDriver> ChannelGroup for SensorChannel<D> {
    async fn tick(&mut self, now: Instant, sink: &mut dyn FnMut(Reading)) {
        if let Ok(reading) = SensorChannel::tick(self, now).await {
            sink(reading);
        }
    }

    fn statuses(&self, visit: &mut dyn FnMut(ChannelStatus)) {
        visit(self.status());
    }
}

impl<D: SensorDriver, const N: usize> ChannelGroup for [SensorChannel<D>; N] {
    async fn tick(&mut self, now: Instant, sink: &mut dyn FnMut(Reading)) {
        for channel in self.iter_mut() {
            ChannelGroup::tick(channel, now, sink).await;
        }
    }

    fn statuses(&self, visit: &mut dyn FnMut(ChannelStatus)) {
        for channel in self.iter() {
            visit(channel.status());
        }
    }
}

/// Two channel groups polled one after the other.
///
/// # Example
///
/// ```ignore
/// let channels = ChannelPair::new(
///     SensorChannel::new(co2_driver, presets::CO2),
///     SensorChannel::new(soil_driver, presets::SOIL_MOISTURE),
/// );
/// ```
pub struct ChannelPair<A, B> {
    /// First group
    pub first: A,
    /// Second group
    pub second: B,
}

impl<A, B> ChannelPair<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> ChannelGroup for ChannelPair<A, B>
where
    A: ChannelGroup,
    B: ChannelGroup,
{
    async fn tick(&mut self, now: Instant, sink: &mut dyn FnMut(Reading)) {
        self.first.tick(now, sink).await;
        self.second.tick(now, sink).await;
    }

    fn statuses(&self, visit: &mut dyn FnMut(ChannelStatus)) {
        self.first.statuses(visit);
        self.second.statuses(visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{BusFault, ScriptedDriver};
    use embassy_futures::block_on;
    use embassy_time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(300);

    fn co2_config() -> ChannelConfig {
        ChannelConfig::new("co2", 300.0, 5000.0)
            .with_max_failures(5)
            .with_timeout(TIMEOUT)
    }

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    fn valid_read_produces_reading() {
        let mut channel = SensorChannel::new(ScriptedDriver::returning(812.0), co2_config());
        let reading = block_on(channel.tick(at(10))).unwrap();
        assert_eq!(
            reading,
            Reading {
                name: "co2",
                value: 812.0
            }
        );
        assert_eq!(channel.state(), ChannelState::Healthy);
        assert_eq!(channel.last_success(), Some(at(10)));
    }

    #[test]
    fn out_of_range_value_is_validation_error() {
        let mut channel = SensorChannel::new(ScriptedDriver::returning(9000.0), co2_config());
        let err = block_on(channel.tick(at(0))).unwrap_err();
        assert_eq!(
            err,
            SensorError::Validation {
                value: 9000.0,
                min: 300.0,
                max: 5000.0
            }
        );
        assert_eq!(channel.failures(), 1);
        assert_eq!(channel.state(), ChannelState::Degraded);
    }

    #[test]
    fn range_bounds_are_inclusive_and_nan_is_rejected() {
        let driver = ScriptedDriver::returning(0.0)
            .then(Ok(300.0))
            .then(Ok(5000.0))
            .then(Ok(f32::NAN));
        let mut channel = SensorChannel::new(driver, co2_config());
        assert!(block_on(channel.tick(at(0))).is_ok());
        assert!(block_on(channel.tick(at(1))).is_ok());
        assert!(matches!(
            block_on(channel.tick(at(2))),
            Err(SensorError::Validation { .. })
        ));
    }

    #[test]
    fn driver_fault_is_transport_error() {
        let mut channel = SensorChannel::new(ScriptedDriver::failing(), co2_config());
        assert_eq!(
            block_on(channel.tick(at(0))),
            Err(SensorError::Transport(BusFault))
        );
        assert_eq!(channel.failures(), 1);
    }

    #[test]
    fn data_not_ready_counts_as_failure_without_reading() {
        let driver = ScriptedDriver::returning(800.0);
        driver.set_ready(false);
        let mut channel = SensorChannel::new(driver.clone(), co2_config());
        assert_eq!(block_on(channel.tick(at(0))), Err(SensorError::NotReady));
        assert_eq!(channel.failures(), 1);
        assert_eq!(driver.read_calls(), 0);
    }

    #[test]
    fn five_validation_errors_trigger_exactly_one_reset() {
        let driver = ScriptedDriver::returning(42.0);
        let mut channel = SensorChannel::new(driver.clone(), co2_config());

        for (i, secs) in (0..4).enumerate() {
            assert!(block_on(channel.tick(at(secs))).is_err());
            assert_eq!(channel.failures(), i as u32 + 1);
            assert_eq!(channel.state(), ChannelState::Degraded);
        }
        assert_eq!(driver.reset_calls(), 0);

        assert!(block_on(channel.tick(at(4))).is_err());
        assert_eq!(driver.reset_calls(), 1);
        assert_eq!(channel.failures(), 0);
        assert_eq!(channel.state(), ChannelState::Healthy);
        assert_eq!(channel.last_success(), Some(at(4)));
    }

    #[test]
    fn success_clears_failure_count() {
        let driver = ScriptedDriver::returning(800.0)
            .then(Err(BusFault))
            .then(Ok(1.0))
            .then(Err(BusFault));
        let mut channel = SensorChannel::new(driver.clone(), co2_config());
        for secs in 0..3 {
            let _ = block_on(channel.tick(at(secs)));
        }
        assert_eq!(channel.failures(), 3);
        assert!(block_on(channel.tick(at(3))).is_ok());
        assert_eq!(channel.failures(), 0);
        assert_eq!(channel.state(), ChannelState::Healthy);
        assert_eq!(driver.reset_calls(), 0);
    }

    #[test]
    fn failed_reset_stays_timed_out_and_retries_next_tick() {
        let driver = ScriptedDriver::failing();
        driver.fail_next_reset();
        let mut channel = SensorChannel::new(driver.clone(), co2_config());

        for secs in 0..5 {
            let _ = block_on(channel.tick(at(secs)));
        }
        assert_eq!(driver.reset_calls(), 1);
        assert_eq!(channel.state(), ChannelState::TimedOut);
        assert_eq!(channel.failures(), 5);

        // Still failing: the next tick qualifies again and the reset succeeds.
        let _ = block_on(channel.tick(at(5)));
        assert_eq!(driver.reset_calls(), 2);
        assert_eq!(channel.state(), ChannelState::Healthy);
        assert_eq!(channel.failures(), 0);
    }

    #[test]
    fn reset_reports_failure_without_panicking() {
        let driver = ScriptedDriver::returning(800.0);
        driver.fail_next_reset();
        let mut channel = SensorChannel::new(driver, co2_config());
        assert_eq!(
            block_on(channel.reset(at(0))),
            Err(ResetFailure {
                channel: "co2",
                error: BusFault
            })
        );
        assert_eq!(channel.state(), ChannelState::TimedOut);
        assert_eq!(block_on(channel.reset(at(1))), Ok(()));
        assert_eq!(channel.state(), ChannelState::Healthy);
    }

    #[test]
    fn stale_channel_is_reset_with_zero_failures() {
        let driver = ScriptedDriver::returning(800.0);
        let mut channel = SensorChannel::new(driver.clone(), co2_config());
        block_on(channel.tick(at(0))).unwrap();
        assert_eq!(channel.failures(), 0);

        assert!(!block_on(channel.check_staleness(at(300))));
        assert!(block_on(channel.check_staleness(at(301))));
        assert_eq!(driver.reset_calls(), 1);
        assert_eq!(channel.state(), ChannelState::Healthy);
        assert_eq!(channel.last_success(), Some(at(301)));
    }

    #[test]
    fn tick_forces_reset_when_sensor_stalls_below_failure_limit() {
        let driver = ScriptedDriver::returning(800.0);
        let mut channel = SensorChannel::new(driver.clone(), co2_config());
        block_on(channel.tick(at(0))).unwrap();

        // One failure only, far below the limit of 5, but 10 minutes late.
        driver.set_fallback(Err(BusFault));
        assert!(block_on(channel.tick(at(600))).is_err());
        assert_eq!(driver.reset_calls(), 1);
        assert_eq!(channel.failures(), 0);
        assert_eq!(channel.state(), ChannelState::Healthy);
    }

    #[test]
    fn one_reset_per_tick_when_limit_and_staleness_coincide() {
        let driver = ScriptedDriver::failing();
        driver.fail_next_reset();
        let config = co2_config().with_max_failures(1);
        let mut channel = SensorChannel::new(driver.clone(), config);
        block_on(channel.tick(at(0))).unwrap_err();
        assert_eq!(driver.reset_calls(), 1);

        let _ = block_on(channel.tick(at(1000)));
        assert_eq!(driver.reset_calls(), 2);
    }

    #[test]
    fn staleness_window_starts_at_first_tick() {
        let driver = ScriptedDriver::returning(800.0);
        let mut channel = SensorChannel::new(driver.clone(), co2_config());
        assert!(!block_on(channel.check_staleness(at(10_000))));
        assert_eq!(channel.last_success(), Some(at(10_000)));
        assert_eq!(driver.reset_calls(), 0);
    }

    #[test]
    fn channels_sharing_a_device_reset_it_independently() {
        let device = ScriptedDriver::failing();
        let mut channels = [
            SensorChannel::new(device.clone(), co2_config()),
            SensorChannel::new(device.clone(), ChannelConfig::new("temp_air", -20.0, 60.0)),
        ];

        for secs in 0..5 {
            block_on(ChannelGroup::tick(&mut channels, at(secs), &mut |_: Reading| {}));
        }
        assert_eq!(device.read_calls(), 10);
        assert_eq!(device.reset_calls(), 2);
    }

    #[test]
    fn pair_ticks_both_groups_and_keeps_failures_separate() {
        let mut channels = ChannelPair::new(
            SensorChannel::new(ScriptedDriver::returning(800.0), co2_config()),
            [
                SensorChannel::new(
                    ScriptedDriver::failing(),
                    ChannelConfig::new("moisture", 0.0, 4095.0),
                ),
                SensorChannel::new(
                    ScriptedDriver::returning(21.5),
                    ChannelConfig::new("temp_soil", -20.0, 60.0),
                ),
            ],
        );

        let mut names = Vec::new();
        block_on(ChannelGroup::tick(&mut channels, at(0), &mut |r: Reading| {
            names.push(r.name)
        }));
        assert_eq!(names, vec!["co2", "temp_soil"]);

        let mut statuses = Vec::new();
        channels.statuses(&mut |s: ChannelStatus| statuses.push((s.name, s.state, s.failures)));
        assert_eq!(
            statuses,
            vec![
                ("co2", ChannelState::Healthy, 0),
                ("moisture", ChannelState::Degraded, 1),
                ("temp_soil", ChannelState::Healthy, 0),
            ]
        );
    }
}
