//! # Indicator Outputs
//!
//! Readings with an [`IndicatorMapping`] are classified into three tiers and
//! handed to an [`Actuator`], which owns the physical outputs.
//!
//! The crate ships two `embedded-hal` adapters:
//!
//! - [`TrafficLight`]: three GPIO LEDs, one lit at a time.
//! - [`RgbIndicator`]: one RGB LED on three PWM channels.
//!
//! Each adapter implements [`Indicator`]. Wrap it in [`Routed`] to bind it to
//! a channel name, and combine several with [`ActuatorPair`]. Hold the final
//! actuator in [`SafeOutputs`] so everything is switched off when the owner
//! goes away, however that happens.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

/// Three-tier classification of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorLevel {
    Low,
    Medium,
    High,
}

/// Level boundaries for one channel.
///
/// `v < low` is [`IndicatorLevel::Low`], `v > high` is
/// [`IndicatorLevel::High`], and everything in between (bounds included)
/// is [`IndicatorLevel::Medium`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thresholds {
    pub low: f32,
    pub high: f32,
}

impl Thresholds {
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    pub fn level(&self, value: f32) -> IndicatorLevel {
        if value < self.low {
            IndicatorLevel::Low
        } else if value > self.high {
            IndicatorLevel::High
        } else {
            IndicatorLevel::Medium
        }
    }
}

/// Binds a channel name to its thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorMapping {
    pub channel: &'static str,
    pub thresholds: Thresholds,
}

impl IndicatorMapping {
    pub const fn new(channel: &'static str, low: f32, high: f32) -> Self {
        Self {
            channel,
            thresholds: Thresholds::new(low, high),
        }
    }
}

/// Owner of the physical indicator outputs.
///
/// Output errors are the adapter's business: a stuck LED must not stop
/// telemetry, so neither method returns a `Result`.
pub trait Actuator {
    /// Shows `level` for `channel`. Channels the actuator does not know are ignored.
    fn set_level(&mut self, channel: &str, level: IndicatorLevel);

    /// Drives every output to its safe (off) state.
    fn all_off(&mut self);
}

/// A single physical indicator.
pub trait Indicator {
    fn show(&mut self, level: IndicatorLevel);
    fn off(&mut self);
}

/// An [`Indicator`] that answers to one channel name.
pub struct Routed<I> {
    channel: &'static str,
    indicator: I,
}

impl<I: Indicator> Routed<I> {
    pub fn new(channel: &'static str, indicator: I) -> Self {
        Self { channel, indicator }
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}

impl<I: Indicator> Actuator for Routed<I> {
    fn set_level(&mut self, channel: &str, level: IndicatorLevel) {
        if channel == self.channel {
            self.indicator.show(level);
        }
    }

    fn all_off(&mut self) {
        self.indicator.off();
    }
}

/// Two actuators driven together.
pub struct ActuatorPair<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> ActuatorPair<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Actuator, B: Actuator> Actuator for ActuatorPair<A, B> {
    fn set_level(&mut self, channel: &str, level: IndicatorLevel) {
        self.first.set_level(channel, level);
        self.second.set_level(channel, level);
    }

    fn all_off(&mut self) {
        self.first.all_off();
        self.second.all_off();
    }
}

/// An actuator with no outputs, for deployments without indicators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActuator;

impl Actuator for NoopActuator {
    fn set_level(&mut self, _channel: &str, _level: IndicatorLevel) {}

    fn all_off(&mut self) {}
}

/// Three LEDs: green for low, yellow for medium, red for high.
pub struct TrafficLight<P> {
    green: P,
    yellow: P,
    red: P,
}

impl<P: OutputPin> TrafficLight<P> {
    pub fn new(green: P, yellow: P, red: P) -> Self {
        Self { green, yellow, red }
    }

    fn drive(&mut self, green: bool, yellow: bool, red: bool) {
        let results = [
            self.green.set_state(green.into()),
            self.yellow.set_state(yellow.into()),
            self.red.set_state(red.into()),
        ];
        if results.iter().any(Result::is_err) {
            warn!("indicator: failed to drive traffic light");
        }
    }
}

impl<P: OutputPin> Indicator for TrafficLight<P> {
    fn show(&mut self, level: IndicatorLevel) {
        match level {
            IndicatorLevel::Low => self.drive(true, false, false),
            IndicatorLevel::Medium => self.drive(false, true, false),
            IndicatorLevel::High => self.drive(false, false, true),
        }
    }

    fn off(&mut self) {
        self.drive(false, false, false);
    }
}

/// An RGB LED on three PWM channels: red for low, green for medium, blue for high.
pub struct RgbIndicator<C> {
    red: C,
    green: C,
    blue: C,
}

impl<C: SetDutyCycle> RgbIndicator<C> {
    pub fn new(red: C, green: C, blue: C) -> Self {
        Self { red, green, blue }
    }

    fn drive(&mut self, red: bool, green: bool, blue: bool) {
        fn set<C: SetDutyCycle>(channel: &mut C, on: bool) -> Result<(), C::Error> {
            if on {
                channel.set_duty_cycle_fully_on()
            } else {
                channel.set_duty_cycle_fully_off()
            }
        }

        let results = [
            set(&mut self.red, red),
            set(&mut self.green, green),
            set(&mut self.blue, blue),
        ];
        if results.iter().any(Result::is_err) {
            warn!("indicator: failed to drive rgb led");
        }
    }
}

impl<C: SetDutyCycle> Indicator for RgbIndicator<C> {
    fn show(&mut self, level: IndicatorLevel) {
        match level {
            IndicatorLevel::Low => self.drive(true, false, false),
            IndicatorLevel::Medium => self.drive(false, true, false),
            IndicatorLevel::High => self.drive(false, false, true),
        }
    }

    fn off(&mut self) {
        self.drive(false, false, false);
    }
}

/// Holds an actuator and switches all of its outputs off when dropped.
pub struct SafeOutputs<A: Actuator> {
    actuator: A,
}

impl<A: Actuator> SafeOutputs<A> {
    pub fn new(actuator: A) -> Self {
        Self { actuator }
    }

    pub fn set_level(&mut self, channel: &str, level: IndicatorLevel) {
        self.actuator.set_level(channel, level);
    }

    pub fn all_off(&mut self) {
        self.actuator.all_off();
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}

impl<A: Actuator> Drop for SafeOutputs<A> {
    fn drop(&mut self) {
        debug!("indicator: switching outputs off");
        self.actuator.all_off();
    }
}
