//! # Configuration
//!
//! Plain values with `const fn` builders, so a whole deployment can live in
//! `static`s:
//!
//! ```ignore
//! static INDICATORS: [IndicatorMapping; 2] = [presets::CO2_INDICATOR, presets::SOIL_INDICATOR];
//! static TELEMETRY: TelemetryConfig<'static> =
//!     TelemetryConfig::new("greenhouse/telemetry").with_indicators(&INDICATORS);
//! ```

use embassy_time::Duration;

use crate::indicator::IndicatorMapping;
use crate::packet::QoS;

/// Consecutive failed attempts before a sensor is reset.
pub const MAX_SENSOR_FAILURES: u32 = 5;

/// Longest gap between successful reads before a sensor is reset.
pub const SENSOR_TIMEOUT: Duration = Duration::from_secs(300);

/// Default telemetry period.
pub const MEASUREMENT_INTERVAL: Duration = Duration::from_secs(60);

/// Validity range and recovery limits of one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    /// Metric name, used as the JSON key.
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub max_failures: u32,
    pub timeout: Duration,
}

impl ChannelConfig {
    pub const fn new(name: &'static str, min: f32, max: f32) -> Self {
        Self {
            name,
            min,
            max,
            max_failures: MAX_SENSOR_FAILURES,
            timeout: SENSOR_TIMEOUT,
        }
    }

    /// Sets the failure limit. Zero is treated as one.
    pub const fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = if max_failures == 0 { 1 } else { max_failures };
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether `value` lies in `[min, max]`. NaN never does.
    pub fn accepts(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Settings of the telemetry loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryConfig<'a> {
    pub topic: &'a str,
    pub period: Duration,
    pub qos: QoS,
    pub retain: bool,
    pub indicators: &'a [IndicatorMapping],
}

impl<'a> TelemetryConfig<'a> {
    /// QoS 0, not retained, one cycle per [`MEASUREMENT_INTERVAL`], no indicators.
    pub const fn new(topic: &'a str) -> Self {
        Self {
            topic,
            period: MEASUREMENT_INTERVAL,
            qos: QoS::AtMostOnce,
            retain: false,
            indicators: &[],
        }
    }

    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub const fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub const fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub const fn with_indicators(mut self, indicators: &'a [IndicatorMapping]) -> Self {
        self.indicators = indicators;
        self
    }

    /// The indicator mapping for `channel`, if any.
    pub fn indicator_for(&self, channel: &str) -> Option<&IndicatorMapping> {
        self.indicators.iter().find(|m| m.channel == channel)
    }
}

/// Channel and indicator settings for the greenhouse sensor set.
pub mod presets {
    use super::ChannelConfig;
    use crate::indicator::IndicatorMapping;

    /// CO2 concentration, ppm.
    pub const CO2: ChannelConfig = ChannelConfig::new("co2", 300.0, 5000.0);
    /// Air temperature, °C.
    pub const AIR_TEMPERATURE: ChannelConfig = ChannelConfig::new("temp_air", -20.0, 60.0);
    /// Relative air humidity, %.
    pub const HUMIDITY: ChannelConfig = ChannelConfig::new("rh_air", 0.0, 100.0);
    /// Raw 12-bit soil moisture ADC value.
    pub const SOIL_MOISTURE: ChannelConfig = ChannelConfig::new("moisture", 0.0, 4095.0);
    /// Soil temperature, °C.
    pub const SOIL_TEMPERATURE: ChannelConfig = ChannelConfig::new("temp_soil", -20.0, 60.0);

    pub const CO2_INDICATOR: IndicatorMapping = IndicatorMapping::new("co2", 600.0, 1400.0);
    pub const SOIL_INDICATOR: IndicatorMapping = IndicatorMapping::new("moisture", 400.0, 1200.0);
}
