//! # Sensor Telemetry for Embedded Systems
//!
//! `myrtio-telemetry` polls environmental sensors, keeps each of them alive
//! with per-channel fault recovery, drives indicator LEDs from thresholds, and
//! publishes the readings over a minimal MQTT 3.1.1 client. It is `no_std`,
//! allocation-free, and built on the [Embassy](https://embassy.dev/) async
//! ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Fixed-size buffers and `heapless` collections only.
//! - **Fault recovery:** A sensor that keeps failing validation, or stops
//!   producing data altogether, is reset without stopping the other channels.
//! - **Sparse records:** Each cycle publishes one JSON object holding only the
//!   metrics that were read successfully.
//! - **Publish-only MQTT:** `CONNECT`, `PUBLISH`, and `DISCONNECT` over any
//!   [`MqttTransport`]; `TcpTransport` covers `embassy-net` sockets.
//! - **Safe outputs:** Indicators are switched off whenever the loop ends,
//!   including when its future is dropped.
//!
//! ## Architecture
//!
//! ```text
//!  SensorDriver ─▶ SensorChannel ─┐
//!  SensorDriver ─▶ SensorChannel ─┼─▶ TelemetryLoop ─▶ TelemetryRecord ─▶ MqttClient ─▶ MqttTransport
//!                                 │         │
//!                                 │         └─▶ Actuator (TrafficLight, RgbIndicator)
//!                          ChannelGroup
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use myrtio_telemetry::config::presets;
//! use myrtio_telemetry::{ChannelPair, MqttClient, MqttOptions, SensorChannel, TelemetryConfig};
//!
//! static INDICATORS: [IndicatorMapping; 1] = [presets::CO2_INDICATOR];
//!
//! let options = MqttOptions::new("greenhouse-1", "broker.local");
//! let client = MqttClient::<_, 512>::new(TcpTransport::new(stack, socket, Duration::from_secs(10)), options);
//! let channels = ChannelPair::new(
//!     SensorChannel::new(scd41, presets::CO2),
//!     SensorChannel::new(soil_probe, presets::SOIL_MOISTURE),
//! );
//! let config = TelemetryConfig::new("greenhouse/1/telemetry").with_indicators(&INDICATORS);
//!
//! let mut telemetry = TelemetryLoop::new(client, channels, traffic_light, SystemClock, config);
//! telemetry.start().await?;
//! telemetry.run(&SHUTDOWN).await;
//! ```

#![cfg_attr(not(test), no_std)]

// This must go first so the logging macros are visible to every module.
mod fmt;

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod indicator;
pub mod packet;
pub mod record;
pub mod sensor;
pub mod telemetry;
pub mod transport;
pub mod util;

#[cfg(test)]
mod test_util;

// Re-export key types for easier access at the crate root.
pub use client::{MqttClient, MqttOptions};
pub use clock::{Clock, SystemClock};
pub use config::{ChannelConfig, TelemetryConfig};
pub use error::{MqttError, ProtocolError};
pub use indicator::{Actuator, IndicatorLevel, IndicatorMapping, Thresholds};
pub use packet::QoS;
pub use record::TelemetryRecord;
pub use sensor::{ChannelGroup, ChannelPair, SensorChannel, SensorDriver};
pub use telemetry::{TelemetryError, TelemetryLoop};
pub use transport::{MqttTransport, TcpTransport};
