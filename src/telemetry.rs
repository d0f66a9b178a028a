//! # Telemetry Loop
//!
//! [`TelemetryLoop`] owns the MQTT client, the sensor channels, and the
//! indicator outputs, and runs one cycle per configured period:
//!
//! 1. reconnect if the last publish dropped the connection,
//! 2. tick every channel and collect the successful readings,
//! 3. drive the indicators for readings that have a mapping,
//! 4. publish the readings as one JSON object, unless there are none,
//! 5. sleep until the next period boundary.
//!
//! Nothing after [`TelemetryLoop::start`] is fatal. Cycle errors are logged
//! and the loop carries on.
//!
//! # Example
//!
//! ```ignore
//! static SHUTDOWN: Signal<CriticalSectionRawMutex, ()> = Signal::new();
//!
//! let client = MqttClient::<_, 512>::new(TcpTransport::new(stack, socket, timeout), options);
//! let channels = ChannelPair::new(co2, [moisture, soil_temperature]);
//! let outputs = ActuatorPair::new(Routed::new("co2", light), Routed::new("moisture", rgb));
//!
//! let mut telemetry = TelemetryLoop::new(client, channels, outputs, SystemClock, TELEMETRY);
//! telemetry.start().await?;
//! telemetry.run(&SHUTDOWN).await;
//! ```

use core::convert::Infallible;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};

use crate::client::MqttClient;
use crate::clock::Clock;
use crate::config::TelemetryConfig;
use crate::error::MqttError;
use crate::indicator::{Actuator, SafeOutputs};
use crate::record::TelemetryRecord;
use crate::sensor::{ChannelGroup, Reading};
use crate::transport::MqttTransport;

/// Why a cycle did not publish everything it collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError<E> {
    /// The broker could not be reached again; nothing was published.
    Reconnect(MqttError<E>),
    /// Publishing the record failed.
    Publish(MqttError<E>),
    /// More readings than a record holds; the surplus was dropped.
    RecordFull,
    /// The JSON rendering did not fit the `BUF_SIZE` payload buffer.
    PayloadTooLarge,
}

impl<E> TelemetryError<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryError::Reconnect(_) => "reconnect failed",
            TelemetryError::Publish(_) => "publish failed",
            TelemetryError::RecordFull => "record full",
            TelemetryError::PayloadTooLarge => "payload too large",
        }
    }
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    /// Number of channels that produced a valid reading.
    pub readings: usize,
    /// Whether a record was sent.
    pub published: bool,
    /// Packet id of the publish, for QoS > 0.
    pub packet_id: Option<u16>,
}

/// The deadline of the cycle that started at `cycle_start`.
///
/// Normally the next period boundary. A cycle that overran its period is
/// followed by a full period from `now` rather than a burst of catch-up cycles.
pub fn next_deadline(cycle_start: Instant, now: Instant, period: Duration) -> Instant {
    let deadline = cycle_start + period;
    if deadline >= now { deadline } else { now + period }
}

/// Periodic sensor polling and publishing.
///
/// `BUF_SIZE` sizes both the client's packet buffer and the JSON payload
/// buffer. It has to hold a full record: roughly the metric name plus 16
/// bytes per channel, plus the topic and a few bytes of framing.
pub struct TelemetryLoop<'a, T, G, A, C, const BUF_SIZE: usize>
where
    T: MqttTransport,
    G: ChannelGroup,
    A: Actuator,
    C: Clock,
{
    client: MqttClient<'a, T, BUF_SIZE>,
    channels: G,
    outputs: SafeOutputs<A>,
    clock: C,
    config: TelemetryConfig<'a>,
    payload: [u8; BUF_SIZE],
    cycles: u32,
}

impl<'a, T, G, A, C, const BUF_SIZE: usize> TelemetryLoop<'a, T, G, A, C, BUF_SIZE>
where
    T: MqttTransport,
    G: ChannelGroup,
    A: Actuator,
    C: Clock,
{
    pub fn new(
        client: MqttClient<'a, T, BUF_SIZE>,
        channels: G,
        actuator: A,
        clock: C,
        config: TelemetryConfig<'a>,
    ) -> Self {
        Self {
            client,
            channels,
            outputs: SafeOutputs::new(actuator),
            clock,
            config,
            payload: [0; BUF_SIZE],
            cycles: 0,
        }
    }

    pub fn client(&self) -> &MqttClient<'a, T, BUF_SIZE> {
        &self.client
    }

    pub fn channels(&self) -> &G {
        &self.channels
    }

    pub fn actuator(&self) -> &A {
        self.outputs.actuator()
    }

    pub fn config(&self) -> &TelemetryConfig<'a> {
        &self.config
    }

    /// Number of cycles run so far.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Connects to the broker. Any error here should stop the application.
    pub async fn start(&mut self) -> Result<(), MqttError<T::Error>> {
        self.client.connect().await.inspect_err(|e| {
            error!("telemetry: initial connect failed: {}", e.kind());
        })
    }

    /// Runs one cycle without sleeping.
    pub async fn tick(&mut self) -> Result<CycleReport, TelemetryError<T::Error>> {
        let now = self.clock.now();
        self.cycles = self.cycles.wrapping_add(1);
        trace!("telemetry: cycle {}", self.cycles);

        let link = if self.client.is_connected() {
            Ok(())
        } else {
            info!("telemetry: reconnecting");
            self.client.connect().await
        };

        let mut record = TelemetryRecord::new();
        let mut dropped = 0usize;
        self.channels
            .tick(now, &mut |reading: Reading| {
                if record.insert(reading).is_err() {
                    dropped += 1;
                }
            })
            .await;

        for (name, value) in record.iter() {
            if let Some(mapping) = self.config.indicator_for(name) {
                self.outputs.set_level(name, mapping.thresholds.level(value));
            }
        }

        if let Err(e) = link {
            return Err(TelemetryError::Reconnect(e));
        }

        let mut report = CycleReport {
            readings: record.len(),
            published: false,
            packet_id: None,
        };
        if record.is_empty() {
            debug!("telemetry: no valid readings, skipping publish");
        } else {
            let len = record
                .to_json(&mut self.payload)
                .map_err(|_| TelemetryError::PayloadTooLarge)?;
            report.packet_id = self
                .client
                .publish(
                    self.config.topic,
                    &self.payload[..len],
                    self.config.qos,
                    self.config.retain,
                )
                .await
                .map_err(TelemetryError::Publish)?;
            report.published = true;
        }

        if dropped > 0 {
            warn!("telemetry: {} readings did not fit the record", dropped);
            return Err(TelemetryError::RecordFull);
        }
        Ok(report)
    }

    /// Runs cycles until `shutdown` is signalled, then disconnects.
    ///
    /// The loop is consumed: indicator outputs are switched off when it is
    /// dropped, so they also go dark if this future is cancelled.
    pub async fn run<M: RawMutex>(mut self, shutdown: &Signal<M, ()>) {
        match select(self.cycle_forever(), shutdown.wait()).await {
            Either::First(never) => match never {},
            Either::Second(()) => info!("telemetry: shutdown requested"),
        }

        if self.client.is_connected() {
            if let Err(e) = self.client.disconnect().await {
                warn!("telemetry: disconnect failed: {}", e.kind());
            }
        }
    }

    async fn cycle_forever(&mut self) -> Infallible {
        loop {
            let cycle_start = self.clock.now();
            match self.tick().await {
                Ok(report) => debug!(
                    "telemetry: {} readings, published={}",
                    report.readings, report.published
                ),
                Err(e) => warn!("telemetry: cycle failed: {}", e.kind()),
            }
            let deadline = next_deadline(cycle_start, self.clock.now(), self.config.period);
            self.clock.sleep_until(deadline).await;
        }
    }
}
