//! In-memory fakes shared by the unit tests.
//!
//! Every fake is a cheap handle to shared state so a test can keep a clone
//! after moving the original into the code under test.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_time::Instant;

use crate::clock::Clock;
use crate::indicator::{Actuator, IndicatorLevel};
use crate::sensor::SensorDriver;
use crate::transport::MqttTransport;

// --- Transport ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockTransportError {
    Refused,
    Broken,
}

#[derive(Default)]
struct Wire {
    replies: VecDeque<u8>,
    frames: Vec<Vec<u8>>,
    max_chunk: Option<usize>,
    fail_open: bool,
    fail_send: bool,
    opened_to: Option<String>,
    open_count: usize,
    closed: bool,
}

/// A byte-stream fake: records every `send` as one frame and serves
/// queued reply bytes to `recv`, returning 0 once they run out.
#[derive(Clone, Default)]
pub struct MockTransport {
    wire: Rc<RefCell<Wire>>,
}

impl MockTransport {
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.wire.borrow_mut().replies.extend(bytes.iter().copied());
    }

    pub fn set_max_chunk(&self, max: usize) {
        self.wire.borrow_mut().max_chunk = Some(max);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.wire.borrow_mut().fail_open = fail;
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.wire.borrow_mut().fail_send = fail;
    }

    /// All bytes sent so far, concatenated.
    pub fn sent(&self) -> Vec<u8> {
        self.wire.borrow().frames.concat()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.wire.borrow().frames.clone()
    }

    pub fn clear_sent(&self) {
        self.wire.borrow_mut().frames.clear();
    }

    pub fn opened_to(&self) -> Option<String> {
        self.wire.borrow().opened_to.clone()
    }

    pub fn open_count(&self) -> usize {
        self.wire.borrow().open_count
    }

    pub fn closed(&self) -> bool {
        self.wire.borrow().closed
    }
}

impl MqttTransport for MockTransport {
    type Error = MockTransportError;

    async fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        wire.open_count += 1;
        if wire.fail_open {
            return Err(MockTransportError::Refused);
        }
        wire.opened_to = Some(format!("{host}:{port}"));
        wire.closed = false;
        Ok(())
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail_send {
            return Err(MockTransportError::Broken);
        }
        wire.frames.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        let limit = wire.max_chunk.unwrap_or(usize::MAX).min(buf.len());
        let mut n = 0;
        while n < limit {
            match wire.replies.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.wire.borrow_mut().closed = true;
        Ok(())
    }
}

// --- Sensor driver ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

struct DriverScript {
    reads: VecDeque<Result<f32, BusFault>>,
    fallback: Result<f32, BusFault>,
    ready: bool,
    resets: VecDeque<Result<(), BusFault>>,
    reset_calls: usize,
    read_calls: usize,
}

/// A sensor driver that replays scripted outcomes. Once the script is
/// exhausted every read returns the fallback outcome.
#[derive(Clone)]
pub struct ScriptedDriver {
    script: Rc<RefCell<DriverScript>>,
}

impl ScriptedDriver {
    pub fn returning(value: f32) -> Self {
        Self::with_fallback(Ok(value))
    }

    pub fn failing() -> Self {
        Self::with_fallback(Err(BusFault))
    }

    fn with_fallback(fallback: Result<f32, BusFault>) -> Self {
        Self {
            script: Rc::new(RefCell::new(DriverScript {
                reads: VecDeque::new(),
                fallback,
                ready: true,
                resets: VecDeque::new(),
                reset_calls: 0,
                read_calls: 0,
            })),
        }
    }

    pub fn then(self, outcome: Result<f32, BusFault>) -> Self {
        self.script.borrow_mut().reads.push_back(outcome);
        self
    }

    pub fn set_fallback(&self, outcome: Result<f32, BusFault>) {
        self.script.borrow_mut().fallback = outcome;
    }

    pub fn set_ready(&self, ready: bool) {
        self.script.borrow_mut().ready = ready;
    }

    pub fn fail_next_reset(&self) {
        self.script.borrow_mut().resets.push_back(Err(BusFault));
    }

    pub fn reset_calls(&self) -> usize {
        self.script.borrow().reset_calls
    }

    pub fn read_calls(&self) -> usize {
        self.script.borrow().read_calls
    }
}

impl SensorDriver for ScriptedDriver {
    type Error = BusFault;

    async fn data_ready(&mut self) -> bool {
        self.script.borrow().ready
    }

    async fn read(&mut self) -> Result<f32, Self::Error> {
        let mut script = self.script.borrow_mut();
        script.read_calls += 1;
        let fallback = script.fallback;
        script.reads.pop_front().unwrap_or(fallback)
    }

    async fn reset(&mut self) -> Result<(), Self::Error> {
        let mut script = self.script.borrow_mut();
        script.reset_calls += 1;
        script.resets.pop_front().unwrap_or(Ok(()))
    }
}

// --- Actuator ---

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorEvent {
    Level(String, IndicatorLevel),
    AllOff,
}

#[derive(Clone, Default)]
pub struct RecordingActuator {
    events: Rc<RefCell<Vec<ActuatorEvent>>>,
}

impl RecordingActuator {
    pub fn events(&self) -> Vec<ActuatorEvent> {
        self.events.borrow().clone()
    }
}

impl Actuator for RecordingActuator {
    fn set_level(&mut self, channel: &str, level: IndicatorLevel) {
        self.events
            .borrow_mut()
            .push(ActuatorEvent::Level(channel.into(), level));
    }

    fn all_off(&mut self) {
        self.events.borrow_mut().push(ActuatorEvent::AllOff);
    }
}

// --- Clock ---

/// A clock that only moves when told to, or when something sleeps on it.
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
    sleeps: Rc<RefCell<Vec<Instant>>>,
}

impl ManualClock {
    pub fn starting_at(secs: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::from_secs(secs))),
            sleeps: Rc::default(),
        }
    }

    pub fn advance(&self, by: embassy_time::Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn sleeps(&self) -> Vec<Instant> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        self.sleeps.borrow_mut().push(deadline);
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
        // Give a surrounding `select` the chance to observe other futures.
        embassy_futures::yield_now().await;
    }
}

// --- embedded-hal pins ---

#[derive(Clone, Default)]
pub struct FakePin {
    high: Rc<Cell<bool>>,
}

impl FakePin {
    pub fn is_high(&self) -> bool {
        self.high.get()
    }
}

impl embedded_hal::digital::ErrorType for FakePin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(true);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakePwm {
    duty: Rc<Cell<u16>>,
}

impl FakePwm {
    pub fn duty(&self) -> u16 {
        self.duty.get()
    }
}

impl embedded_hal::pwm::ErrorType for FakePwm {
    type Error = core::convert::Infallible;
}

impl embedded_hal::pwm::SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duty.set(duty);
        Ok(())
    }
}
