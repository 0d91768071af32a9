//! Host-side stand-ins for the platform collaborators.
//!
//! [`MockHost`] records every call the servo context makes in normal context.
//! [`SimClock`] is a virtual microsecond clock that doubles as the output pins of the
//! timeslot callback, so a pulse train can be checked edge by edge without hardware.

use core::cell::{Cell, RefCell};

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;

use crate::platform::{OutputPins, PeriodicTrigger, Pin, PinState};
use crate::timeslot::{TimeslotRequest, TimeslotSession};
use crate::{Error, Result};

/// One call made on a [`MockHost`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// `configure_output(pin)`.
    Configure(Pin),
    /// `set_level(pin, level)`.
    Level(Pin, PinState),
    /// `open()` accepted.
    Open,
    /// `close()` accepted.
    Close,
    /// `request(..)` accepted.
    Request(TimeslotRequest),
    /// `start(interval)` on the periodic trigger.
    TriggerStart(Duration),
    /// `stop()` on the periodic trigger.
    TriggerStop,
}

/// Recording implementation of every collaborator trait.
#[derive(Debug, Default)]
pub struct MockHost {
    /// Calls in the order they happened. Refused calls are not recorded.
    pub events: Vec<HostEvent>,
    /// Refuse `open()` with [`Error::TimeslotSession`].
    pub refuse_open: bool,
    /// Refuse `request()` with [`Error::TimeslotRequest`].
    pub refuse_requests: bool,
}

impl MockHost {
    /// Number of accepted timeslot requests.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, HostEvent::Request(_)))
            .count()
    }

    /// Pins configured as outputs, in call order.
    #[must_use]
    pub fn configured(&self) -> Vec<Pin> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HostEvent::Configure(pin) => Some(*pin),
                _ => None,
            })
            .collect()
    }

    /// How many times `event` was recorded.
    #[must_use]
    pub fn count(&self, event: &HostEvent) -> usize {
        self.events.iter().filter(|seen| *seen == event).count()
    }
}

impl OutputPins for MockHost {
    fn configure_output(&mut self, pin: Pin) {
        self.events.push(HostEvent::Configure(pin));
    }

    fn set_level(&mut self, pin: Pin, level: PinState) {
        self.events.push(HostEvent::Level(pin, level));
    }
}

impl TimeslotSession for MockHost {
    fn open(&mut self) -> Result<()> {
        if self.refuse_open {
            return Err(Error::TimeslotSession);
        }
        self.events.push(HostEvent::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.push(HostEvent::Close);
        Ok(())
    }

    fn request(&mut self, request: &TimeslotRequest) -> Result<()> {
        if self.refuse_requests {
            return Err(Error::TimeslotRequest);
        }
        self.events.push(HostEvent::Request(*request));
        Ok(())
    }
}

impl PeriodicTrigger for MockHost {
    fn start(&mut self, interval: Duration) {
        self.events.push(HostEvent::TriggerStart(interval));
    }

    fn stop(&mut self) {
        self.events.push(HostEvent::TriggerStop);
    }
}

/// A level change seen by a [`SimClock`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Edge {
    /// Virtual time of the write, in microseconds.
    pub at_us: u32,
    /// Pin written.
    pub pin: Pin,
    /// Level written.
    pub level: PinState,
}

type Alarm<'a> = Box<dyn FnOnce(&SimClock<'a>) + 'a>;

/// Virtual clock and pin recorder for the timeslot callback.
///
/// Busy-waits advance the clock instantly. An alarm set with [`SimClock::set_alarm`] fires
/// once, at the end of the first wait that reaches its time, which is how a test delivers
/// `TimerExpired` in the middle of a pulse train.
///
/// Both traits are implemented for `&SimClock`, so one clock can be passed as pins and
/// delay at once: `servos.on_signal(signal, &mut &clock, &mut &clock)`.
#[derive(Default)]
pub struct SimClock<'a> {
    now_us: Cell<u32>,
    edges: RefCell<Vec<Edge>>,
    alarm: RefCell<Option<(u32, Alarm<'a>)>>,
}

impl<'a> SimClock<'a> {
    /// A clock at time zero with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in microseconds.
    #[must_use]
    pub fn now_us(&self) -> u32 {
        self.now_us.get()
    }

    /// Every recorded edge, oldest first.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.edges.borrow().clone()
    }

    /// Time from `pin`'s last rise to the fall after it, if both were seen.
    #[must_use]
    pub fn high_time_us(&self, pin: Pin) -> Option<u32> {
        let edges = self.edges.borrow();
        let rise = edges
            .iter()
            .rposition(|edge| edge.pin == pin && edge.level == PinState::High)?;
        let rise_us = edges.get(rise)?.at_us;
        let fall = edges
            .iter()
            .skip(rise)
            .find(|edge| edge.pin == pin && edge.level == PinState::Low)?;
        Some(fall.at_us - rise_us)
    }

    /// Last level written to `pin`.
    #[must_use]
    pub fn level(&self, pin: Pin) -> Option<PinState> {
        self.edges
            .borrow()
            .iter()
            .rev()
            .find(|edge| edge.pin == pin)
            .map(|edge| edge.level)
    }

    /// Forget recorded edges and rewind to time zero. A pending alarm is kept.
    pub fn reset(&self) {
        self.edges.borrow_mut().clear();
        self.now_us.set(0);
    }

    /// Run `alarm` once the clock reaches `at_us`.
    pub fn set_alarm(&self, at_us: u32, alarm: impl FnOnce(&SimClock<'a>) + 'a) {
        *self.alarm.borrow_mut() = Some((at_us, Box::new(alarm)));
    }

    fn advance(&self, us: u32) {
        self.now_us.set(self.now_us.get().saturating_add(us));
        let due = {
            let mut alarm = self.alarm.borrow_mut();
            match alarm.as_ref() {
                Some((at_us, _)) if *at_us <= self.now_us.get() => alarm.take(),
                _ => None,
            }
        };
        if let Some((_, alarm)) = due {
            alarm(self);
        }
    }
}

impl OutputPins for &SimClock<'_> {
    fn configure_output(&mut self, _pin: Pin) {}

    fn set_level(&mut self, pin: Pin, level: PinState) {
        self.edges.borrow_mut().push(Edge {
            at_us: self.now_us.get(),
            pin,
            level,
        });
    }
}

impl DelayNs for &SimClock<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(ns / 1_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_fires_once_when_due() {
        let fired = Cell::new(0);
        let clock = SimClock::new();
        clock.set_alarm(1_000, |clock| fired.set(clock.now_us()));

        (&clock).delay_us(600);
        assert_eq!(fired.get(), 0);
        (&clock).delay_us(600);
        assert_eq!(fired.get(), 1_200);
        (&clock).delay_us(600);
        assert_eq!(clock.now_us(), 1_800);
        assert_eq!(fired.get(), 1_200);
    }

    #[test]
    fn high_time_measures_rise_to_fall() {
        let clock = SimClock::new();
        let mut pins = &clock;
        pins.set_level(Pin(4), PinState::High);
        (&clock).delay_us(1_500);
        pins.set_level(Pin(4), PinState::Low);

        assert_eq!(clock.high_time_us(Pin(4)), Some(1_500));
        assert_eq!(clock.high_time_us(Pin(5)), None);
        assert_eq!(clock.level(Pin(4)), Some(PinState::Low));
    }

    #[test]
    fn refused_request_is_not_recorded() {
        let mut host = MockHost {
            refuse_requests: true,
            ..MockHost::default()
        };
        assert_eq!(
            host.request(&TimeslotRequest::servo_refresh()),
            Err(Error::TimeslotRequest)
        );
        assert_eq!(host.requests(), 0);
    }
}
