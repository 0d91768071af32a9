//! The host radio stack's timeslot contract, reduced to what the servo generator needs.
//!
//! The host grants short windows of exclusive CPU and timer time. The generator asks for
//! one window per refresh cycle with a fixed-shape [`TimeslotRequest`] and is called back
//! with a [`SlotSignal`] for every event inside a granted window. The callback answers with
//! a [`SlotAction`].

use embassy_time::Duration;

use crate::Result;

/// Length of the window requested every cycle. Covers the longest pulse (2400 µs) with margin.
pub const TIMESLOT_LENGTH: Duration = Duration::from_micros(2_500);

/// How long the host may take to grant a request before dropping it.
pub const TIMESLOT_TIMEOUT: Duration = Duration::from_micros(100_000);

/// Events delivered by the host stack to the timeslot callback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotSignal {
    /// The granted window has begun; the callback owns the CPU until it returns.
    Start,
    /// Informational radio traffic during the window.
    Radio,
    /// The window's timer budget is spent.
    TimerExpired,
    /// Any signal kind this crate does not act on (raw code kept for logging).
    Other(u8),
}

/// What the callback asks the host stack to do after it returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotAction {
    /// Keep the window as it is.
    None,
    /// End the window now.
    End,
}

/// Scheduling policy of a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    /// The earliest window the host can fit in before `timeout`.
    Earliest,
}

/// Priority of a request relative to other timeslot users.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Normal priority.
    Normal,
    /// High priority.
    High,
}

/// Parameters of one timeslot request. Rebuilt every cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeslotRequest {
    /// Scheduling policy.
    pub kind: RequestKind,
    /// Requested window length.
    pub length: Duration,
    /// Request priority.
    pub priority: Priority,
    /// Time after which an ungranted request is dropped.
    pub timeout: Duration,
}

impl TimeslotRequest {
    /// The request issued on every refresh tick: earliest slot, 2500 µs, normal priority,
    /// 100 ms timeout.
    #[must_use]
    pub const fn servo_refresh() -> Self {
        Self {
            kind: RequestKind::Earliest,
            length: TIMESLOT_LENGTH,
            priority: Priority::Normal,
            timeout: TIMESLOT_TIMEOUT,
        }
    }
}

/// A session with the host radio stack.
///
/// While a session is open the platform routes every timeslot signal to
/// [`Servos::on_signal`](crate::servos::Servos::on_signal).
pub trait TimeslotSession {
    /// Open the session and register the servo callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeslotSession`](crate::Error::TimeslotSession) if the host refuses.
    fn open(&mut self) -> Result<()>;

    /// Close the session. Must tolerate a request still pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeslotSession`](crate::Error::TimeslotSession) if the host refuses.
    fn close(&mut self) -> Result<()>;

    /// Ask for a window. Fire-and-forget: a grant arrives later as [`SlotSignal::Start`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeslotRequest`](crate::Error::TimeslotRequest) if the host refuses
    /// to queue the request.
    fn request(&mut self, request: &TimeslotRequest) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_request_has_fixed_shape() {
        let request = TimeslotRequest::servo_refresh();
        assert_eq!(request.kind, RequestKind::Earliest);
        assert_eq!(request.priority, Priority::Normal);
        assert_eq!(request.length.as_micros(), 2_500);
        assert_eq!(request.timeout.as_micros(), 100_000);
    }
}
