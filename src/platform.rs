//! Hardware seams the pulse generator is written against.
//!
//! The generator never touches registers itself. A board crate implements these traits
//! (plus [`TimeslotSession`](crate::timeslot::TimeslotSession)) and hands them to
//! [`Servos`](crate::servos::Servos). The busy-wait primitive is
//! [`embedded_hal::delay::DelayNs`].

use embassy_time::Duration;
pub use embedded_hal::digital::PinState;

/// Opaque output pin identifier.
///
/// Only the [`OutputPins`] implementation gives it meaning (for example, the GPIO number on
/// port 0 of an nRF51).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin(pub u32);

impl From<u32> for Pin {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

/// Digital output primitive.
///
/// `set_level` must take effect immediately with no buffering; the pulse executor relies
/// on the write landing before the next busy-wait starts.
pub trait OutputPins {
    /// Configure `pin` as a push-pull digital output.
    fn configure_output(&mut self, pin: Pin);

    /// Drive `pin` to `level`.
    fn set_level(&mut self, pin: Pin, level: PinState);
}

impl<T: OutputPins + ?Sized> OutputPins for &mut T {
    fn configure_output(&mut self, pin: Pin) {
        T::configure_output(self, pin);
    }

    fn set_level(&mut self, pin: Pin, level: PinState) {
        T::set_level(self, pin, level);
    }
}

/// A periodic trigger that calls [`Servos::on_tick`](crate::servos::Servos::on_tick) every
/// `interval` until stopped.
pub trait PeriodicTrigger {
    /// Begin ticking. The first tick arrives one `interval` from now.
    fn start(&mut self, interval: Duration);

    /// Stop ticking. Safe to call when already stopped.
    fn stop(&mut self);
}

/// Busy-wait delay for Cortex-M cores, calibrated from the core clock.
///
/// Safe to use from interrupt context: it only spins.
#[cfg(all(feature = "arm", target_arch = "arm"))]
#[derive(Clone, Copy, Debug)]
pub struct SpinDelay {
    cycles_per_us: u32,
}

#[cfg(all(feature = "arm", target_arch = "arm"))]
impl SpinDelay {
    /// Create a delay for a core running at `core_hz`.
    #[must_use]
    pub const fn new(core_hz: u32) -> Self {
        let cycles_per_us = core_hz / 1_000_000;
        Self {
            cycles_per_us: if cycles_per_us == 0 { 1 } else { cycles_per_us },
        }
    }
}

#[cfg(all(feature = "arm", target_arch = "arm"))]
impl embedded_hal::delay::DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = u64::from(ns) * u64::from(self.cycles_per_us) / 1_000;
        cortex_m::asm::delay(u32::try_from(cycles).unwrap_or(u32::MAX));
    }

    fn delay_us(&mut self, us: u32) {
        cortex_m::asm::delay(us.saturating_mul(self.cycles_per_us));
    }
}
