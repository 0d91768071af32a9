//! The timeslot callback as an explicit state machine.
//!
//! ```text
//!          Start                 sequence done
//!   Idle ─────────▶ SlotActive ────────────────▶ Idle
//!                       │ TimerExpired              ▲
//!                       ▼                           │
//!                    Ending ──── sequence aborts ───┘
//! ```
//!
//! The state lives in an atomic so a `TimerExpired` signal delivered while a pulse train is
//! being driven is seen by that train at its next wait boundary.

use embedded_hal::delay::DelayNs;
use portable_atomic::{AtomicU8, AtomicU32, Ordering};

use crate::platform::OutputPins;
use crate::pulse::{self, PulseOutcome, Snapshot};
use crate::timeslot::{SlotAction, SlotSignal};

/// Where the timeslot callback is in its cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GeneratorState {
    /// No slot in progress.
    Idle = 0,
    /// A granted slot is driving the pulse train.
    SlotActive = 1,
    /// The host asked to end the slot; the pulse train stops at its next wait.
    Ending = 2,
}

impl GeneratorState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::SlotActive,
            2 => Self::Ending,
            _ => Self::Idle,
        }
    }
}

/// Counters kept by the generator, readable from any context.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GeneratorStats {
    /// Slots in which a pulse train was started.
    pub slots: u32,
    /// Slots whose pulse train was cut short by timer expiry.
    pub overruns: u32,
}

/// The inner (pulse) layer of the generator.
#[derive(Debug)]
pub struct PulseGenerator {
    state: AtomicU8,
    slots: AtomicU32,
    overruns: AtomicU32,
}

impl Default for PulseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseGenerator {
    /// A generator in [`GeneratorState::Idle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(GeneratorState::Idle as u8),
            slots: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GeneratorState {
        GeneratorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            slots: self.slots.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    /// Handle one host signal.
    ///
    /// On [`SlotSignal::Start`], `snapshot` is called once to capture the channels, then the
    /// pulse train is driven on `pins` with `delay`. Every other signal returns at once.
    pub fn on_signal<P, D>(
        &self,
        signal: SlotSignal,
        snapshot: impl FnOnce() -> Snapshot,
        pins: &mut P,
        delay: &mut D,
    ) -> SlotAction
    where
        P: OutputPins + ?Sized,
        D: DelayNs + ?Sized,
    {
        match signal {
            SlotSignal::Start => {
                self.state
                    .store(GeneratorState::SlotActive as u8, Ordering::Release);
                let channels = snapshot();
                if !channels.is_empty() {
                    self.slots.fetch_add(1, Ordering::Relaxed);
                }
                let plan = pulse::plan(&channels);
                let outcome = pulse::run(&plan, pins, delay, || {
                    self.state() == GeneratorState::Ending
                });
                self.state
                    .store(GeneratorState::Idle as u8, Ordering::Release);
                if let PulseOutcome::Aborted { still_high } = outcome {
                    self.overruns.fetch_add(1, Ordering::Relaxed);
                    debug!("slot ended early, {} pins left high", still_high);
                }
                SlotAction::End
            }
            SlotSignal::TimerExpired => {
                // Only an in-flight train needs telling; otherwise stay idle.
                let _ = self.state.compare_exchange(
                    GeneratorState::SlotActive as u8,
                    GeneratorState::Ending as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                SlotAction::End
            }
            SlotSignal::Radio => SlotAction::None,
            SlotSignal::Other(code) => {
                trace!("ignoring timeslot signal {}", code);
                SlotAction::None
            }
        }
    }
}
