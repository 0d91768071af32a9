//! Hobby-servo pulses generated inside timeslots borrowed from a host radio stack.
//!
//! On an nRF51 the radio stack owns the hardware timers, so servo pulses cannot come from
//! a PWM peripheral. Instead, every 10 ms the crate asks the stack for a short exclusive
//! window and, when it is granted, raises every attached pin at once and lowers each one
//! after its own pulse width using busy-waits.
//!
//! Start with [`servos::Servos`], which owns the channel registry and the platform
//! collaborators, and hand out [`channel::Channel`]s from it.
//!
//! # Glossary
//!
//! - **Pulse width:** how long a servo pin stays high each refresh, 544–2400 µs. Maps
//!   linearly to 0–180°.
//! - **Timeslot:** a window of exclusive CPU and timer time granted by the radio stack.
//! - **Refresh cycle:** the 10 ms period at which timeslots are requested.
//! - **Compaction:** removing a channel shifts every later channel down one index, so
//!   attached channels always hold indices `0..n`.
//!
//! # Features
//!
//! - `defmt`: log through `defmt`.
//! - `arm`: Cortex-M busy-wait (`platform::SpinDelay`) and single-core critical section.
//! - `host`: std build with the `mock` collaborators, for tests on a workstation.
#![cfg_attr(not(any(test, feature = "host")), no_std)]

// Must come first so the logging macros are visible to every later module.
#[macro_use]
mod fmt;

pub mod channel;
mod error;
pub mod generator;
#[cfg(any(test, feature = "host"))]
pub mod mock;
pub mod platform;
pub mod positions;
pub mod pulse;
pub mod refresh;
pub mod registry;
pub mod servos;
pub mod timeslot;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};

pub use crate::channel::{Channel, INVALID_CHANNEL};
pub use crate::platform::{OutputPins, PeriodicTrigger, Pin};
pub use crate::servos::{ServoHost, Servos};
pub use crate::timeslot::{SlotAction, SlotSignal, TimeslotRequest, TimeslotSession};
