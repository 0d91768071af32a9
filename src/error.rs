//! Error type shared by the crate.
//!
//! The public channel API never surfaces these: refused attaches come back as
//! [`INVALID_CHANNEL`](crate::channel::INVALID_CHANNEL) and out-of-range values are clamped.
//! They show up from the `try_*` variants and from the host collaborator traits.

use derive_more::{Display, Error};

/// Errors reported by registry operations and by host collaborators.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// All [`MAX_CHANNELS`](crate::registry::MAX_CHANNELS) slots are taken.
    #[display("servo registry is full")]
    RegistryFull,
    /// The channel already holds a registry slot.
    #[display("channel is already attached")]
    AlreadyAttached,
    /// The channel holds no registry slot.
    #[display("channel is not attached")]
    NotAttached,
    /// The host radio stack refused to open or close the timeslot session.
    #[display("timeslot session error")]
    TimeslotSession,
    /// The host radio stack refused a timeslot request.
    #[display("timeslot request refused")]
    TimeslotRequest,
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
