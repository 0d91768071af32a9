//! A hobby servo output: one pin and one pulse width.
//!
//! See [`Channel`] for the attach/write lifecycle.

use crate::platform::Pin;
use crate::registry::ChannelKey;
use crate::servos::{ServoHost, Servos};
use crate::Result;

/// Index reported by a detached channel or a refused attach.
pub const INVALID_CHANNEL: u8 = 255;

/// Shortest pulse the generator emits (microseconds).
pub const MIN_PULSE_WIDTH: u16 = 544;

/// Longest pulse the generator emits (microseconds).
pub const MAX_PULSE_WIDTH: u16 = 2_400;

/// Pulse width of a new channel (microseconds), about mid travel.
pub const DEFAULT_PULSE_WIDTH: u16 = 1_500;

/// Largest angle, in degrees, of the angle mapping.
pub const MAX_ANGLE: u16 = 180;

const SPAN_US: u32 = (MAX_PULSE_WIDTH - MIN_PULSE_WIDTH) as u32;

/// Clamp `us` into `[MIN_PULSE_WIDTH, MAX_PULSE_WIDTH]`.
#[must_use]
pub const fn clamp_pulse_width(us: u16) -> u16 {
    if us < MIN_PULSE_WIDTH {
        MIN_PULSE_WIDTH
    } else if us > MAX_PULSE_WIDTH {
        MAX_PULSE_WIDTH
    } else {
        us
    }
}

/// Map degrees onto the pulse range: 0 → 544 µs, 180 → 2400 µs. Clamped.
#[must_use]
pub const fn angle_to_pulse_width(degrees: u16) -> u16 {
    let us = MIN_PULSE_WIDTH as u32 + degrees as u32 * SPAN_US / MAX_ANGLE as u32;
    if us > MAX_PULSE_WIDTH as u32 {
        MAX_PULSE_WIDTH
    } else {
        us as u16
    }
}

/// Inverse of [`angle_to_pulse_width`], rounded to the nearest degree.
#[must_use]
pub const fn pulse_width_to_angle(us: u16) -> u16 {
    let us = clamp_pulse_width(us);
    let offset = (us - MIN_PULSE_WIDTH) as u32;
    ((offset * MAX_ANGLE as u32 + SPAN_US / 2) / SPAN_US) as u16
}

/// A servo output driven by the timeslot pulse generator.
///
/// A channel starts detached at [`DEFAULT_PULSE_WIDTH`]. [`attach`](Self::attach) claims a
/// registry slot and configures the pin; the first attach anywhere starts the generator.
/// Writes are stored on the channel and, while attached, published to the registry for the
/// next refresh. Dropping a channel detaches it.
///
/// Nothing here reports errors: bad values are clamped, redundant calls do nothing, and a
/// full registry shows up as [`INVALID_CHANNEL`]. Use [`try_attach`](Self::try_attach) to
/// learn why an attach was refused.
///
/// # Example
///
/// ```rust,ignore
/// use timeslot_servo::servos::Servos;
///
/// static SERVOS: Servos<Board> = Servos::new(Board::new());
///
/// let mut leg = SERVOS.channel();
/// leg.attach(28.into());
/// leg.write(90);      // centre
/// leg.write_microseconds(1_000);
/// assert_eq!(leg.read_microseconds(), 1_000);
/// leg.detach();       // last channel out stops the generator
/// ```
pub struct Channel<'s, H: ServoHost> {
    servos: &'s Servos<H>,
    key: ChannelKey,
    pin: Pin,
    pulse_width: u16,
}

impl<'s, H: ServoHost> Channel<'s, H> {
    pub(crate) const fn new(servos: &'s Servos<H>, key: ChannelKey) -> Self {
        Self {
            servos,
            key,
            pin: Pin(0),
            pulse_width: DEFAULT_PULSE_WIDTH,
        }
    }

    /// Claim the next registry slot for `pin`.
    ///
    /// Returns the slot index, the current index if already attached, or
    /// [`INVALID_CHANNEL`] if the registry is full.
    pub fn attach(&mut self, pin: Pin) -> u8 {
        match self.try_attach(pin) {
            Ok(index) => index,
            Err(_) => self.index(),
        }
    }

    /// Like [`attach`](Self::attach) but reports why nothing happened.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyAttached`](crate::Error::AlreadyAttached) or
    /// [`Error::RegistryFull`](crate::Error::RegistryFull); the channel is unchanged.
    pub fn try_attach(&mut self, pin: Pin) -> Result<u8> {
        let index = self.servos.attach(self.key, pin, self.pulse_width)?;
        self.pin = pin;
        debug!("servo on pin {} attached at {}", pin.0, index);
        Ok(index)
    }

    /// Release the registry slot. Later channels move down one index. The pulse width is kept.
    pub fn detach(&mut self) {
        let _ = self.try_detach();
    }

    /// Like [`detach`](Self::detach) but reports a channel that was not attached.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`](crate::Error::NotAttached).
    pub fn try_detach(&mut self) -> Result<()> {
        self.servos.detach(self.key)?;
        debug!("servo on pin {} detached", self.pin.0);
        Ok(())
    }

    /// Set the position in degrees, `0..=180`. Larger values clamp to 180.
    pub fn write(&mut self, degrees: u16) {
        self.write_microseconds(angle_to_pulse_width(degrees));
    }

    /// Set the raw pulse width, clamped into `[MIN_PULSE_WIDTH, MAX_PULSE_WIDTH]`.
    pub fn write_microseconds(&mut self, us: u16) {
        self.pulse_width = clamp_pulse_width(us);
        self.servos.publish(self.key, self.pulse_width);
    }

    /// Move to [`DEFAULT_PULSE_WIDTH`].
    pub fn center(&mut self) {
        self.write_microseconds(DEFAULT_PULSE_WIDTH);
    }

    /// Current position in degrees.
    #[must_use]
    pub const fn read(&self) -> u16 {
        pulse_width_to_angle(self.pulse_width)
    }

    /// Current pulse width in microseconds.
    #[must_use]
    pub const fn read_microseconds(&self) -> u16 {
        self.pulse_width
    }

    /// Whether the channel holds a registry slot.
    #[must_use]
    pub fn attached(&self) -> bool {
        self.index() != INVALID_CHANNEL
    }

    /// Registry slot, or [`INVALID_CHANNEL`] when detached. Follows compaction.
    #[must_use]
    pub fn index(&self) -> u8 {
        self.servos.index_of(self.key).unwrap_or(INVALID_CHANNEL)
    }

    /// Pin given to the last successful attach.
    #[must_use]
    pub const fn pin(&self) -> Pin {
        self.pin
    }
}

impl<H: ServoHost> Drop for Channel<'_, H> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<H: ServoHost> core::fmt::Debug for Channel<'_, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("pin", &self.pin)
            .field("pulse_width", &self.pulse_width)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angles_map_onto_pulse_range() {
        assert_eq!(angle_to_pulse_width(0), MIN_PULSE_WIDTH);
        assert_eq!(angle_to_pulse_width(90), 1_472);
        assert_eq!(angle_to_pulse_width(180), MAX_PULSE_WIDTH);
        assert_eq!(angle_to_pulse_width(181), MAX_PULSE_WIDTH);
        assert_eq!(angle_to_pulse_width(u16::MAX), MAX_PULSE_WIDTH);
    }

    #[test]
    fn every_angle_round_trips() {
        for degrees in 0..=MAX_ANGLE {
            assert_eq!(pulse_width_to_angle(angle_to_pulse_width(degrees)), degrees);
        }
    }

    #[test]
    fn widths_clamp_into_range() {
        assert_eq!(clamp_pulse_width(0), MIN_PULSE_WIDTH);
        assert_eq!(clamp_pulse_width(543), MIN_PULSE_WIDTH);
        assert_eq!(clamp_pulse_width(544), 544);
        assert_eq!(clamp_pulse_width(2_400), 2_400);
        assert_eq!(clamp_pulse_width(2_401), MAX_PULSE_WIDTH);
        assert_eq!(clamp_pulse_width(u16::MAX), MAX_PULSE_WIDTH);
    }

    #[test]
    fn out_of_range_widths_read_as_end_angles() {
        assert_eq!(pulse_width_to_angle(0), 0);
        assert_eq!(pulse_width_to_angle(u16::MAX), MAX_ANGLE);
    }
}
