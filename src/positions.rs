//! Servo control payloads as exchanged with a BLE central.
//!
//! The robot exposes a servo control service with two characteristics:
//!
//! - **positions** (`0x5200`): one unsigned angle byte per servo, in channel order;
//! - **offsets** (`0x5201`): one signed trim byte per servo, in degrees, added to every
//!   position before it is written.
//!
//! Payloads shorter than the channel list leave the remaining channels alone; bytes beyond
//! it are ignored.

use heapless::Vec;

use crate::channel::{Channel, MAX_ANGLE};
use crate::registry::MAX_CHANNELS;
use crate::servos::ServoHost;

/// GATT service grouping the servo characteristics.
pub const SERVO_SERVICE_UUID: u16 = 0x5100;

/// GATT characteristic carrying servo positions.
pub const POSITIONS_CHARACTERISTIC_UUID: u16 = 0x5200;

/// GATT characteristic carrying servo trims.
pub const OFFSETS_CHARACTERISTIC_UUID: u16 = 0x5201;

/// Per-channel trim in degrees.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoOffsets {
    trims: [i8; MAX_CHANNELS],
}

impl ServoOffsets {
    /// All trims zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trims: [0; MAX_CHANNELS],
        }
    }

    /// Decode an offsets payload. Channels without a byte get no trim.
    #[must_use]
    pub fn from_bytes(payload: &[u8]) -> Self {
        let mut offsets = Self::new();
        offsets.update(payload);
        offsets
    }

    /// Overwrite the trims covered by `payload`, keeping the rest.
    pub fn update(&mut self, payload: &[u8]) {
        for (trim, &byte) in self.trims.iter_mut().zip(payload) {
            *trim = i8::from_ne_bytes([byte]);
        }
    }

    /// Trim of channel `index`, zero when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> i8 {
        self.trims.get(index).copied().unwrap_or(0)
    }

    /// Encode the first `len` trims as an offsets payload.
    #[must_use]
    pub fn to_bytes(&self, len: usize) -> Vec<u8, MAX_CHANNELS> {
        self.trims
            .iter()
            .take(len)
            .map(|trim| {
                let [byte] = trim.to_ne_bytes();
                byte
            })
            .collect()
    }

    /// `angle` trimmed for channel `index`, saturated into `0..=180`.
    #[must_use]
    pub fn trimmed(&self, index: usize, angle: u8) -> u16 {
        let trimmed = i16::from(angle).saturating_add(i16::from(self.get(index)));
        u16::try_from(trimmed).map_or(0, |degrees| degrees.min(MAX_ANGLE))
    }

    /// Inverse of [`trimmed`](Self::trimmed), saturated into `0..=180`.
    #[must_use]
    pub fn untrimmed(&self, index: usize, degrees: u16) -> u8 {
        let degrees = i16::try_from(degrees.min(MAX_ANGLE)).unwrap_or(0);
        let raw = degrees.saturating_sub(i16::from(self.get(index)));
        u8::try_from(raw.clamp(0, 180)).unwrap_or(0)
    }
}

/// Write a positions payload to `channels`. Returns how many channels were written.
pub fn apply_positions<H: ServoHost>(
    channels: &mut [Channel<'_, H>],
    payload: &[u8],
    offsets: &ServoOffsets,
) -> usize {
    let written = channels.len().min(payload.len());
    for (index, (channel, &angle)) in channels.iter_mut().zip(payload).enumerate() {
        channel.write(offsets.trimmed(index, angle));
    }
    debug!("applied {} servo positions", written);
    written
}

/// Encode the current positions of `channels` as a positions payload, trims removed.
#[must_use]
pub fn read_positions<H: ServoHost>(
    channels: &[Channel<'_, H>],
    offsets: &ServoOffsets,
) -> Vec<u8, MAX_CHANNELS> {
    channels
        .iter()
        .take(MAX_CHANNELS)
        .enumerate()
        .map(|(index, channel)| offsets.untrimmed(index, channel.read()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use crate::platform::Pin;
    use crate::servos::Servos;

    #[test]
    fn offsets_decode_as_signed_trims() {
        let offsets = ServoOffsets::from_bytes(&[0x05, 0xFB]);
        assert_eq!(offsets.get(0), 5);
        assert_eq!(offsets.get(1), -5);
        assert_eq!(offsets.get(2), 0);
        assert_eq!(offsets.get(MAX_CHANNELS), 0);
        assert_eq!(offsets.to_bytes(3).as_slice(), &[0x05, 0xFB, 0x00]);
    }

    #[test]
    fn update_keeps_uncovered_trims() {
        let mut offsets = ServoOffsets::from_bytes(&[1, 2, 3]);
        offsets.update(&[9]);
        assert_eq!(offsets.to_bytes(3).as_slice(), &[9, 2, 3]);
    }

    #[test]
    fn trims_saturate_into_angle_range() {
        let offsets = ServoOffsets::from_bytes(&[0x0A, 0xF6]);
        assert_eq!(offsets.trimmed(0, 90), 100);
        assert_eq!(offsets.trimmed(0, 175), 180);
        assert_eq!(offsets.trimmed(1, 5), 0);
        assert_eq!(offsets.trimmed(1, 255), 180);
        assert_eq!(offsets.untrimmed(0, 100), 90);
        assert_eq!(offsets.untrimmed(1, 175), 180);
    }

    #[test]
    fn positions_write_channels_in_order() {
        let servos = Servos::new(MockHost::default());
        let mut channels = [servos.channel(), servos.channel(), servos.channel()];
        for (channel, pin) in channels.iter_mut().zip([2, 28, 29]) {
            channel.attach(Pin(pin));
        }
        let offsets = ServoOffsets::from_bytes(&[0, 0x0A]);

        assert_eq!(apply_positions(&mut channels, &[110, 94], &offsets), 2);

        let [first, second, third] = &channels;
        assert_eq!(first.read(), 110);
        assert_eq!(second.read(), 104);
        assert_eq!(third.read_microseconds(), 1_500);
        assert_eq!(
            read_positions(&channels, &offsets).as_slice(),
            &[110, 94, 93]
        );
    }

    #[test]
    fn extra_position_bytes_are_ignored() {
        let servos = Servos::new(MockHost::default());
        let mut channels = [servos.channel()];
        assert_eq!(
            apply_positions(&mut channels, &[0, 90, 180], &ServoOffsets::new()),
            1
        );
        let [only] = &channels;
        assert_eq!(only.read(), 0);
    }
}
