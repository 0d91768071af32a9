//! Fixed-capacity, order-preserving set of attached servo channels.
//!
//! Entries are kept compacted: the channel at position `i` has index `i`, and removing an
//! entry shifts every later one down by one. The registry is plain data; the
//! [`Servos`](crate::servos::Servos) context wraps it in a critical-section mutex and turns
//! the reported first/last transitions into generator start/stop.

use heapless::Vec;

use crate::platform::Pin;
use crate::pulse::{ChannelPulse, Snapshot};
use crate::{Error, Result};

/// Maximum number of channels the generator drives in one timeslot.
pub const MAX_CHANNELS: usize = 10;

/// Stable identity of a [`Channel`](crate::channel::Channel), independent of its slot position.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelKey(pub(crate) u32);

/// One attached channel as seen by the generator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Entry {
    /// Owner of the entry.
    pub key: ChannelKey,
    /// Output pin.
    pub pin: Pin,
    /// Current pulse width in microseconds.
    pub pulse_width: u16,
}

/// Result of a successful [`Registry::attach`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Attached {
    /// Slot the channel now occupies.
    pub index: u8,
    /// `true` when the registry was empty before this attach.
    pub first: bool,
}

/// Result of a successful [`Registry::detach`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Detached {
    /// Slot the channel occupied before removal.
    pub index: u8,
    /// `true` when the registry is empty after this detach.
    pub last: bool,
}

/// The ordered set of attached channels.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry, MAX_CHANNELS>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of attached channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no channel is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every slot is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Attached entries in index order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Current slot of `key`, if attached.
    #[must_use]
    pub fn index_of(&self, key: ChannelKey) -> Option<u8> {
        self.position(key).and_then(|position| u8::try_from(position).ok())
    }

    /// Append a channel at the next free index.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyAttached`] if `key` is present, [`Error::RegistryFull`] if every slot is
    /// taken. The registry is unchanged in both cases.
    pub fn attach(&mut self, key: ChannelKey, pin: Pin, pulse_width: u16) -> Result<Attached> {
        if self.position(key).is_some() {
            return Err(Error::AlreadyAttached);
        }
        let first = self.entries.is_empty();
        let index = u8::try_from(self.entries.len()).map_err(|_| Error::RegistryFull)?;
        self.entries
            .push(Entry {
                key,
                pin,
                pulse_width,
            })
            .map_err(|_| Error::RegistryFull)?;
        Ok(Attached { index, first })
    }

    /// Remove a channel and shift every later entry down by one.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`] if `key` is not present.
    pub fn detach(&mut self, key: ChannelKey) -> Result<Detached> {
        let position = self.position(key).ok_or(Error::NotAttached)?;
        self.entries.remove(position);
        Ok(Detached {
            index: u8::try_from(position).map_err(|_| Error::NotAttached)?,
            last: self.entries.is_empty(),
        })
    }

    /// Replace the pulse width of an attached channel. Returns `false` if `key` is absent.
    pub fn set_pulse_width(&mut self, key: ChannelKey, pulse_width: u16) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.pulse_width = pulse_width;
                true
            }
            None => false,
        }
    }

    /// Copy of every attached `(pin, width)` pair, in index order.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.entries
            .iter()
            .map(|entry| ChannelPulse {
                pin: entry.pin,
                width_us: entry.pulse_width,
            })
            .collect()
    }

    fn position(&self, key: ChannelKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u32) -> ChannelKey {
        ChannelKey(id)
    }

    #[test]
    fn attach_assigns_contiguous_indices() {
        let mut registry = Registry::new();
        let a = registry.attach(key(1), Pin(2), 1500);
        let b = registry.attach(key(2), Pin(28), 1500);
        assert_eq!(a, Ok(Attached { index: 0, first: true }));
        assert_eq!(b, Ok(Attached { index: 1, first: false }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn attach_twice_is_refused() {
        let mut registry = Registry::new();
        assert!(registry.attach(key(1), Pin(2), 1500).is_ok());
        assert_eq!(
            registry.attach(key(1), Pin(3), 1500),
            Err(Error::AlreadyAttached)
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries().first().map(|entry| entry.pin), Some(Pin(2)));
    }

    #[test]
    fn eleventh_attach_is_refused() {
        let mut registry = Registry::new();
        for id in 0..10 {
            assert!(registry.attach(key(id), Pin(id), 1500).is_ok());
        }
        assert!(registry.is_full());
        assert_eq!(
            registry.attach(key(10), Pin(10), 1500),
            Err(Error::RegistryFull)
        );
        assert_eq!(registry.len(), MAX_CHANNELS);
    }

    #[test]
    fn detach_compacts_later_entries() {
        let mut registry = Registry::new();
        for id in 0..3 {
            assert!(registry.attach(key(id), Pin(id), 1500).is_ok());
        }
        assert_eq!(
            registry.detach(key(1)),
            Ok(Detached {
                index: 1,
                last: false
            })
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.index_of(key(0)), Some(0));
        assert_eq!(registry.index_of(key(1)), None);
        assert_eq!(registry.index_of(key(2)), Some(1));
    }

    #[test]
    fn detach_last_reports_empty() {
        let mut registry = Registry::new();
        assert!(registry.attach(key(7), Pin(7), 1500).is_ok());
        assert_eq!(
            registry.detach(key(7)),
            Ok(Detached {
                index: 0,
                last: true
            })
        );
        assert_eq!(registry.detach(key(7)), Err(Error::NotAttached));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_follows_published_widths() {
        let mut registry = Registry::new();
        assert!(registry.attach(key(0), Pin(4), 1500).is_ok());
        assert!(registry.attach(key(1), Pin(5), 1500).is_ok());
        assert!(registry.set_pulse_width(key(1), 900));
        assert!(!registry.set_pulse_width(key(9), 900));

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.as_slice(),
            &[
                ChannelPulse {
                    pin: Pin(4),
                    width_us: 1500
                },
                ChannelPulse {
                    pin: Pin(5),
                    width_us: 900
                },
            ]
        );
    }
}
