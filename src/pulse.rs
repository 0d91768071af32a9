//! The pulse train: every pin rises together, each falls at its own width.
//!
//! [`plan`] is pure: it turns a snapshot of `(pin, width)` pairs into an ordered list of
//! edges. [`run`] performs a plan with busy-waits between edges. Splitting the two lets the
//! timing be checked on the host without a clock.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::channel::clamp_pulse_width;
use crate::platform::{OutputPins, Pin, PinState};
use crate::registry::MAX_CHANNELS;

/// Pin and pulse width of one channel, copied out of the registry at slot start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelPulse {
    /// Output pin.
    pub pin: Pin,
    /// Time the pin stays high, in microseconds.
    pub width_us: u16,
}

/// Registry contents captured for one slot.
pub type Snapshot = Vec<ChannelPulse, MAX_CHANNELS>;

/// One level change, `offset_us` after the slot started.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PulseEdge {
    /// Offset from the first rising edge.
    pub offset_us: u16,
    /// Pin to drive.
    pub pin: Pin,
    /// Level to drive it to.
    pub level: PinState,
}

/// Edges of one pulse train, sorted by offset.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PulsePlan {
    edges: Vec<PulseEdge, { 2 * MAX_CHANNELS }>,
}

impl PulsePlan {
    /// All edges, rising ones first.
    #[must_use]
    pub fn edges(&self) -> &[PulseEdge] {
        &self.edges
    }

    /// Whether the plan drives nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Offset of the last falling edge, which is also the total busy-wait time.
    #[must_use]
    pub fn duration_us(&self) -> u16 {
        self.edges.last().map_or(0, |edge| edge.offset_us)
    }

    fn push(&mut self, offset_us: u16, pin: Pin, level: PinState) {
        let pushed = self.edges.push(PulseEdge {
            offset_us,
            pin,
            level,
        });
        debug_assert!(pushed.is_ok(), "a plan holds two edges per channel");
    }
}

/// Build the edge list for `channels`.
///
/// All pins rise at offset 0. Then, starting from the smallest width, every channel whose
/// width has been reached falls, and the next target is the smallest width still pending.
/// Channels sharing a width fall at the same offset. Widths are clamped into the servo pulse
/// range first, so a plan never runs past
/// [`MAX_PULSE_WIDTH`](crate::channel::MAX_PULSE_WIDTH). Only the first
/// [`MAX_CHANNELS`] entries are used.
#[must_use]
pub fn plan(channels: &[ChannelPulse]) -> PulsePlan {
    let channels = channels.get(..MAX_CHANNELS).unwrap_or(channels);
    let mut plan = PulsePlan::default();

    let mut widths = [0_u16; MAX_CHANNELS];
    for (width, channel) in widths.iter_mut().zip(channels) {
        *width = clamp_pulse_width(channel.width_us);
        plan.push(0, channel.pin, PinState::High);
    }
    let widths = widths.get(..channels.len()).unwrap_or_default();

    let Some(mut tick) = widths.iter().copied().min() else {
        return plan;
    };

    let mut lowered = [false; MAX_CHANNELS];
    loop {
        let mut next: Option<u16> = None;
        for ((channel, &width), done) in channels.iter().zip(widths).zip(lowered.iter_mut()) {
            if *done {
                continue;
            }
            if width <= tick {
                plan.push(tick, channel.pin, PinState::Low);
                *done = true;
            } else {
                next = Some(next.map_or(width, |n| n.min(width)));
            }
        }
        match next {
            Some(next) => tick = next,
            None => break,
        }
    }
    plan
}

/// How a [`run`] ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulseOutcome {
    /// Every pin was lowered at its offset.
    Completed,
    /// The sequence stopped early; `still_high` pins were left high.
    Aborted {
        /// Pins raised but not lowered.
        still_high: u8,
    },
}

/// Drive `plan` onto `pins`, busy-waiting on `delay` between distinct offsets.
///
/// `should_abort` is polled after each wait. When it returns `true` the remaining edges are
/// skipped, so any pin still high stays high until the next slot re-drives it.
pub fn run<P, D>(
    plan: &PulsePlan,
    pins: &mut P,
    delay: &mut D,
    mut should_abort: impl FnMut() -> bool,
) -> PulseOutcome
where
    P: OutputPins + ?Sized,
    D: DelayNs + ?Sized,
{
    let mut now_us: u16 = 0;
    let mut high: u8 = 0;
    for edge in plan.edges() {
        if edge.offset_us > now_us {
            delay.delay_us(u32::from(edge.offset_us - now_us));
            now_us = edge.offset_us;
            if should_abort() {
                return PulseOutcome::Aborted { still_high: high };
            }
        }
        pins.set_level(edge.pin, edge.level);
        match edge.level {
            PinState::High => high = high.saturating_add(1),
            PinState::Low => high = high.saturating_sub(1),
        }
    }
    PulseOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(pin: u32, width_us: u16) -> ChannelPulse {
        ChannelPulse {
            pin: Pin(pin),
            width_us,
        }
    }

    fn falls(plan: &PulsePlan) -> std::vec::Vec<(u16, u32)> {
        plan.edges()
            .iter()
            .filter(|edge| edge.level == PinState::Low)
            .map(|edge| (edge.offset_us, edge.pin.0))
            .collect()
    }

    #[test]
    fn empty_snapshot_plans_nothing() {
        let plan = plan(&[]);
        assert!(plan.is_empty());
        assert_eq!(plan.duration_us(), 0);
    }

    #[test]
    fn all_pins_rise_first() {
        let plan = plan(&[pulse(1, 2000), pulse(2, 1000), pulse(3, 1500)]);
        let rises: std::vec::Vec<_> = plan.edges().iter().take(3).collect();
        assert!(
            rises
                .iter()
                .all(|edge| edge.offset_us == 0 && edge.level == PinState::High)
        );
        assert_eq!(plan.edges().len(), 6);
    }

    #[test]
    fn pins_fall_in_width_order_from_unordered_input() {
        let plan = plan(&[pulse(1, 2000), pulse(2, 1000), pulse(3, 1500)]);
        assert_eq!(falls(&plan), [(1000, 2), (1500, 3), (2000, 1)]);
        assert_eq!(plan.duration_us(), 2000);
    }

    #[test]
    fn equal_widths_fall_together() {
        let plan = plan(&[pulse(1, 1200), pulse(2, 800), pulse(3, 1200)]);
        assert_eq!(falls(&plan), [(800, 2), (1200, 1), (1200, 3)]);
    }

    #[test]
    fn duration_never_exceeds_longest_width() {
        let widths = [544, 2400, 1500, 544, 2399, 600, 1000, 1001, 2000, 700];
        let snapshot: std::vec::Vec<_> = widths
            .iter()
            .zip(0..)
            .map(|(&width, pin)| pulse(pin, width))
            .collect();
        let plan = plan(&snapshot);
        assert_eq!(plan.duration_us(), 2400);
        let offsets: std::vec::Vec<_> = falls(&plan).iter().map(|&(offset, _)| offset).collect();
        assert!(offsets.is_sorted());
        assert_eq!(offsets.len(), widths.len());
    }

    #[test]
    fn out_of_range_widths_are_clamped() {
        let plan = plan(&[pulse(1, 0), pulse(2, u16::MAX)]);
        assert_eq!(falls(&plan), [(544, 1), (2400, 2)]);
        assert_eq!(plan.duration_us(), 2400);
    }

    #[test]
    fn extra_channels_are_ignored() {
        let snapshot: std::vec::Vec<_> = (0..12).map(|pin| pulse(pin, 1500)).collect();
        let plan = plan(&snapshot);
        assert_eq!(plan.edges().len(), 2 * MAX_CHANNELS);
    }

    struct Recorder<'a> {
        now: &'a core::cell::Cell<u32>,
        log: std::vec::Vec<(u32, u32, PinState)>,
    }

    impl OutputPins for Recorder<'_> {
        fn configure_output(&mut self, _pin: Pin) {}

        fn set_level(&mut self, pin: Pin, level: PinState) {
            self.log.push((self.now.get(), pin.0, level));
        }
    }

    struct Clock<'a>(&'a core::cell::Cell<u32>);

    impl DelayNs for Clock<'_> {
        fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + ns / 1_000);
        }
    }

    #[test]
    fn run_waits_only_between_distinct_offsets() {
        let now = core::cell::Cell::new(0);
        let mut delay = Clock(&now);
        let mut pins = Recorder {
            now: &now,
            log: std::vec::Vec::new(),
        };
        let plan = plan(&[pulse(1, 1000), pulse(2, 1000)]);

        let outcome = run(&plan, &mut pins, &mut delay, || false);
        assert_eq!(outcome, PulseOutcome::Completed);
        assert_eq!(now.get(), 1000);
        assert_eq!(
            pins.log,
            [
                (0, 1, PinState::High),
                (0, 2, PinState::High),
                (1000, 1, PinState::Low),
                (1000, 2, PinState::Low),
            ]
        );
    }

    #[test]
    fn abort_leaves_remaining_pins_high() {
        let now = core::cell::Cell::new(0);
        let mut delay = Clock(&now);
        let mut pins = Recorder {
            now: &now,
            log: std::vec::Vec::new(),
        };
        let plan = plan(&[pulse(1, 1000), pulse(2, 1500), pulse(3, 2000)]);

        let outcome = run(&plan, &mut pins, &mut delay, || now.get() >= 1500);
        assert_eq!(outcome, PulseOutcome::Aborted { still_high: 2 });
        let lowered = pins
            .log
            .iter()
            .filter(|(_, _, level)| *level == PinState::Low)
            .count();
        assert_eq!(lowered, 1);
    }
}
