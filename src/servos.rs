//! The servo context: channel registry, host collaborators and pulse generator together.
//!
//! # Sharing between contexts
//!
//! [`Channel`] calls (`attach`, `detach`, `write`) run in normal context. The periodic
//! tick ([`Servos::on_tick`]) and the timeslot callback ([`Servos::on_signal`]) run in
//! interrupt context. Both sides reach the registry through an `embassy-sync` blocking mutex
//! over [`CriticalSectionRawMutex`]:
//!
//! - every registry mutation happens inside one short critical section;
//! - at slot start the callback copies at most [`MAX_CHANNELS`](crate::registry::MAX_CHANNELS)
//!   `(pin, width)` pairs inside a
//!   critical section, then releases it before the first busy-wait.
//!
//! So a slot always sees a registry state from before or after a mutation, never in between,
//! and the callback never waits on a lock: while normal context holds the critical section the
//! callback simply has not been dispatched yet.
//!
//! Host collaborator methods ([`OutputPins::configure_output`], [`TimeslotSession`],
//! [`PeriodicTrigger`]) are called inside a critical section too and must not block.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use portable_atomic::{AtomicU32, Ordering};

use crate::Result;
use crate::channel::Channel;
use crate::generator::{GeneratorState, GeneratorStats, PulseGenerator};
use crate::platform::{OutputPins, PeriodicTrigger, Pin};
use crate::pulse::Snapshot;
use crate::registry::{ChannelKey, Registry};
use crate::timeslot::{SlotAction, SlotSignal, TimeslotRequest, TimeslotSession};

/// Cadence of timeslot requests.
pub const REFRESH_INTERVAL: Duration = Duration::from_micros(10_000);

/// Everything the generator needs from the platform in normal context.
///
/// Implemented automatically for any type providing the three collaborator traits.
pub trait ServoHost: OutputPins + TimeslotSession + PeriodicTrigger {}

impl<T: OutputPins + TimeslotSession + PeriodicTrigger> ServoHost for T {}

struct HostState<H> {
    host: H,
    running: bool,
}

/// Registry, host collaborators and pulse generator for one set of servos.
///
/// `Servos::new` is `const`, so the context can live in a `static` and be reached from the
/// timer and timeslot interrupt handlers.
pub struct Servos<H: ServoHost> {
    registry: Mutex<CriticalSectionRawMutex, RefCell<Registry>>,
    host: Mutex<CriticalSectionRawMutex, RefCell<HostState<H>>>,
    generator: PulseGenerator,
    next_key: AtomicU32,
}

impl<H: ServoHost> Servos<H> {
    /// Create a context with no channels attached and the generator stopped.
    #[must_use]
    pub const fn new(host: H) -> Self {
        Self {
            registry: Mutex::new(RefCell::new(Registry::new())),
            host: Mutex::new(RefCell::new(HostState {
                host,
                running: false,
            })),
            generator: PulseGenerator::new(),
            next_key: AtomicU32::new(0),
        }
    }

    /// A new detached channel bound to this context.
    pub fn channel(&self) -> Channel<'_, H> {
        let key = ChannelKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        Channel::new(self, key)
    }

    /// Number of attached channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock(|registry| registry.borrow().len())
    }

    /// Whether no channel is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the refresh cycle (session plus trigger) is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.host.lock(|state| state.borrow().running)
    }

    /// State of the timeslot callback.
    #[must_use]
    pub fn generator_state(&self) -> GeneratorState {
        self.generator.state()
    }

    /// Generator counters.
    #[must_use]
    pub fn stats(&self) -> GeneratorStats {
        self.generator.stats()
    }

    /// Copy of the `(pin, width)` pairs the next slot would drive.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.registry.lock(|registry| registry.borrow().snapshot())
    }

    /// Run `f` with exclusive access to the host collaborators.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        self.host.lock(|state| f(&mut state.borrow_mut().host))
    }

    /// Periodic trigger entry point: ask the host for the next timeslot.
    ///
    /// Ticks arriving while the generator is stopped are ignored. A refused request is a
    /// missed refresh; the next tick tries again.
    pub fn on_tick(&self) {
        self.host.lock(|state| {
            let mut state = state.borrow_mut();
            if state.running {
                request_slot(&mut state.host);
            }
        });
    }

    /// Timeslot callback entry point. Call it from the host stack's timeslot handler and
    /// return the [`SlotAction`] to the host.
    ///
    /// `pins` and `delay` must be usable from that handler's context.
    pub fn on_signal<P, D>(&self, signal: SlotSignal, pins: &mut P, delay: &mut D) -> SlotAction
    where
        P: OutputPins + ?Sized,
        D: DelayNs + ?Sized,
    {
        self.generator
            .on_signal(signal, || self.snapshot(), pins, delay)
    }

    pub(crate) fn attach(&self, key: ChannelKey, pin: Pin, pulse_width: u16) -> Result<u8> {
        self.host.lock(|state| {
            let mut state = state.borrow_mut();
            let attached = self
                .registry
                .lock(|registry| registry.borrow_mut().attach(key, pin, pulse_width))?;
            state.host.configure_output(pin);
            if attached.first {
                start(&mut state);
            }
            Ok(attached.index)
        })
    }

    pub(crate) fn detach(&self, key: ChannelKey) -> Result<()> {
        self.host.lock(|state| {
            let mut state = state.borrow_mut();
            let detached = self
                .registry
                .lock(|registry| registry.borrow_mut().detach(key))?;
            if detached.last {
                stop(&mut state);
            }
            Ok(())
        })
    }

    pub(crate) fn publish(&self, key: ChannelKey, pulse_width: u16) {
        self.registry.lock(|registry| {
            registry.borrow_mut().set_pulse_width(key, pulse_width);
        });
    }

    pub(crate) fn index_of(&self, key: ChannelKey) -> Option<u8> {
        self.registry.lock(|registry| registry.borrow().index_of(key))
    }
}

fn start<H: ServoHost>(state: &mut HostState<H>) {
    if state.running {
        return;
    }
    info!("servo generator starting");
    if let Err(err) = state.host.open() {
        warn!("timeslot session open failed: {}", err);
    }
    request_slot(&mut state.host);
    state.host.start(REFRESH_INTERVAL);
    state.running = true;
}

fn stop<H: ServoHost>(state: &mut HostState<H>) {
    if !state.running {
        return;
    }
    info!("servo generator stopping");
    state.host.stop();
    if let Err(err) = state.host.close() {
        warn!("timeslot session close failed: {}", err);
    }
    state.running = false;
}

fn request_slot<H: ServoHost>(host: &mut H) {
    if let Err(err) = host.request(&TimeslotRequest::servo_refresh()) {
        warn!("timeslot request refused: {}", err);
    }
}
