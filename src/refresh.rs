//! An embassy-driven [`PeriodicTrigger`] for boards that run an async executor.
//!
//! The trigger half is a plain handle that signals commands; the ticking half is
//! [`refresh_loop`], which the application spawns as a task:
//!
//! ```rust,ignore
//! static REFRESH: RefreshStatic = RefreshStatic::new_static();
//! static SERVOS: Servos<Board> = Servos::new(Board::new(RefreshTrigger::new(&REFRESH)));
//!
//! #[embassy_executor::task]
//! async fn refresh_task() -> ! {
//!     refresh_loop(&REFRESH, || SERVOS.on_tick()).await
//! }
//! ```

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

use crate::platform::PeriodicTrigger;

/// Command sent from the trigger handle to [`refresh_loop`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefreshCommand {
    /// Tick every `Duration` until told otherwise.
    Start(Duration),
    /// Stop ticking.
    Stop,
}

/// Static resources for [`refresh_loop`].
pub struct RefreshStatic {
    command: Signal<CriticalSectionRawMutex, RefreshCommand>,
}

impl RefreshStatic {
    /// Create static resources for the refresh loop.
    #[must_use]
    pub const fn new_static() -> Self {
        Self {
            command: Signal::new(),
        }
    }

    fn signal(&self, command: RefreshCommand) {
        self.command.signal(command);
    }

    async fn wait(&self) -> RefreshCommand {
        self.command.wait().await
    }
}

/// Handle implementing [`PeriodicTrigger`] by signalling a [`refresh_loop`] task.
///
/// Only the latest command is kept, so a start immediately followed by a stop leaves the
/// loop stopped.
#[derive(Clone, Copy)]
pub struct RefreshTrigger {
    refresh_static: &'static RefreshStatic,
}

impl RefreshTrigger {
    /// A trigger bound to `refresh_static`.
    #[must_use]
    pub const fn new(refresh_static: &'static RefreshStatic) -> Self {
        Self { refresh_static }
    }
}

impl PeriodicTrigger for RefreshTrigger {
    fn start(&mut self, interval: Duration) {
        self.refresh_static.signal(RefreshCommand::Start(interval));
    }

    fn stop(&mut self) {
        self.refresh_static.signal(RefreshCommand::Stop);
    }
}

/// Call `on_tick` every started interval, forever.
///
/// Waits for the first [`RefreshCommand::Start`]. A new command replaces the running one
/// at once; a repeated `Start` restarts the ticker phase.
pub async fn refresh_loop<F: FnMut()>(refresh_static: &'static RefreshStatic, mut on_tick: F) -> ! {
    let mut command = refresh_static.wait().await;
    loop {
        command = match command {
            RefreshCommand::Stop => refresh_static.wait().await,
            RefreshCommand::Start(interval) => {
                let mut ticker = Ticker::every(interval);
                loop {
                    match select(ticker.next(), refresh_static.wait()).await {
                        Either::First(()) => on_tick(),
                        Either::Second(next) => break next,
                    }
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static REFRESH: RefreshStatic = RefreshStatic::new_static();

    #[test]
    fn trigger_keeps_only_latest_command() {
        let mut trigger = RefreshTrigger::new(&REFRESH);

        trigger.start(Duration::from_millis(10));
        assert_eq!(
            REFRESH.command.try_take(),
            Some(RefreshCommand::Start(Duration::from_millis(10)))
        );

        trigger.start(Duration::from_millis(10));
        trigger.stop();
        assert_eq!(REFRESH.command.try_take(), Some(RefreshCommand::Stop));
        assert_eq!(REFRESH.command.try_take(), None);
    }
}
