//! Cooperative dispatch loop
//!
//! One iteration services at most one pending duty, highest priority first,
//! and re-evaluates sleep eligibility afterwards. When nothing is pending the
//! loop puts the CPU into the deepest sleep mode the running peripherals allow.

use super::task::{Task, TaskFlags};
use crate::hal::power::SleepMode;

/// Hardware facts the dispatch loop needs to choose a sleep mode.
pub trait Platform {
    /// An asynchronous Timer2 register write has not reached the timer
    /// domain yet; sleeping now would corrupt it.
    fn timer_update_pending(&self) -> bool;

    /// A peripheral clocked from the CPU clock (motor PWM, UART) is running.
    fn needs_fast_clock(&self) -> bool;

    /// An analog conversion should run during sleep.
    fn needs_adc(&self) -> bool;

    /// Sleep in `mode` until the next interrupt. Implementations re-check
    /// `flags` with interrupts disabled and return at once if a duty was
    /// raised in between.
    fn sleep(&mut self, mode: SleepMode, flags: &TaskFlags);
}

/// Handlers for each duty.
pub trait Duties {
    fn service(&mut self, task: Task, flags: &TaskFlags);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Iteration {
    Serviced(Task),
    Slept(SleepMode),
    /// Nothing pending but sleeping is not safe yet
    Busy,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub serviced: u16,
    pub sleeps: u16,
    pub busy: u16,
}

pub struct Dispatcher<'a> {
    flags: &'a TaskFlags,
    stats: Stats,
}

impl<'a> Dispatcher<'a> {
    pub const fn new(flags: &'a TaskFlags) -> Self {
        Self {
            flags,
            stats: Stats {
                serviced: 0,
                sleeps: 0,
                busy: 0,
            },
        }
    }

    pub fn run_once<P: Platform, D: Duties>(&mut self, platform: &mut P, duties: &mut D) -> Iteration {
        if let Some(task) = self.flags.take_next() {
            duties.service(task, self.flags);
            self.stats.serviced = self.stats.serviced.wrapping_add(1);
            return Iteration::Serviced(task);
        }

        if platform.timer_update_pending() {
            self.stats.busy = self.stats.busy.wrapping_add(1);
            return Iteration::Busy;
        }

        let mode = SleepMode::select(platform.needs_fast_clock(), platform.needs_adc());
        platform.sleep(mode, self.flags);
        self.stats.sleeps = self.stats.sleeps.wrapping_add(1);
        Iteration::Slept(mode)
    }

    pub fn run<P: Platform, D: Duties>(&mut self, platform: &mut P, duties: &mut D) -> ! {
        loop {
            self.run_once(platform, duties);
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePlatform {
        update_pending: bool,
        fast_clock: bool,
        adc: bool,
        sleeps: Vec<SleepMode>,
    }

    impl Platform for FakePlatform {
        fn timer_update_pending(&self) -> bool {
            self.update_pending
        }

        fn needs_fast_clock(&self) -> bool {
            self.fast_clock
        }

        fn needs_adc(&self) -> bool {
            self.adc
        }

        fn sleep(&mut self, mode: SleepMode, flags: &TaskFlags) {
            assert!(flags.is_empty(), "slept with a duty pending");
            self.sleeps.push(mode);
        }
    }

    #[derive(Default)]
    struct Recorder {
        serviced: Vec<Task>,
        raise_on_keyboard: Option<Task>,
    }

    impl Duties for Recorder {
        fn service(&mut self, task: Task, flags: &TaskFlags) {
            self.serviced.push(task);
            if task == Task::Keyboard {
                if let Some(follow_up) = self.raise_on_keyboard.take() {
                    flags.raise(follow_up);
                }
            }
        }
    }

    #[test]
    fn one_duty_per_iteration() {
        let flags = TaskFlags::new();
        let mut dispatcher = Dispatcher::new(&flags);
        let mut platform = FakePlatform::default();
        let mut duties = Recorder::default();

        flags.raise(Task::Clock);
        flags.raise(Task::Radio);
        flags.raise(Task::MotorPulse);

        assert_eq!(dispatcher.run_once(&mut platform, &mut duties), Iteration::Serviced(Task::Radio));
        assert_eq!(duties.serviced.len(), 1);
        assert_eq!(dispatcher.run_once(&mut platform, &mut duties), Iteration::Serviced(Task::Clock));
        assert_eq!(dispatcher.run_once(&mut platform, &mut duties), Iteration::Serviced(Task::MotorPulse));
        assert!(platform.sleeps.is_empty());

        assert_eq!(
            dispatcher.run_once(&mut platform, &mut duties),
            Iteration::Slept(SleepMode::PowerSave)
        );
        assert_eq!(dispatcher.stats().serviced, 3);
        assert_eq!(dispatcher.stats().sleeps, 1);
    }

    #[test]
    fn flag_raised_during_service_prevents_sleep() {
        let flags = TaskFlags::new();
        let mut dispatcher = Dispatcher::new(&flags);
        let mut platform = FakePlatform::default();
        let mut duties = Recorder {
            raise_on_keyboard: Some(Task::Display),
            ..Recorder::default()
        };

        flags.raise(Task::Keyboard);
        dispatcher.run_once(&mut platform, &mut duties);
        assert_eq!(
            dispatcher.run_once(&mut platform, &mut duties),
            Iteration::Serviced(Task::Display)
        );
        assert!(platform.sleeps.is_empty());
    }

    #[test]
    fn pending_timer_write_blocks_sleep() {
        let flags = TaskFlags::new();
        let mut dispatcher = Dispatcher::new(&flags);
        let mut platform = FakePlatform {
            update_pending: true,
            ..FakePlatform::default()
        };
        let mut duties = Recorder::default();

        assert_eq!(dispatcher.run_once(&mut platform, &mut duties), Iteration::Busy);
        platform.update_pending = false;
        platform.adc = true;
        assert_eq!(
            dispatcher.run_once(&mut platform, &mut duties),
            Iteration::Slept(SleepMode::AdcNoiseReduction)
        );
        platform.fast_clock = true;
        assert_eq!(
            dispatcher.run_once(&mut platform, &mut duties),
            Iteration::Slept(SleepMode::Idle)
        );
    }
}
