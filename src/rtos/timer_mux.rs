//! Software timers multiplexed onto one free-running hardware counter
//!
//! Timer2 counts the 32.768 kHz watch crystal divided by 128 and wraps every
//! 256 ticks, i.e. once per second. Every deadline is an absolute counter
//! value; expiry is decided with modular subtraction at the counter width,
//! `(now - armed_at) >= delay`, so deadlines spanning the wrap work the same
//! as any other.
//!
//! The one-second clock is the counter overflow itself. Its next deadline is
//! always the previous one plus a full revolution, so it cannot drift with
//! dispatch latency.

use super::task::{Task, TaskFlags};

/// Fixed-width free-running counter value.
pub trait Counter: Copy + Eq + Ord {
    const BITS: u32;
    const ZERO: Self;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn widen(self) -> u32;
}

macro_rules! impl_counter {
    ($($t:ty),*) => {
        $(
            impl Counter for $t {
                const BITS: u32 = <$t>::BITS;
                const ZERO: Self = 0;

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$t>::wrapping_add(self, rhs)
                }

                #[inline]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$t>::wrapping_sub(self, rhs)
                }

                #[inline]
                fn widen(self) -> u32 {
                    self as u32
                }
            }
        )*
    };
}

impl_counter!(u8, u16);

/// Software timers sharing the hardware compare unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerId {
    Keyboard = 0,
    Radio = 1,
    Display = 2,
}

impl TimerId {
    pub const COUNT: usize = 3;
    pub const ALL: [TimerId; Self::COUNT] = [TimerId::Keyboard, TimerId::Radio, TimerId::Display];

    #[inline]
    const fn mask(self) -> u8 {
        1 << self as u8
    }

    /// Duty raised when this timer expires
    pub const fn task(self) -> Task {
        match self {
            TimerId::Keyboard => Task::Keyboard,
            TimerId::Radio => Task::Radio,
            TimerId::Display => Task::Display,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Rearm {
    OneShot,
    Periodic,
}

#[derive(Copy, Clone)]
struct SoftwareTimer<C> {
    armed_at: C,
    delay: C,
    armed: bool,
    rearm: Rearm,
}

impl<C: Counter> SoftwareTimer<C> {
    const IDLE: Self = Self {
        armed_at: C::ZERO,
        delay: C::ZERO,
        armed: false,
        rearm: Rearm::OneShot,
    };

    #[inline]
    fn elapsed(&self, now: C) -> bool {
        now.wrapping_sub(self.armed_at) >= self.delay
    }

    #[inline]
    fn deadline(&self) -> C {
        self.armed_at.wrapping_add(self.delay)
    }
}

pub struct TimerMultiplexer<C: Counter = u8> {
    timers: [SoftwareTimer<C>; TimerId::COUNT],
    done: u8,
    overflows: u32,
    pending_seconds: u8,
}

impl<C: Counter> TimerMultiplexer<C> {
    pub const fn new() -> Self {
        Self {
            timers: [SoftwareTimer::IDLE; TimerId::COUNT],
            done: 0,
            overflows: 0,
            pending_seconds: 0,
        }
    }

    /// Fire `delay` ticks after `now`. Re-arming replaces the previous
    /// deadline and drops an unconsumed expiry.
    pub fn arm(&mut self, id: TimerId, now: C, delay: C) {
        self.timers[id as usize] = SoftwareTimer {
            armed_at: now,
            delay,
            armed: true,
            rearm: Rearm::OneShot,
        };
        self.done &= !id.mask();
    }

    /// Fire when the counter reaches `deadline`.
    pub fn arm_at(&mut self, id: TimerId, now: C, deadline: C) {
        self.arm(id, now, deadline.wrapping_sub(now));
    }

    /// Fire every `period` ticks. Each expiry moves the deadline forward by
    /// exactly one period from the previous deadline, never from the time the
    /// expiry was noticed. A zero period disarms.
    pub fn arm_periodic(&mut self, id: TimerId, now: C, period: C) {
        if period == C::ZERO {
            self.clear(id);
            return;
        }
        self.arm(id, now, period);
        self.timers[id as usize].rearm = Rearm::Periodic;
    }

    /// Disarm and forget any unconsumed expiry.
    pub fn clear(&mut self, id: TimerId) {
        self.timers[id as usize].armed = false;
        self.done &= !id.mask();
    }

    /// Consume an expiry without disarming; used for periodic timers.
    pub fn acknowledge(&mut self, id: TimerId) {
        self.done &= !id.mask();
    }

    #[inline]
    pub fn is_done(&self, id: TimerId) -> bool {
        self.done & id.mask() != 0
    }

    #[inline]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers[id as usize].armed
    }

    /// Check every armed timer against `now`. Returns the mask of timers that
    /// expired during this call.
    pub fn poll(&mut self, now: C) -> u8 {
        let mut expired = 0;
        for id in TimerId::ALL {
            let timer = &mut self.timers[id as usize];
            if !timer.armed || !timer.elapsed(now) {
                continue;
            }
            match timer.rearm {
                Rearm::OneShot => timer.armed = false,
                Rearm::Periodic => timer.armed_at = timer.deadline(),
            }
            expired |= id.mask();
        }
        self.done |= expired;
        expired
    }

    /// Compare-match interrupt body.
    pub fn on_compare(&mut self, now: C, flags: &TaskFlags) {
        let expired = self.poll(now);
        for id in TimerId::ALL {
            if expired & id.mask() != 0 {
                flags.raise(id.task());
            }
        }
    }

    /// Overflow interrupt body: one elapsed second.
    pub fn on_overflow(&mut self, flags: &TaskFlags) {
        self.overflows = self.overflows.wrapping_add(1);
        self.pending_seconds = self.pending_seconds.saturating_add(1);
        flags.raise(Task::Clock);
        self.on_compare(C::ZERO, flags);
    }

    /// Consume one elapsed second. Returns false when none is pending.
    pub fn take_second(&mut self) -> bool {
        if self.pending_seconds == 0 {
            return false;
        }
        self.pending_seconds -= 1;
        true
    }

    #[inline]
    pub fn pending_seconds(&self) -> u8 {
        self.pending_seconds
    }

    /// Seconds since start, counted in counter overflows
    #[inline]
    pub fn seconds(&self) -> u32 {
        self.overflows
    }

    /// Monotonic tick count: overflows extended by the current counter value
    pub fn uptime_ticks(&self, now: C) -> u32 {
        self.overflows.wrapping_shl(C::BITS) | now.widen()
    }

    /// Nearest pending deadline, for the single hardware compare register.
    pub fn next_compare(&self, now: C) -> Option<C> {
        self.timers
            .iter()
            .filter(|timer| timer.armed)
            .map(|timer| timer.deadline())
            .min_by_key(|deadline| deadline.wrapping_sub(now))
    }
}

impl<C: Counter> Default for TimerMultiplexer<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_once_across_wrap() {
        for armed_at in (0..=255u8).step_by(7) {
            for delay in 0..=255u8 {
                let mut mux = TimerMultiplexer::<u8>::new();
                mux.arm(TimerId::Radio, armed_at, delay);

                let mut fired = 0;
                for step in 0..300u16 {
                    let now = armed_at.wrapping_add(step as u8);
                    if mux.poll(now) & TimerId::Radio.mask() != 0 {
                        fired += 1;
                        assert_eq!(step, delay as u16);
                    }
                    assert_eq!(mux.is_done(TimerId::Radio), step >= delay as u16);
                }
                assert_eq!(fired, 1);

                mux.clear(TimerId::Radio);
                assert!(!mux.is_done(TimerId::Radio));
                assert!(!mux.is_armed(TimerId::Radio));
            }
        }
    }

    #[test]
    fn rearm_replaces_deadline() {
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm(TimerId::Keyboard, 10, 5);
        mux.arm(TimerId::Keyboard, 12, 50);
        assert_eq!(mux.poll(15), 0);
        assert_eq!(mux.poll(61), 0);
        assert_eq!(mux.poll(62), TimerId::Keyboard.mask());
    }

    #[test]
    fn rearm_drops_pending_expiry() {
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm(TimerId::Keyboard, 0, 1);
        mux.poll(1);
        assert!(mux.is_done(TimerId::Keyboard));
        mux.arm(TimerId::Keyboard, 1, 10);
        assert!(!mux.is_done(TimerId::Keyboard));
    }

    #[test]
    fn arm_at_uses_absolute_counter_value() {
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm_at(TimerId::Keyboard, 240, 240u8.wrapping_add(50));
        assert_eq!(mux.next_compare(240), Some(34));
        assert_eq!(mux.poll(33), 0);
        assert_ne!(mux.poll(34), 0);
    }

    #[test]
    fn periodic_timer_does_not_drift() {
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm_periodic(TimerId::Display, 0, 100);

        // Noticed late every time; deadlines still land on multiples of 100.
        assert_ne!(mux.poll(130), 0);
        mux.acknowledge(TimerId::Display);
        assert_eq!(mux.next_compare(130), Some(200));
        assert_eq!(mux.poll(199), 0);
        assert_ne!(mux.poll(210), 0);
        assert_eq!(mux.next_compare(210), Some(44));
        assert!(mux.is_armed(TimerId::Display));
    }

    #[test]
    fn zero_period_disarms() {
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm_periodic(TimerId::Display, 0, 0);
        assert!(!mux.is_armed(TimerId::Display));
        assert_eq!(mux.poll(0), 0);
    }

    #[test]
    fn next_compare_picks_nearest_across_wrap() {
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm(TimerId::Keyboard, 200, 50); // 250
        mux.arm(TimerId::Radio, 200, 70); // 14 after wrap
        mux.arm(TimerId::Display, 200, 20); // 220
        assert_eq!(mux.next_compare(200), Some(220));
        mux.clear(TimerId::Display);
        assert_eq!(mux.next_compare(200), Some(250));
        mux.clear(TimerId::Keyboard);
        assert_eq!(mux.next_compare(200), Some(14));
        mux.clear(TimerId::Radio);
        assert_eq!(mux.next_compare(200), None);
    }

    #[test]
    fn overflow_counts_seconds_and_raises_clock() {
        let flags = TaskFlags::new();
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.on_overflow(&flags);
        mux.on_overflow(&flags);
        assert!(flags.is_raised(Task::Clock));
        assert_eq!(mux.seconds(), 2);
        assert_eq!(mux.uptime_ticks(17), 2 * 256 + 17);
        assert!(mux.take_second());
        assert!(mux.take_second());
        assert!(!mux.take_second());
    }

    #[test]
    fn compare_raises_owning_task() {
        let flags = TaskFlags::new();
        let mut mux = TimerMultiplexer::<u8>::new();
        mux.arm(TimerId::Radio, 0, 5);
        mux.arm(TimerId::Keyboard, 0, 50);
        mux.on_compare(5, &flags);
        assert!(flags.is_raised(Task::Radio));
        assert!(!flags.is_raised(Task::Keyboard));
    }

    #[test]
    fn wider_counter() {
        let mut mux = TimerMultiplexer::<u16>::new();
        mux.arm(TimerId::Radio, 65_000, 1_000);
        assert_eq!(mux.poll(65_535), 0);
        assert_eq!(mux.poll(463), 0);
        assert_ne!(mux.poll(464), 0);
    }
}
