//! Asynchronous Timer2 clocked from the 32.768 kHz watch crystal

use crate::config::{RTC_PRESCALER, RTC_XTAL_HZ};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Prescaler {
    Stop = 0,
    Direct = 1,
    Div8 = 2,
    Div32 = 3,
    Div64 = 4,
    Div128 = 5,
    Div256 = 6,
    Div1024 = 7,
}

impl Prescaler {
    pub fn divisor(self) -> u32 {
        match self {
            Prescaler::Stop => 0,
            Prescaler::Direct => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div32 => 32,
            Prescaler::Div64 => 64,
            Prescaler::Div128 => 128,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }

    /// Counter frequency in Hz for the watch crystal
    pub fn tick_hz(self) -> u32 {
        match self.divisor() {
            0 => 0,
            divisor => RTC_XTAL_HZ / divisor,
        }
    }
}

/// Prescaler giving one counter overflow per second
pub const CLOCK_PRESCALER: Prescaler = Prescaler::Div128;

const _: () = assert!(RTC_PRESCALER == 128);

/// Issue `write` once the previous asynchronous register update has reached
/// the timer domain. A write while the update-busy flag is set is lost.
pub fn write_when_synced(mut busy: impl FnMut() -> bool, write: impl FnOnce()) {
    while busy() {}
    write();
}

#[cfg(feature = "atmega169")]
pub use self::avr::AsyncTimer;

#[cfg(feature = "atmega169")]
mod avr {
    use super::{write_when_synced, CLOCK_PRESCALER};
    use crate::hal::reg;

    const TIMSK2: *mut u8 = 0x70 as *mut u8;
    const TCCR2A: *mut u8 = 0xB0 as *mut u8;
    const TCNT2: *mut u8 = 0xB2 as *mut u8;
    const OCR2A: *mut u8 = 0xB3 as *mut u8;
    const ASSR: *mut u8 = 0xB6 as *mut u8;

    const AS2: u8 = 1 << 3;
    const TCN2UB: u8 = 1 << 2;
    const OCR2UB: u8 = 1 << 1;
    const TCR2UB: u8 = 1 << 0;
    const TOIE2: u8 = 1 << 0;
    const OCIE2A: u8 = 1 << 1;

    /// Timer2 in asynchronous mode. Writes to TCCR2A, TCNT2 and OCR2A take
    /// a couple of crystal cycles to reach the timer domain.
    pub struct AsyncTimer {
        _private: (),
    }

    impl AsyncTimer {
        pub fn new() -> Self {
            unsafe {
                reg::write(TIMSK2, 0);
                reg::write(ASSR, AS2);
                reg::write(TCNT2, 0);
                reg::write(TCCR2A, CLOCK_PRESCALER as u8);
                while reg::read(ASSR) & (TCN2UB | TCR2UB) != 0 {}
                reg::write(TIMSK2, TOIE2 | OCIE2A);
            }
            Self { _private: () }
        }

        /// Handle for interrupt context.
        ///
        /// # Safety
        /// [`AsyncTimer::new`] must have run before.
        #[inline]
        pub unsafe fn steal() -> Self {
            Self { _private: () }
        }

        #[inline]
        pub fn counter(&self) -> u8 {
            unsafe { reg::read(TCNT2) }
        }

        /// Program the single compare unit with the nearest deadline.
        ///
        /// Waits out a pending OCR2A update, at most two crystal cycles.
        #[inline]
        pub fn set_compare(&mut self, value: u8) {
            write_when_synced(
                || unsafe { reg::read(ASSR) & OCR2UB != 0 },
                || unsafe { reg::write(OCR2A, value) },
            );
        }

        #[inline]
        pub fn update_pending(&self) -> bool {
            unsafe { reg::read(ASSR) & (TCN2UB | OCR2UB | TCR2UB) != 0 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TICKS_PER_SECOND;

    #[test]
    fn clock_prescaler_gives_one_revolution_per_second() {
        assert_eq!(CLOCK_PRESCALER.tick_hz(), TICKS_PER_SECOND);
        assert_eq!(Prescaler::Div8.tick_hz(), 4096);
        assert_eq!(Prescaler::Stop.tick_hz(), 0);
    }

    #[test]
    fn compare_write_waits_for_previous_update() {
        let mut busy_polls = 3;
        let mut written_after = None;
        let polls = core::cell::Cell::new(0);
        write_when_synced(
            || {
                polls.set(polls.get() + 1);
                if busy_polls > 0 {
                    busy_polls -= 1;
                    true
                } else {
                    false
                }
            },
            || written_after = Some(polls.get()),
        );
        assert_eq!(written_after, Some(4));
    }
}
