//! Sleep mode selection for the ATmega169

/// SM2..SM0 encodings of the SMCR register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepMode {
    Idle = 0,
    AdcNoiseReduction = 1,
    PowerSave = 3,
}

impl SleepMode {
    /// Deepest mode that keeps the asynchronous Timer2 running and the
    /// peripherals currently in use clocked.
    ///
    /// Power-down would stop Timer2, so power-save is the floor.
    pub fn select(needs_fast_clock: bool, needs_adc: bool) -> Self {
        if needs_fast_clock {
            SleepMode::Idle
        } else if needs_adc {
            SleepMode::AdcNoiseReduction
        } else {
            SleepMode::PowerSave
        }
    }

    /// SMCR value with the sleep enable bit set
    #[inline]
    pub fn smcr_bits(self) -> u8 {
        ((self as u8) << 1) | SMCR_SE
    }
}

const SMCR_SE: u8 = 1 << 0;

#[cfg(feature = "atmega169")]
pub use self::avr::Power;

#[cfg(feature = "atmega169")]
mod avr {
    use super::SleepMode;
    use crate::hal::reg;

    const SMCR: *mut u8 = 0x53 as *mut u8;

    pub struct Power {
        _private: (),
    }

    impl Power {
        pub fn new() -> Self {
            Self { _private: () }
        }

        /// Enter `mode` and return after the waking interrupt has run.
        ///
        /// Must be called with interrupts disabled; SEI takes effect after
        /// the following instruction, so no interrupt can slip in between.
        #[inline]
        pub fn sleep(&mut self, mode: SleepMode) {
            unsafe {
                reg::write(SMCR, mode.smcr_bits());
                avr_device::interrupt::enable();
                avr_device::asm::sleep();
                avr_device::asm::nop();
                reg::write(SMCR, (SleepMode::PowerSave as u8) << 1);
            }
        }
    }

    impl Default for Power {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepest_mode_when_nothing_runs() {
        assert_eq!(SleepMode::select(false, false), SleepMode::PowerSave);
        assert_eq!(SleepMode::select(false, true), SleepMode::AdcNoiseReduction);
        assert_eq!(SleepMode::select(true, true), SleepMode::Idle);
        assert_eq!(SleepMode::select(true, false), SleepMode::Idle);
    }

    #[test]
    fn smcr_encoding() {
        assert_eq!(SleepMode::Idle.smcr_bits(), 0b0001);
        assert_eq!(SleepMode::AdcNoiseReduction.smcr_bits(), 0b0011);
        assert_eq!(SleepMode::PowerSave.smcr_bits(), 0b0111);
    }
}
