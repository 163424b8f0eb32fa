//! Watchdog reset timer

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchdogTimeout {
    Ms16 = 0,
    Ms32 = 1,
    Ms65 = 2,
    Ms130 = 3,
    Ms260 = 4,
    Ms520 = 5,
    Ms1000 = 6,
    Ms2100 = 7,
}

impl WatchdogTimeout {
    /// WDTCR value enabling the watchdog with this timeout
    #[inline]
    pub fn wdtcr_bits(self) -> u8 {
        WDE | self as u8
    }
}

const WDE: u8 = 1 << 3;
const WDCE: u8 = 1 << 4;

/// Timed sequence prefix required before changing WDE or the prescaler
pub const WDTCR_CHANGE_ENABLE: u8 = WDCE | WDE;

#[cfg(feature = "atmega169")]
pub use self::avr::Watchdog;

#[cfg(feature = "atmega169")]
mod avr {
    use super::{WatchdogTimeout, WDTCR_CHANGE_ENABLE};
    use crate::hal::reg;

    const WDTCR: *mut u8 = 0x60 as *mut u8;

    pub struct Watchdog {
        _private: (),
    }

    impl Watchdog {
        #[inline]
        pub fn new() -> Self {
            Self { _private: () }
        }

        #[inline]
        pub fn start(&mut self, timeout: WatchdogTimeout) {
            avr_device::interrupt::free(|_| unsafe {
                avr_device::asm::wdr();
                reg::write(WDTCR, WDTCR_CHANGE_ENABLE);
                reg::write(WDTCR, timeout.wdtcr_bits());
            });
        }

        #[inline]
        pub fn feed(&mut self) {
            avr_device::asm::wdr();
        }

        #[inline]
        pub fn disable(&mut self) {
            avr_device::interrupt::free(|_| unsafe {
                avr_device::asm::wdr();
                reg::write(WDTCR, WDTCR_CHANGE_ENABLE);
                reg::write(WDTCR, 0x00);
            });
        }
    }

    impl Default for Watchdog {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_register_encoding() {
        assert_eq!(WDTCR_CHANGE_ENABLE, 0x18);
        assert_eq!(WatchdogTimeout::Ms2100.wdtcr_bits(), 0x0F);
        assert_eq!(WatchdogTimeout::Ms16.wdtcr_bits(), 0x08);
    }
}
