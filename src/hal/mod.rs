pub mod power;
pub mod timer;
pub mod uart;
pub mod watchdog;

// Re-export commonly used types
pub use power::SleepMode;
pub use timer::{Prescaler, CLOCK_PRESCALER};
pub use watchdog::WatchdogTimeout;

#[cfg(feature = "atmega169")]
pub use power::Power;
#[cfg(feature = "atmega169")]
pub use timer::AsyncTimer;
#[cfg(feature = "atmega169")]
pub use uart::Uart;
#[cfg(feature = "atmega169")]
pub use watchdog::Watchdog;

/// Memory-mapped register access by data-space address.
#[cfg(feature = "atmega169")]
pub(crate) mod reg {
    #[inline(always)]
    pub unsafe fn read(addr: *mut u8) -> u8 {
        core::ptr::read_volatile(addr)
    }

    #[inline(always)]
    pub unsafe fn write(addr: *mut u8, value: u8) {
        core::ptr::write_volatile(addr, value)
    }

    #[inline(always)]
    pub unsafe fn modify(addr: *mut u8, f: impl FnOnce(u8) -> u8) {
        write(addr, f(read(addr)))
    }
}
