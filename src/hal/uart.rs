//! USART0 transmitter for the debug console

use crate::config::CPU_FREQ_HZ;

// Buffer size must be power of 2 for efficient masking
const BUFFER_SIZE: usize = 32;
const BUFFER_MASK: usize = BUFFER_SIZE - 1;

pub const BAUD_RATE: u32 = 9600;

/// UBRR for normal speed mode, rounded to nearest
pub const fn ubrr(cpu_hz: u32, baud: u32) -> u16 {
    ((cpu_hz + 8 * baud) / (16 * baud) - 1) as u16
}

pub const UBRR: u16 = ubrr(CPU_FREQ_HZ, BAUD_RATE);

/// Byte ring filled by the main loop and emptied by the UDRE interrupt
pub struct Buffer {
    data: [u8; BUFFER_SIZE],
    write_idx: usize,
    read_idx: usize,
}

impl Buffer {
    pub const fn new() -> Self {
        Self {
            data: [0; BUFFER_SIZE],
            write_idx: 0,
            read_idx: 0,
        }
    }

    pub fn write(&mut self, byte: u8) -> bool {
        let next_write = (self.write_idx + 1) & BUFFER_MASK;
        if next_write != self.read_idx {
            self.data[self.write_idx] = byte;
            self.write_idx = next_write;
            true
        } else {
            false
        }
    }

    pub fn read(&mut self) -> Option<u8> {
        if self.read_idx != self.write_idx {
            let byte = self.data[self.read_idx];
            self.read_idx = (self.read_idx + 1) & BUFFER_MASK;
            Some(byte)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read_idx == self.write_idx
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "atmega169")]
pub use self::avr::{is_transmitting, on_data_register_empty, Uart};

#[cfg(feature = "atmega169")]
mod avr {
    use super::{Buffer, UBRR};
    use crate::hal::reg;
    use avr_device::interrupt::Mutex;
    use core::cell::RefCell;
    use core::convert::Infallible;

    const UCSR0B: *mut u8 = 0xC1 as *mut u8;
    const UCSR0C: *mut u8 = 0xC2 as *mut u8;
    const UBRR0L: *mut u8 = 0xC4 as *mut u8;
    const UBRR0H: *mut u8 = 0xC5 as *mut u8;
    const UDR0: *mut u8 = 0xC6 as *mut u8;

    const UDRIE0: u8 = 1 << 5;
    const TXEN0: u8 = 1 << 3;
    // 8N1
    const UCSZ_8BIT: u8 = (1 << 2) | (1 << 1);

    static TX_BUFFER: Mutex<RefCell<Buffer>> = Mutex::new(RefCell::new(Buffer::new()));

    pub struct Uart {
        _private: (),
    }

    impl Uart {
        pub fn new() -> Self {
            unsafe {
                reg::write(UBRR0H, (UBRR >> 8) as u8);
                reg::write(UBRR0L, UBRR as u8);
                reg::write(UCSR0C, UCSZ_8BIT);
                reg::write(UCSR0B, TXEN0);
            }
            Self { _private: () }
        }
    }

    impl embedded_hal::serial::Write<u8> for Uart {
        type Error = Infallible;

        fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
            let queued = avr_device::interrupt::free(|cs| TX_BUFFER.borrow(cs).borrow_mut().write(byte));
            // start or keep the UDRE interrupt draining the buffer
            unsafe {
                reg::modify(UCSR0B, |r| r | UDRIE0);
            }
            if queued {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        }

        fn flush(&mut self) -> nb::Result<(), Self::Error> {
            let empty = avr_device::interrupt::free(|cs| TX_BUFFER.borrow(cs).borrow().is_empty());
            if empty && unsafe { reg::read(UCSR0B) } & UDRIE0 == 0 {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        }
    }

    /// Queued bytes still going out; the CPU clock must keep running
    pub fn is_transmitting() -> bool {
        unsafe { reg::read(UCSR0B) & UDRIE0 != 0 }
    }

    /// USART0 data register empty interrupt body
    pub fn on_data_register_empty() {
        avr_device::interrupt::free(|cs| {
            match TX_BUFFER.borrow(cs).borrow_mut().read() {
                Some(byte) => unsafe {
                    reg::write(UDR0, byte);
                },
                // Buffer empty - disable TX interrupt
                None => unsafe {
                    reg::modify(UCSR0B, |r| r & !UDRIE0);
                },
            }
        });
    }
}
