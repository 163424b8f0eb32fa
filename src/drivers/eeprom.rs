//! Non-volatile byte storage (ATmega169 internal EEPROM, 512 bytes)

pub const EEPROM_SIZE: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EepromError {
    OutOfRange,
    /// Read back differs from what was written
    VerifyFailed,
}

/// Byte-addressed storage. Writes of unchanged bytes are skipped by
/// implementations to spare erase cycles.
pub trait Eeprom {
    fn capacity(&self) -> usize;

    fn read_byte(&mut self, addr: u16) -> Result<u8, EepromError>;

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), EepromError>;

    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), EepromError> {
        check_range(self.capacity(), addr, buf.len())?;
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(addr + offset as u16)?;
        }
        Ok(())
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<(), EepromError> {
        check_range(self.capacity(), addr, data.len())?;
        for (offset, byte) in data.iter().enumerate() {
            let addr = addr + offset as u16;
            if self.read_byte(addr)? != *byte {
                self.write_byte(addr, *byte)?;
            }
        }
        Ok(())
    }
}

fn check_range(capacity: usize, addr: u16, len: usize) -> Result<(), EepromError> {
    if addr as usize + len > capacity {
        Err(EepromError::OutOfRange)
    } else {
        Ok(())
    }
}

/// RAM backed storage, erased to 0xFF like a fresh part
pub struct RamEeprom<const N: usize> {
    cells: [u8; N],
    writes: usize,
}

impl<const N: usize> RamEeprom<N> {
    pub const fn new() -> Self {
        Self {
            cells: [0xFF; N],
            writes: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.cells
    }

    /// Byte writes performed so far
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl<const N: usize> Default for RamEeprom<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Eeprom for RamEeprom<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn read_byte(&mut self, addr: u16) -> Result<u8, EepromError> {
        self.cells
            .get(addr as usize)
            .copied()
            .ok_or(EepromError::OutOfRange)
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), EepromError> {
        let cell = self
            .cells
            .get_mut(addr as usize)
            .ok_or(EepromError::OutOfRange)?;
        *cell = value;
        self.writes += 1;
        Ok(())
    }
}

#[cfg(feature = "atmega169")]
pub use self::avr::InternalEeprom;

#[cfg(feature = "atmega169")]
mod avr {
    use super::{Eeprom, EepromError, EEPROM_SIZE};
    use crate::hal::reg;

    const EECR: *mut u8 = 0x3F as *mut u8;
    const EEDR: *mut u8 = 0x40 as *mut u8;
    const EEARL: *mut u8 = 0x41 as *mut u8;
    const EEARH: *mut u8 = 0x42 as *mut u8;

    const EERE: u8 = 1 << 0;
    const EEWE: u8 = 1 << 1;
    const EEMWE: u8 = 1 << 2;

    pub struct InternalEeprom {
        _private: (),
    }

    impl InternalEeprom {
        pub fn new() -> Self {
            Self { _private: () }
        }

        fn wait_ready(&self) {
            unsafe { while reg::read(EECR) & EEWE != 0 {} }
        }

        fn set_address(&mut self, addr: u16) {
            unsafe {
                reg::write(EEARH, (addr >> 8) as u8);
                reg::write(EEARL, addr as u8);
            }
        }
    }

    impl Default for InternalEeprom {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Eeprom for InternalEeprom {
        fn capacity(&self) -> usize {
            EEPROM_SIZE
        }

        fn read_byte(&mut self, addr: u16) -> Result<u8, EepromError> {
            if addr as usize >= EEPROM_SIZE {
                return Err(EepromError::OutOfRange);
            }
            self.wait_ready();
            self.set_address(addr);
            unsafe {
                reg::write(EECR, EERE);
                Ok(reg::read(EEDR))
            }
        }

        fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), EepromError> {
            if addr as usize >= EEPROM_SIZE {
                return Err(EepromError::OutOfRange);
            }
            self.wait_ready();
            self.set_address(addr);
            // EEWE must follow EEMWE within four cycles
            avr_device::interrupt::free(|_| unsafe {
                reg::write(EEDR, value);
                reg::write(EECR, EEMWE);
                reg::write(EECR, EEMWE | EEWE);
            });
            if self.read_byte(addr)? != value {
                return Err(EepromError::VerifyFailed);
            }
            Ok(())
        }
    }
}
