pub mod eeprom;
pub mod keyboard;
pub mod serial_console;

pub use eeprom::{Eeprom, EepromError, RamEeprom};
pub use keyboard::{KeyEvents, Keyboard};
pub use serial_console::SerialConsole;

#[cfg(feature = "atmega169")]
pub use eeprom::InternalEeprom;
