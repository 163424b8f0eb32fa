//! Non-volatile layout
//!
//! ```text
//! 0        layout marker (EE_LAYOUT)
//! 1..=7    calendar
//! 8..=10   device config
//! 11..     program table, 7 days x SLOTS_PER_DAY slots, u16 little endian
//! ```

use crate::config::{DeviceConfig, EE_LAYOUT, SLOTS_PER_DAY};
use crate::diagnostics::FatalError;
use crate::drivers::eeprom::{Eeprom, EepromError};
use crate::rtc::{Calendar, ProgramDay, Weekday, WeeklyProgram};

pub const ADDR_LAYOUT: u16 = 0;
pub const ADDR_CALENDAR: u16 = 1;
pub const ADDR_CONFIG: u16 = ADDR_CALENDAR + Calendar::RAW_SIZE as u16;
pub const ADDR_PROGRAM: u16 = ADDR_CONFIG + DeviceConfig::RAW_SIZE as u16;
pub const PROGRAM_SIZE: usize = 7 * SLOTS_PER_DAY * 2;
pub const LAYOUT_SIZE: usize = ADDR_PROGRAM as usize + PROGRAM_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistError {
    Eeprom(EepromError),
    LayoutMismatch { found: u8, expected: u8 },
}

impl From<EepromError> for PersistError {
    fn from(err: EepromError) -> Self {
        PersistError::Eeprom(err)
    }
}

impl From<PersistError> for FatalError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::LayoutMismatch { found, expected } => {
                FatalError::LayoutMismatch { found, expected }
            }
            PersistError::Eeprom(_) => FatalError::Storage,
        }
    }
}

/// Everything that survives a power loss
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    pub calendar: Calendar,
    pub config: DeviceConfig,
    pub program: WeeklyProgram,
}

impl StoredState {
    pub fn factory() -> Self {
        Self {
            calendar: Calendar::default(),
            config: DeviceConfig::new(0),
            program: WeeklyProgram::factory(),
        }
    }
}

fn slot_addr(day: Weekday, index: usize) -> u16 {
    ADDR_PROGRAM + ((day.index() as usize * SLOTS_PER_DAY + index) * 2) as u16
}

/// Read the stored state. A foreign layout marker is fatal; a stored field
/// that does not decode falls back to its factory value.
pub fn load<E: Eeprom>(ee: &mut E) -> Result<StoredState, PersistError> {
    let marker = ee.read_byte(ADDR_LAYOUT)?;
    if marker != EE_LAYOUT {
        return Err(PersistError::LayoutMismatch {
            found: marker,
            expected: EE_LAYOUT,
        });
    }

    let mut raw_calendar = [0; Calendar::RAW_SIZE];
    ee.read(ADDR_CALENDAR, &mut raw_calendar)?;
    let mut raw_config = [0; DeviceConfig::RAW_SIZE];
    ee.read(ADDR_CONFIG, &mut raw_config)?;

    let mut program = WeeklyProgram::factory();
    for day in Weekday::ALL {
        for index in 0..SLOTS_PER_DAY {
            let mut raw = [0; 2];
            ee.read(slot_addr(day, index), &mut raw)?;
            program.load_raw_slot(day, index, u16::from_le_bytes(raw));
        }
    }

    Ok(StoredState {
        calendar: Calendar::from_raw(raw_calendar).unwrap_or_default(),
        config: DeviceConfig::from_raw(raw_config),
        program,
    })
}

/// Write factory defaults and the current layout marker.
pub fn format<E: Eeprom>(ee: &mut E) -> Result<StoredState, PersistError> {
    let state = StoredState::factory();
    save_calendar(ee, &state.calendar)?;
    save_config(ee, &state.config)?;
    save_program(ee, &state.program)?;
    ee.write(ADDR_LAYOUT, &[EE_LAYOUT])?;
    Ok(state)
}

pub fn save_calendar<E: Eeprom>(ee: &mut E, calendar: &Calendar) -> Result<(), PersistError> {
    ee.write(ADDR_CALENDAR, &calendar.to_raw())?;
    Ok(())
}

pub fn save_config<E: Eeprom>(ee: &mut E, config: &DeviceConfig) -> Result<(), PersistError> {
    ee.write(ADDR_CONFIG, &config.to_raw())?;
    Ok(())
}

/// Write back one slot of every day `day` stands for.
pub fn save_slot<E: Eeprom>(
    ee: &mut E,
    program: &WeeklyProgram,
    day: ProgramDay,
    index: u8,
) -> Result<(), PersistError> {
    let index = index as usize;
    if index >= SLOTS_PER_DAY {
        return Ok(());
    }
    for &weekday in day.days() {
        let raw = program.raw_slot(weekday, index);
        ee.write(slot_addr(weekday, index), &raw.to_le_bytes())?;
    }
    Ok(())
}

pub fn save_program<E: Eeprom>(ee: &mut E, program: &WeeklyProgram) -> Result<(), PersistError> {
    for index in 0..SLOTS_PER_DAY as u8 {
        save_slot(ee, program, ProgramDay::Week, index)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::eeprom::RamEeprom;
    use crate::rtc::Mode;

    #[test]
    fn layout_fits_the_part() {
        assert_eq!(ADDR_CONFIG, 8);
        assert_eq!(ADDR_PROGRAM, 11);
        assert_eq!(LAYOUT_SIZE, 67);
        assert!(LAYOUT_SIZE <= crate::drivers::eeprom::EEPROM_SIZE);
    }

    #[test]
    fn blank_part_is_a_layout_mismatch() {
        let mut ee = RamEeprom::<128>::new();
        assert_eq!(
            load(&mut ee),
            Err(PersistError::LayoutMismatch {
                found: 0xFF,
                expected: EE_LAYOUT
            })
        );
        let fatal: FatalError = PersistError::LayoutMismatch {
            found: 0xFF,
            expected: EE_LAYOUT,
        }
        .into();
        assert_eq!(fatal.display_code(), 5);
    }

    #[test]
    fn format_then_load_gives_factory_state() {
        let mut ee = RamEeprom::<128>::new();
        let formatted = format(&mut ee).unwrap();
        assert_eq!(ee.as_bytes()[0], EE_LAYOUT);
        assert_eq!(load(&mut ee).unwrap(), formatted);
        assert_eq!(formatted, StoredState::factory());
    }

    #[test]
    fn saved_regions_survive_reload() {
        let mut ee = RamEeprom::<128>::new();
        let mut state = format(&mut ee).unwrap();

        state.calendar = Calendar::new(26, 10, 19, 21, 30, 5).unwrap();
        state.config = DeviceConfig::new(17);
        state.program.set_slot(ProgramDay::Workdays, 2, 1000, Mode::Eco);
        save_calendar(&mut ee, &state.calendar).unwrap();
        save_config(&mut ee, &state.config).unwrap();
        save_slot(&mut ee, &state.program, ProgramDay::Workdays, 2).unwrap();

        assert_eq!(load(&mut ee).unwrap(), state);
        // slot 2 of Monday, little endian 0x03E8
        let addr = slot_addr(Weekday::Monday, 2) as usize;
        assert_eq!(&ee.as_bytes()[addr..addr + 2], &[0xE8, 0x03]);
    }

    #[test]
    fn corrupt_fields_fall_back_to_defaults() {
        let mut ee = RamEeprom::<128>::new();
        format(&mut ee).unwrap();
        ee.write(ADDR_CALENDAR, &[0, 13, 40, 0, 0, 0, 0]).unwrap();
        ee.write(slot_addr(Weekday::Sunday, 1), &[0xFF, 0xFF]).unwrap();

        let state = load(&mut ee).unwrap();
        assert_eq!(state.calendar, Calendar::default());
        assert_eq!(state.program, WeeklyProgram::factory());
    }

    #[test]
    fn storage_errors_propagate() {
        let mut ee = RamEeprom::<16>::new();
        assert_eq!(
            format(&mut ee),
            Err(PersistError::Eeprom(EepromError::OutOfRange))
        );
    }
}
