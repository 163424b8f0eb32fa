//! Weekly heating program: per-day switch points between two set-points

use super::calendar::{Calendar, Weekday};
use crate::config::{DEFAULT_FACTORY_HOURBAR, MINUTES_PER_DAY, SLOTS_PER_DAY};

/// Temperature set-point selected by a program slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Secondary set-point, the hour-bar baseline
    Eco = 0,
    Comfort = 1,
}

impl Mode {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Mode::Eco),
            1 => Some(Mode::Comfort),
            _ => None,
        }
    }
}

/// Programming target: a single day or one of the bulk-edit shortcuts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramDay {
    Day(Weekday),
    /// Monday to Friday
    Workdays,
    /// Monday to Sunday
    Week,
}

impl ProgramDay {
    /// 0..=6 are Monday..Sunday, 7 is Monday-Friday, 8 is the whole week
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0..=6 => Weekday::from_index(index).map(ProgramDay::Day),
            7 => Some(ProgramDay::Workdays),
            8 => Some(ProgramDay::Week),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            ProgramDay::Day(day) => day.index(),
            ProgramDay::Workdays => 7,
            ProgramDay::Week => 8,
        }
    }

    /// Real days a write fans out to
    pub fn days(self) -> &'static [Weekday] {
        match self {
            ProgramDay::Day(day) => &Weekday::ALL[day.index() as usize..=day.index() as usize],
            ProgramDay::Workdays => &Weekday::ALL[..5],
            ProgramDay::Week => &Weekday::ALL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramSlot {
    /// Minutes since midnight
    pub start: u16,
    pub mode: Mode,
}

impl ProgramSlot {
    pub const fn new(start: u16, mode: Mode) -> Self {
        Self { start, mode }
    }

    /// Suggested value while bulk programming: 07:00 Comfort, 22:00 Eco, ...
    pub const fn suggestion(index: u8) -> Self {
        if index % 2 == 0 {
            Self::new(7 * 60, Mode::Comfort)
        } else {
            Self::new(22 * 60, Mode::Eco)
        }
    }

    /// Packed non-volatile form: mode in the top nibble, start in the low 12 bits
    pub fn to_raw(self) -> u16 {
        ((self.mode as u16) << 12) | (self.start & 0x0FFF)
    }

    pub fn from_raw(raw: u16) -> Option<Self> {
        let start = raw & 0x0FFF;
        if start >= MINUTES_PER_DAY {
            return None;
        }
        Mode::from_bits((raw >> 12) as u8).map(|mode| Self::new(start, mode))
    }
}

/// Outcome of [`WeeklyProgram::set_slot`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotWrite {
    /// Stored; `next` is the following slot to program
    Stored { next: u8 },
    /// Stored into the last slot, or the index was already past it
    DayComplete,
    /// Start time out of range, nothing written
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeeklyProgram {
    days: [[ProgramSlot; SLOTS_PER_DAY]; 7],
}

impl WeeklyProgram {
    pub const CAPACITY: u8 = SLOTS_PER_DAY as u8;

    /// Factory program: every day alternates 07:00 Comfort and 22:00 Eco
    pub fn factory() -> Self {
        let mut day = [ProgramSlot::suggestion(0); SLOTS_PER_DAY];
        for (index, slot) in day.iter_mut().enumerate() {
            *slot = ProgramSlot::suggestion(index as u8);
        }
        Self { days: [day; 7] }
    }

    pub fn set_slot(&mut self, day: ProgramDay, index: u8, start: u16, mode: Mode) -> SlotWrite {
        if index >= Self::CAPACITY {
            return SlotWrite::DayComplete;
        }
        if start >= MINUTES_PER_DAY {
            return SlotWrite::Rejected;
        }
        for weekday in day.days() {
            self.days[weekday.index() as usize][index as usize] = ProgramSlot::new(start, mode);
        }
        if index + 1 == Self::CAPACITY {
            SlotWrite::DayComplete
        } else {
            SlotWrite::Stored { next: index + 1 }
        }
    }

    /// Slot contents; the bulk-edit days report the programming suggestion.
    pub fn get_slot(&self, day: ProgramDay, index: u8) -> Option<ProgramSlot> {
        if index >= Self::CAPACITY {
            return None;
        }
        match day {
            ProgramDay::Day(weekday) => Some(self.days[weekday.index() as usize][index as usize]),
            ProgramDay::Workdays | ProgramDay::Week => Some(ProgramSlot::suggestion(index)),
        }
    }

    pub fn slots(&self, day: Weekday) -> &[ProgramSlot; SLOTS_PER_DAY] {
        &self.days[day.index() as usize]
    }

    /// Mode in force at `minutes` past midnight.
    ///
    /// Slots are scanned in stored order, not sorted; the last one starting
    /// at or before `minutes` wins. Before the first switch point of the day
    /// the previous day's last slot still applies.
    pub fn mode_at(&self, day: Weekday, minutes: u16) -> Mode {
        let minutes = minutes.min(MINUTES_PER_DAY - 1);
        self.slots(day)
            .iter()
            .filter(|slot| slot.start <= minutes)
            .last()
            .or_else(|| self.slots(day.previous()).last())
            .map_or(Mode::Eco, |slot| slot.mode)
    }

    pub fn current_mode(&self, calendar: &Calendar) -> Mode {
        self.mode_at(calendar.day_of_week(), calendar.minutes_of_day())
    }

    /// 24-bit map, bit `h` set when the mode at `h:00` is not the baseline.
    pub fn hour_bar(&self, day: ProgramDay) -> u32 {
        match day {
            ProgramDay::Day(weekday) => (0..24u16)
                .filter(|hour| self.mode_at(weekday, hour * 60) != Mode::Eco)
                .fold(0, |bar, hour| bar | 1 << hour),
            ProgramDay::Workdays | ProgramDay::Week => DEFAULT_FACTORY_HOURBAR,
        }
    }

    pub(crate) fn raw_slot(&self, day: Weekday, index: usize) -> u16 {
        self.days[day.index() as usize][index].to_raw()
    }

    /// Load a persisted slot; undecodable values keep the current slot.
    pub(crate) fn load_raw_slot(&mut self, day: Weekday, index: usize, raw: u16) -> bool {
        match ProgramSlot::from_raw(raw) {
            Some(slot) => {
                self.days[day.index() as usize][index] = slot;
                true
            }
            None => false,
        }
    }
}

impl Default for WeeklyProgram {
    fn default() -> Self {
        Self::factory()
    }
}
