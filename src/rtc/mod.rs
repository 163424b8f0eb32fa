//! Real-time clock and the weekly heating program

pub mod calendar;
pub mod program;

pub use calendar::{Calendar, Rollover, Weekday};
pub use program::{Mode, ProgramDay, ProgramSlot, SlotWrite, WeeklyProgram};
