//! Application layer: the thermostat's duties on top of the scheduling core

use crate::config::{DeviceConfig, DISPLAY_REFRESH_TICKS};
use crate::diagnostics::{Diagnostics, ErrorCode, FatalError};
use crate::drivers::eeprom::Eeprom;
use crate::drivers::keyboard::{is_reset_chord, KeyEvents, Keyboard};
use crate::logger::{event, Logger};
use crate::persist::{self, PersistError, StoredState};
use crate::rtc::{Calendar, Mode, ProgramDay, SlotWrite, WeeklyProgram};
use crate::rtos::{Duties, Task, TaskFlags, TimerId, TimerMultiplexer};
use crate::wireless::{ForcedSlots, SlotKind, WirelessScheduler, WirelessSlot};
use ufmt::uWrite;

/// Access to interrupt-shared hardware state.
pub trait Hardware {
    /// Run `f` on the timer multiplexer with the current counter value while
    /// the timer interrupts are masked. Implementations reprogram the compare
    /// register afterwards.
    fn with_timers<R>(&mut self, f: impl FnOnce(&mut TimerMultiplexer, u8) -> R) -> R;

    /// Key state last captured by the pin change interrupt
    fn raw_keys(&self) -> u8;
}

/// What the display needs for one refresh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayView {
    pub calendar: Calendar,
    pub hour_bar: u32,
    pub mode: Mode,
}

/// Subsystems outside the scheduling core. They are driven from the
/// dispatch loop only.
pub trait Collaborators {
    /// Radio duty. `slot` is set when the radio slot timer expired.
    fn radio(&mut self, slot: Option<WirelessSlot>);

    fn display(&mut self, view: &DisplayView);

    fn analog(&mut self) {}

    fn motor_stop(&mut self) {}

    fn motor_pulse(&mut self) {}

    fn key_events(&mut self, events: KeyEvents);

    /// Called once per elapsed second after the clock advanced
    fn second(&mut self, _calendar: &Calendar, _mode: Mode, _minute: bool) {}

    /// Weekly valve exercise, Saturday 10:00
    fn valve_protection(&mut self) {}

    /// Outbound radio data is queued
    fn has_pending_data(&self) -> bool {
        false
    }
}

pub struct Thermostat<H, C, E> {
    hw: H,
    collab: C,
    eeprom: E,
    calendar: Calendar,
    program: WeeklyProgram,
    wireless: WirelessScheduler,
    keyboard: Keyboard,
    diagnostics: Diagnostics,
    radio_slot: Option<WirelessSlot>,
}

impl<H: Hardware, C: Collaborators, E: Eeprom> Thermostat<H, C, E> {
    /// Restore persisted state and start the periodic timers.
    ///
    /// Holding all front keys formats the storage with factory defaults. A
    /// storage layout written by other firmware is fatal.
    pub fn boot(mut hw: H, collab: C, mut eeprom: E) -> Result<Self, FatalError> {
        let formatted = is_reset_chord(hw.raw_keys());
        let state = if formatted {
            persist::format(&mut eeprom)?
        } else {
            persist::load(&mut eeprom)?
        };
        let StoredState {
            calendar,
            config,
            program,
        } = state;

        hw.with_timers(|timers, now| {
            timers.arm_periodic(TimerId::Display, now, DISPLAY_REFRESH_TICKS);
        });

        let mut thermostat = Self {
            hw,
            collab,
            eeprom,
            calendar,
            program,
            wireless: WirelessScheduler::new(config),
            keyboard: Keyboard::new(),
            diagnostics: Diagnostics::new(Logger::new()),
            radio_slot: None,
        };
        let log = thermostat.diagnostics.logger_mut();
        if formatted {
            log.log_system(0, event::FACTORY_FORMAT, 0);
        }
        log.log_system(0, event::BOOT, config.device_address as u16);
        Ok(thermostat)
    }

    fn uptime(&mut self) -> u32 {
        self.hw.with_timers(|timers, _| timers.seconds())
    }

    fn storage_result(&mut self, result: Result<(), PersistError>) {
        if let Err(PersistError::Eeprom(err)) = result {
            let now = self.uptime();
            self.diagnostics.report(ErrorCode::StorageFault, now, err as u16);
        }
    }

    /// Program one slot and write it back. Out-of-range input is counted
    /// and dropped.
    pub fn set_slot(&mut self, day: ProgramDay, index: u8, start: u16, mode: Mode) -> SlotWrite {
        let outcome = self.program.set_slot(day, index, start, mode);
        match outcome {
            SlotWrite::Rejected => {
                let now = self.uptime();
                self.diagnostics.report(ErrorCode::BoundsViolation, now, start);
            }
            SlotWrite::Stored { .. } | SlotWrite::DayComplete => {
                let result = persist::save_slot(&mut self.eeprom, &self.program, day, index);
                self.storage_result(result);
            }
        }
        outcome
    }

    pub fn set_calendar(&mut self, calendar: Calendar) {
        self.calendar = calendar;
        let result = persist::save_calendar(&mut self.eeprom, &self.calendar);
        self.storage_result(result);
    }

    pub fn set_config(&mut self, config: DeviceConfig) {
        self.wireless.set_config(config);
        let result = persist::save_config(&mut self.eeprom, &config);
        self.storage_result(result);
        let now = self.uptime();
        self.diagnostics
            .logger_mut()
            .log_system(now, event::CONFIG_SAVED, config.device_address as u16);
    }

    /// Time broadcast received from the master: take over its clock and
    /// retry grants.
    pub fn time_sync(&mut self, calendar: Calendar, forced: ForcedSlots) {
        self.calendar = calendar;
        self.wireless.on_time_sync(forced);
        let now = self.uptime();
        self.diagnostics
            .logger_mut()
            .log_radio(now, event::TIME_SYNC, calendar.minutes_of_day());
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn program(&self) -> &WeeklyProgram {
        &self.program
    }

    pub fn wireless(&self) -> &WirelessScheduler {
        &self.wireless
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn collaborators(&self) -> &C {
        &self.collab
    }

    pub fn collaborators_mut(&mut self) -> &mut C {
        &mut self.collab
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn eeprom_mut(&mut self) -> &mut E {
        &mut self.eeprom
    }

    pub fn current_mode(&self) -> Mode {
        self.program.current_mode(&self.calendar)
    }

    pub fn display_view(&self) -> DisplayView {
        DisplayView {
            calendar: self.calendar,
            hour_bar: self
                .program
                .hour_bar(ProgramDay::Day(self.calendar.day_of_week())),
            mode: self.current_mode(),
        }
    }

    /// Write pending log entries to `w`.
    pub fn drain_log<W: uWrite>(&mut self, w: &mut W) -> Result<usize, W::Error> {
        self.diagnostics.logger_mut().drain(w)
    }

    fn service_radio(&mut self) {
        let expired = self.hw.with_timers(|timers, _| {
            let done = timers.is_done(TimerId::Radio);
            timers.acknowledge(TimerId::Radio);
            done
        });
        let slot = if expired { self.radio_slot.take() } else { None };
        self.collab.radio(slot);
    }

    fn service_display(&mut self) {
        self.hw
            .with_timers(|timers, _| timers.acknowledge(TimerId::Display));
        let view = self.display_view();
        self.collab.display(&view);
    }

    fn service_keyboard(&mut self) {
        let raw = self.hw.raw_keys();
        let keyboard = &mut self.keyboard;
        self.hw
            .with_timers(|timers, now| keyboard.service(raw, timers, now));
        let events = self.keyboard.take_events();
        if !events.is_empty() {
            self.collab.key_events(events);
        }
    }

    fn service_clock(&mut self, flags: &TaskFlags) {
        let (ticked, more, now) = self.hw.with_timers(|timers, _| {
            let ticked = timers.take_second();
            (ticked, timers.pending_seconds() > 0, timers.seconds())
        });
        if !ticked {
            return;
        }

        self.calendar.tick();
        let minute = self.calendar.is_minute_start();
        if minute {
            self.wireless.on_minute();
            if self.calendar.is_valve_protection_time() {
                self.collab.valve_protection();
                self.diagnostics
                    .logger_mut()
                    .log_clock(now, event::VALVE_PROTECTION, 0);
            }
        }

        let second = self.calendar.second();
        match self
            .wireless
            .evaluate(second, self.collab.has_pending_data())
        {
            // only the newest second is still on air; replayed ones are gone
            Some(slot) if !more => {
                self.radio_slot = Some(slot);
                self.hw
                    .with_timers(|timers, tick| timers.arm(TimerId::Radio, tick, slot.delay_ticks));
                let code = match slot.kind {
                    SlotKind::Primary => event::RADIO_PRIMARY,
                    SlotKind::Retry => event::RADIO_RETRY,
                    SlotKind::Sync => event::RADIO_SYNC,
                };
                self.diagnostics
                    .logger_mut()
                    .log_radio(now, code, second as u16);
            }
            _ => {
                self.radio_slot = None;
                self.hw
                    .with_timers(|timers, _| timers.clear(TimerId::Radio));
            }
        }

        self.long_press_tick(now);

        let mode = self.current_mode();
        self.collab.second(&self.calendar, mode, minute);

        flags.raise(Task::Display);
        if more {
            flags.raise(Task::Clock);
        }
    }

    fn long_press_tick(&mut self, now: u32) {
        let before = (self.keyboard.long_press_seconds(), self.keyboard.quiet_seconds());
        self.keyboard.long_press_tick();
        let after = (self.keyboard.long_press_seconds(), self.keyboard.quiet_seconds());
        if (after.0 == u8::MAX && before.0 != u8::MAX) || (after.1 == u8::MAX && before.1 != u8::MAX) {
            self.diagnostics
                .report(ErrorCode::TimingOverload, now, self.keyboard.held_keys() as u16);
        }

        let events = self.keyboard.take_events();
        if !events.is_empty() {
            self.collab.key_events(events);
        }
    }
}

impl<H: Hardware, C: Collaborators, E: Eeprom> Duties for Thermostat<H, C, E> {
    fn service(&mut self, task: Task, flags: &TaskFlags) {
        match task {
            Task::Radio => self.service_radio(),
            Task::Display => self.service_display(),
            Task::Analog => self.collab.analog(),
            Task::MotorStop => self.collab.motor_stop(),
            Task::Keyboard => self.service_keyboard(),
            Task::Clock => self.service_clock(flags),
            Task::MotorPulse => self.collab.motor_pulse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::eeprom::RamEeprom;
    use crate::drivers::keyboard::{FRONT_KEYS, KEY_OK};
    use crate::rtc::Weekday;

    #[derive(Default)]
    struct Bench {
        timers: TimerMultiplexer,
        now: u8,
        keys: u8,
    }

    impl Hardware for Bench {
        fn with_timers<R>(&mut self, f: impl FnOnce(&mut TimerMultiplexer, u8) -> R) -> R {
            f(&mut self.timers, self.now)
        }

        fn raw_keys(&self) -> u8 {
            self.keys
        }
    }

    #[derive(Default)]
    struct Log {
        radio: Vec<Option<WirelessSlot>>,
        displays: usize,
        keys: Vec<KeyEvents>,
        valve: usize,
        pending: bool,
    }

    impl Collaborators for Log {
        fn radio(&mut self, slot: Option<WirelessSlot>) {
            self.radio.push(slot);
        }

        fn display(&mut self, _view: &DisplayView) {
            self.displays += 1;
        }

        fn key_events(&mut self, events: KeyEvents) {
            self.keys.push(events);
        }

        fn valve_protection(&mut self) {
            self.valve += 1;
        }

        fn has_pending_data(&self) -> bool {
            self.pending
        }
    }

    type Bed = Thermostat<Bench, Log, RamEeprom<128>>;

    fn formatted() -> RamEeprom<128> {
        let mut ee = RamEeprom::new();
        persist::format(&mut ee).unwrap();
        ee
    }

    fn boot() -> Bed {
        Thermostat::boot(Bench::default(), Log::default(), formatted()).unwrap()
    }

    fn elapse_second(t: &mut Bed, flags: &TaskFlags) {
        t.hardware_mut().timers.on_overflow(flags);
        while let Some(task) = flags.take_next() {
            t.service(task, flags);
        }
    }

    #[test]
    fn blank_storage_is_fatal() {
        let result = Thermostat::boot(Bench::default(), Log::default(), RamEeprom::<128>::new());
        assert_eq!(
            result.err(),
            Some(FatalError::LayoutMismatch {
                found: 0xFF,
                expected: crate::config::EE_LAYOUT
            })
        );
    }

    #[test]
    fn reset_chord_formats_blank_storage() {
        let bench = Bench {
            keys: FRONT_KEYS,
            ..Bench::default()
        };
        let t = Thermostat::boot(bench, Log::default(), RamEeprom::<128>::new()).unwrap();
        assert_eq!(*t.program(), WeeklyProgram::factory());
        let first = t.diagnostics().logger().iter().next().copied().unwrap();
        assert_eq!(first.code, event::FACTORY_FORMAT);
    }

    #[test]
    fn clock_duty_advances_calendar_once_per_second() {
        let mut t = boot();
        let flags = TaskFlags::new();
        for _ in 0..90 {
            elapse_second(&mut t, &flags);
        }
        assert_eq!(t.calendar().minute(), 1);
        assert_eq!(t.calendar().second(), 30);
        assert!(t.collaborators().displays >= 90);
    }

    #[test]
    fn late_loop_catches_up_on_missed_seconds() {
        let mut t = boot();
        let flags = TaskFlags::new();
        for _ in 0..3 {
            t.hardware_mut().timers.on_overflow(&flags);
        }
        let mut clock_runs = 0;
        while let Some(task) = flags.take_next() {
            if task == Task::Clock {
                clock_runs += 1;
            }
            t.service(task, &flags);
        }
        assert_eq!(clock_runs, 3);
        assert_eq!(t.calendar().second(), 3);
    }

    #[test]
    fn backlog_never_keys_radio_in_a_passed_second() {
        let mut t = boot();
        let flags = TaskFlags::new();
        t.set_config(DeviceConfig::new(5));
        t.time_sync(Calendar::new(26, 10, 19, 12, 0, 3).unwrap(), ForcedSlots::none());
        t.collaborators_mut().pending = true;

        // seconds 4, 5 and 6 delivered in one go; 5 is already over
        for _ in 0..3 {
            t.hardware_mut().timers.on_overflow(&flags);
        }
        while let Some(task) = flags.take_next() {
            t.service(task, &flags);
        }
        assert_eq!(t.calendar().second(), 6);
        assert!(!t.hardware_mut().timers.is_armed(TimerId::Radio));

        let delay = t.wireless().start_delay();
        t.hardware_mut().timers.on_compare(delay, &flags);
        assert!(!flags.is_raised(Task::Radio));
        assert!(t.collaborators().radio.iter().all(Option::is_none));
    }

    #[test]
    fn backlog_ending_in_own_second_still_arms() {
        let mut t = boot();
        let flags = TaskFlags::new();
        t.set_config(DeviceConfig::new(5));
        t.time_sync(Calendar::new(26, 10, 19, 12, 0, 3).unwrap(), ForcedSlots::none());
        t.collaborators_mut().pending = true;

        for _ in 0..2 {
            t.hardware_mut().timers.on_overflow(&flags);
        }
        while let Some(task) = flags.take_next() {
            t.service(task, &flags);
        }
        assert_eq!(t.calendar().second(), 5);
        assert!(t.hardware_mut().timers.is_armed(TimerId::Radio));
    }

    #[test]
    fn primary_slot_arms_radio_timer() {
        let mut t = boot();
        let flags = TaskFlags::new();
        t.set_config(DeviceConfig::new(5));
        t.time_sync(Calendar::new(26, 10, 19, 12, 0, 3).unwrap(), ForcedSlots::none());
        t.collaborators_mut().pending = true;

        elapse_second(&mut t, &flags);
        elapse_second(&mut t, &flags);
        assert_eq!(t.calendar().second(), 5);
        assert!(t.hardware_mut().timers.is_armed(TimerId::Radio));

        let delay = t.wireless().start_delay();
        t.hardware_mut().timers.on_compare(delay, &flags);
        assert_eq!(flags.take_next(), Some(Task::Radio));
        t.service(Task::Radio, &flags);
        let slot = t.collaborators().radio[0].unwrap();
        assert_eq!(slot.kind, SlotKind::Primary);
        assert_eq!(slot.own_address, 5);
    }

    #[test]
    fn valve_protection_on_saturday() {
        let mut t = boot();
        let flags = TaskFlags::new();
        let saturday = Calendar::new(26, 10, 24, 9, 59, 59).unwrap();
        assert_eq!(saturday.day_of_week(), Weekday::Saturday);
        t.set_calendar(saturday);
        elapse_second(&mut t, &flags);
        assert_eq!(t.collaborators().valve, 1);
        elapse_second(&mut t, &flags);
        assert_eq!(t.collaborators().valve, 1);
    }

    #[test]
    fn key_press_reaches_collaborator() {
        let mut t = boot();
        let flags = TaskFlags::new();
        t.hardware_mut().keys = KEY_OK;
        t.service(Task::Keyboard, &flags);
        assert_eq!(t.collaborators().keys, [KeyEvents::OK]);
        assert!(t.keyboard().is_noise_window_open());
    }

    #[test]
    fn long_quiet_pins_and_reports_overload_once() {
        let mut t = boot();
        let flags = TaskFlags::new();
        for _ in 0..300 {
            elapse_second(&mut t, &flags);
        }
        assert_eq!(t.collaborators().keys, [KeyEvents::NONE_LONG]);
        assert_eq!(t.diagnostics().count(ErrorCode::TimingOverload), 1);
    }

    #[test]
    fn rejected_slot_is_counted_not_stored() {
        let mut t = boot();
        assert_eq!(
            t.set_slot(ProgramDay::Week, 0, 1500, Mode::Comfort),
            SlotWrite::Rejected
        );
        assert_eq!(t.diagnostics().count(ErrorCode::BoundsViolation), 1);

        assert_eq!(
            t.set_slot(ProgramDay::Day(Weekday::Monday), 0, 360, Mode::Comfort),
            SlotWrite::Stored { next: 1 }
        );
        let stored = persist::load(t.eeprom_mut()).unwrap();
        assert_eq!(stored.program, *t.program());
    }
}
