//! State shared between interrupt handlers and the dispatch loop
//!
//! Handlers only raise task flags, capture raw readings or run the timer
//! multiplexer's interrupt bodies; everything else happens in the loop.

use crate::drivers::keyboard::KEY_MASK;
use crate::rtos::{Task, TaskFlags, TimerMultiplexer};
use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};
use critical_section::Mutex;

// PINE bits sampled by the PCINT0 handler
pub const PINE_RADIO_SDO: u8 = 1 << 6;
pub const PINE_MOTOR_SENSOR: u8 = 1 << 3;

pub struct Interrupts {
    tasks: TaskFlags,
    // plain loads and stores only; AVR has no atomic read-modify-write
    raw_keys: AtomicU8,
    motor_pulses: Mutex<Cell<u8>>,
}

impl Interrupts {
    pub const fn new() -> Self {
        Self {
            tasks: TaskFlags::new(),
            raw_keys: AtomicU8::new(0),
            motor_pulses: Mutex::new(Cell::new(0)),
        }
    }

    #[inline]
    pub fn tasks(&self) -> &TaskFlags {
        &self.tasks
    }

    /// Last key state captured on a pin change (active high)
    #[inline]
    pub fn raw_keys(&self) -> u8 {
        self.raw_keys.load(Ordering::Acquire)
    }

    /// Keypad pin change (PCINT1). `pinb` is the raw, active low port value.
    pub fn on_key_change(&self, pinb: u8) {
        self.raw_keys.store(!pinb & KEY_MASK, Ordering::Release);
        self.tasks.raise(Task::Keyboard);
    }

    /// Radio and motor sensor pin change (PCINT0)
    pub fn on_port_e_change(&self, pine: u8) {
        if pine & PINE_RADIO_SDO != 0 {
            self.tasks.raise(Task::Radio);
        }
        if pine & PINE_MOTOR_SENSOR != 0 {
            critical_section::with(|cs| {
                let pulses = self.motor_pulses.borrow(cs);
                pulses.set(pulses.get().wrapping_add(1));
            });
            self.tasks.raise(Task::MotorPulse);
        }
    }

    /// Motor pulses since the last call
    pub fn take_motor_pulses(&self) -> u8 {
        critical_section::with(|cs| self.motor_pulses.borrow(cs).replace(0))
    }

    pub fn on_motor_timer(&self) {
        self.tasks.raise(Task::MotorStop);
    }

    pub fn on_adc_complete(&self) {
        self.tasks.raise(Task::Analog);
    }

    /// Timer2 overflow. Returns the next compare value to program.
    pub fn on_timer_overflow(&self, timers: &mut TimerMultiplexer) -> Option<u8> {
        timers.on_overflow(&self.tasks);
        timers.next_compare(0)
    }

    /// Timer2 compare match at counter value `now`. Returns the next
    /// compare value to program.
    pub fn on_timer_compare(&self, timers: &mut TimerMultiplexer, now: u8) -> Option<u8> {
        timers.on_compare(now, &self.tasks);
        timers.next_compare(now)
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

/// Global interrupt shared state
pub static INTERRUPTS: Interrupts = Interrupts::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::keyboard::{KEY_OK, KEY_ROT1};
    use crate::rtos::TimerId;

    #[test]
    fn key_capture_inverts_active_low_port() {
        let irq = Interrupts::new();
        irq.on_key_change(!(KEY_OK | KEY_ROT1) | 0x0E);
        assert_eq!(irq.raw_keys(), KEY_OK | KEY_ROT1);
        assert_eq!(irq.tasks().take_next(), Some(Task::Keyboard));
    }

    #[test]
    fn port_e_sources() {
        let irq = Interrupts::new();
        irq.on_port_e_change(PINE_MOTOR_SENSOR);
        irq.on_port_e_change(PINE_MOTOR_SENSOR);
        assert!(!irq.tasks().is_raised(Task::Radio));
        assert_eq!(irq.take_motor_pulses(), 2);
        assert_eq!(irq.take_motor_pulses(), 0);
        irq.on_port_e_change(PINE_RADIO_SDO);
        assert_eq!(irq.tasks().take_next(), Some(Task::Radio));
    }

    #[test]
    fn timer_bodies_report_next_compare() {
        let irq = Interrupts::new();
        let mut timers = TimerMultiplexer::new();
        timers.arm(TimerId::Radio, 250, 20);
        timers.arm(TimerId::Keyboard, 250, 100);

        assert_eq!(irq.on_timer_overflow(&mut timers), Some(14));
        assert!(irq.tasks().is_raised(Task::Clock));
        assert_eq!(irq.on_timer_compare(&mut timers, 14), Some(94));
        assert!(irq.tasks().is_raised(Task::Radio));
        assert_eq!(irq.on_timer_compare(&mut timers, 94), None);
        assert!(irq.tasks().is_raised(Task::Keyboard));
    }

    #[test]
    fn motor_pulses_counted_across_contexts() {
        static IRQ: Interrupts = Interrupts::new();

        let sensors: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..50 {
                        IRQ.on_port_e_change(PINE_MOTOR_SENSOR);
                    }
                })
            })
            .collect();
        for sensor in sensors {
            sensor.join().unwrap();
        }
        assert_eq!(IRQ.take_motor_pulses(), 200);
        assert!(IRQ.tasks().is_raised(Task::MotorPulse));
    }
}
