//! Keypad and rotary wheel decoding on top of the pin change capture

use crate::config::{KEYBOARD_NOISE_CANCELATION, LONG_PRESS_THRESHOLD, LONG_QUIET_THRESHOLD};
use crate::rtos::{TimerId, TimerMultiplexer};

// Raw key bits as captured from PINB (active low, already inverted)
pub const KEY_ROT1: u8 = 1 << 0;
pub const KEY_MENU: u8 = 1 << 4;
pub const KEY_TIMER: u8 = 1 << 5;
pub const KEY_OK: u8 = 1 << 6;
pub const KEY_ROT2: u8 = 1 << 7;

pub const FRONT_KEYS: u8 = KEY_TIMER | KEY_OK | KEY_MENU;
pub const KEY_MASK: u8 = FRONT_KEYS | KEY_ROT1 | KEY_ROT2;

/// Set of keyboard events accumulated until the menu consumes them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvents(u16);

impl KeyEvents {
    pub const NONE: Self = Self(0);
    pub const WHEEL_PLUS: Self = Self(1 << 0);
    pub const WHEEL_MINUS: Self = Self(1 << 1);
    pub const TIMER: Self = Self(1 << 2);
    pub const OK: Self = Self(1 << 3);
    pub const MENU: Self = Self(1 << 4);
    /// A pressed key was joined by another one, or became a long press
    pub const TIMER_REVOKE: Self = Self(1 << 5);
    pub const OK_REVOKE: Self = Self(1 << 6);
    pub const MENU_REVOKE: Self = Self(1 << 7);
    pub const TIMER_LONG: Self = Self(1 << 8);
    pub const OK_LONG: Self = Self(1 << 9);
    pub const MENU_LONG: Self = Self(1 << 10);
    /// MENU and OK held together
    pub const LOCK_LONG: Self = Self(1 << 11);
    pub const ALL_LONG: Self = Self(1 << 12);
    /// No key touched for a while
    pub const NONE_LONG: Self = Self(1 << 13);

    #[inline]
    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl core::ops::BitOr for KeyEvents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// True when every front key is held, the factory reset chord at boot
pub fn is_reset_chord(raw: u8) -> bool {
    raw & FRONT_KEYS == FRONT_KEYS
}

/// Front keys and rotary wheel, fed from the pin change capture.
///
/// The first edge after a quiet period opens a noise window on the keyboard
/// software timer; edges inside the window track state but produce no press
/// events.
pub struct Keyboard {
    front_prev: u8,
    wheel_prev: u8,
    long_press: u8,
    long_quiet: u8,
    window_open: bool,
    allow_revoke: bool,
    events: KeyEvents,
}

impl Keyboard {
    pub const fn new() -> Self {
        Self {
            front_prev: 0,
            wheel_prev: 0,
            long_press: 0,
            long_quiet: 0,
            window_open: false,
            allow_revoke: false,
            events: KeyEvents::NONE,
        }
    }

    /// Keyboard duty: evaluate the last captured key state.
    pub fn service(&mut self, raw: u8, timers: &mut TimerMultiplexer, now: u8) {
        if self.window_open && timers.is_done(TimerId::Keyboard) {
            timers.clear(TimerId::Keyboard);
            self.window_open = false;
        }

        self.scan_wheel(raw);
        self.scan_front(raw & FRONT_KEYS, timers, now);
    }

    fn scan_wheel(&mut self, raw: u8) {
        let wheel = raw & (KEY_ROT1 | KEY_ROT2);
        // only ROT1 raises the pin change interrupt
        if (wheel ^ self.wheel_prev) & KEY_ROT1 == 0 {
            return;
        }
        if wheel == 0 || wheel == KEY_ROT1 | KEY_ROT2 {
            self.events.insert(KeyEvents::WHEEL_MINUS);
        } else {
            self.events.insert(KeyEvents::WHEEL_PLUS);
        }
        self.long_quiet = 0;
        self.wheel_prev = wheel;
    }

    fn scan_front(&mut self, front: u8, timers: &mut TimerMultiplexer, now: u8) {
        if front == self.front_prev {
            return;
        }

        if front != 0 && self.front_prev == 0 && !self.window_open {
            let pressed = match front {
                KEY_TIMER => Some(KeyEvents::TIMER),
                KEY_OK => Some(KeyEvents::OK),
                KEY_MENU => Some(KeyEvents::MENU),
                _ => None,
            };
            if let Some(event) = pressed {
                self.events.insert(event);
                self.allow_revoke = true;
            }
        }

        // another key joined the pressed one
        if self.allow_revoke && front != 0 {
            let revoke = match self.front_prev {
                KEY_TIMER => Some(KeyEvents::TIMER_REVOKE),
                KEY_OK => Some(KeyEvents::OK_REVOKE),
                KEY_MENU => Some(KeyEvents::MENU_REVOKE),
                _ => None,
            };
            if let Some(event) = revoke {
                self.events.insert(event);
                self.allow_revoke = false;
            }
        }

        if !self.window_open {
            self.window_open = true;
            timers.arm_at(
                TimerId::Keyboard,
                now,
                now.wrapping_add(KEYBOARD_NOISE_CANCELATION),
            );
        }

        self.front_prev = front;
        self.long_press = 0;
        self.long_quiet = 0;
    }

    /// Once-per-second long press / long quiet detection. Counters stop at
    /// their maximum so a held key cannot generate the event a second time.
    pub fn long_press_tick(&mut self) {
        if self.front_prev == 0 {
            if self.long_quiet == u8::MAX {
                return;
            }
            self.long_quiet += 1;
            if self.long_quiet == LONG_QUIET_THRESHOLD {
                self.events.insert(KeyEvents::NONE_LONG);
            }
        } else {
            if self.long_press == u8::MAX {
                return;
            }
            self.long_press += 1;
            if self.long_press == LONG_PRESS_THRESHOLD {
                let event = match self.front_prev {
                    KEY_TIMER => KeyEvents::TIMER_LONG | KeyEvents::TIMER_REVOKE,
                    KEY_OK => KeyEvents::OK_LONG | KeyEvents::OK_REVOKE,
                    KEY_MENU => KeyEvents::MENU_LONG | KeyEvents::MENU_REVOKE,
                    k if k == KEY_MENU | KEY_OK => KeyEvents::LOCK_LONG,
                    FRONT_KEYS => KeyEvents::ALL_LONG,
                    _ => KeyEvents::NONE,
                };
                self.events.insert(event);
            }
        }
    }

    /// Hand accumulated events to the menu and start a fresh set.
    pub fn take_events(&mut self) -> KeyEvents {
        core::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> KeyEvents {
        self.events
    }

    pub fn held_keys(&self) -> u8 {
        self.front_prev
    }

    pub fn is_noise_window_open(&self) -> bool {
        self.window_open
    }

    /// Seconds counted by the long press detector, pinned at 255
    pub fn long_press_seconds(&self) -> u8 {
        self.long_press
    }

    pub fn quiet_seconds(&self) -> u8 {
        self.long_quiet
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}
