//! Task flags shared between interrupt handlers and the dispatch loop

use core::cell::Cell;
use critical_section::Mutex;

/// Duties of the dispatch loop. Each is requested by exactly one kind of
/// interrupt source and serviced by the loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Task {
    /// Radio receive-ready or radio slot timer
    Radio = 1 << 0,
    /// Display refresh timer
    Display = 1 << 1,
    /// Analog conversion complete
    Analog = 1 << 2,
    /// Motor run timer elapsed
    MotorStop = 1 << 3,
    /// Keypad edge or debounce window elapsed
    Keyboard = 1 << 4,
    /// One-second clock tick
    Clock = 1 << 5,
    /// Motor position sensor pulse
    MotorPulse = 1 << 6,
}

/// Fixed service order, least jitter tolerant first.
pub const DISPATCH_ORDER: [Task; 7] = [
    Task::Radio,
    Task::Display,
    Task::Analog,
    Task::MotorStop,
    Task::Keyboard,
    Task::Clock,
    Task::MotorPulse,
];

impl Task {
    #[inline]
    pub const fn bit(self) -> u8 {
        self as u8
    }
}

/// Single-byte flag register.
///
/// Interrupt handlers only ever set bits, the dispatch loop only ever clears
/// them. AVR has no atomic read-modify-write, so both sides update the byte
/// inside a critical section.
pub struct TaskFlags {
    bits: Mutex<Cell<u8>>,
}

impl TaskFlags {
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new(Cell::new(0)),
        }
    }

    /// Request a duty. Called from interrupt context.
    #[inline]
    pub fn raise(&self, task: Task) {
        critical_section::with(|cs| {
            let bits = self.bits.borrow(cs);
            bits.set(bits.get() | task.bit());
        });
    }

    #[inline]
    pub fn is_raised(&self, task: Task) -> bool {
        self.pending() & task.bit() != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    #[inline]
    pub fn pending(&self) -> u8 {
        critical_section::with(|cs| self.bits.borrow(cs).get())
    }

    /// Clear and return the highest priority pending duty.
    ///
    /// The flag is cleared before the duty runs, so an interrupt raising it
    /// again while the duty is serviced is not lost.
    pub fn take_next(&self) -> Option<Task> {
        critical_section::with(|cs| {
            let bits = self.bits.borrow(cs);
            let pending = bits.get();
            let task = DISPATCH_ORDER
                .iter()
                .copied()
                .find(|task| pending & task.bit() != 0)?;
            bits.set(pending & !task.bit());
            Some(task)
        })
    }
}

impl Default for TaskFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_distinct() {
        let mut seen = 0u8;
        for task in DISPATCH_ORDER {
            assert_eq!(seen & task.bit(), 0);
            seen |= task.bit();
        }
        assert_eq!(seen, 0x7F);
    }

    #[test]
    fn takes_in_priority_order() {
        let flags = TaskFlags::new();
        flags.raise(Task::MotorPulse);
        flags.raise(Task::Clock);
        flags.raise(Task::Radio);
        flags.raise(Task::Keyboard);

        assert_eq!(flags.take_next(), Some(Task::Radio));
        assert_eq!(flags.take_next(), Some(Task::Keyboard));
        assert_eq!(flags.take_next(), Some(Task::Clock));
        assert_eq!(flags.take_next(), Some(Task::MotorPulse));
        assert_eq!(flags.take_next(), None);
        assert!(flags.is_empty());
    }

    #[test]
    fn take_clears_only_one_flag() {
        let flags = TaskFlags::new();
        flags.raise(Task::Display);
        flags.raise(Task::Analog);
        assert_eq!(flags.take_next(), Some(Task::Display));
        assert!(flags.is_raised(Task::Analog));
        assert!(!flags.is_raised(Task::Display));
    }

    #[test]
    fn raises_from_other_contexts_are_not_lost() {
        static FLAGS: TaskFlags = TaskFlags::new();

        let raisers: Vec<_> = DISPATCH_ORDER
            .iter()
            .copied()
            .map(|task| {
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        FLAGS.raise(task);
                    }
                })
            })
            .collect();

        let mut seen = 0u8;
        while seen != 0x7F {
            if let Some(task) = FLAGS.take_next() {
                seen |= task.bit();
            }
        }
        for raiser in raisers {
            raiser.join().unwrap();
        }
        while let Some(task) = FLAGS.take_next() {
            seen |= task.bit();
        }
        assert_eq!(seen, 0x7F);
        assert!(FLAGS.is_empty());
    }
}
