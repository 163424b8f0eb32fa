//! Event log kept in RAM and drained to the debug console

use crate::config::LOG_CAPACITY;
use ufmt::{uWrite, uwrite};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    System = 0,
    Clock = 1,
    Radio = 2,
    Error = 3,
    Debug = 4,
}

impl LogKind {
    pub fn label(self) -> &'static str {
        match self {
            LogKind::System => "SYS",
            LogKind::Clock => "CLK",
            LogKind::Radio => "RF",
            LogKind::Error => "ERR",
            LogKind::Debug => "DBG",
        }
    }
}

/// Event codes used with [`LogKind::System`], [`LogKind::Clock`] and [`LogKind::Radio`]
pub mod event {
    pub const BOOT: u8 = 0x01;
    pub const FACTORY_FORMAT: u8 = 0x02;
    pub const CONFIG_SAVED: u8 = 0x03;
    pub const VALVE_PROTECTION: u8 = 0x11;
    pub const RADIO_PRIMARY: u8 = 0x20;
    pub const RADIO_RETRY: u8 = 0x21;
    pub const RADIO_SYNC: u8 = 0x22;
    pub const TIME_SYNC: u8 = 0x23;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Uptime in seconds
    pub timestamp: u32,
    pub kind: LogKind,
    pub code: u8,
    pub data: u16,
}

impl LogEntry {
    const EMPTY: Self = Self {
        timestamp: 0,
        kind: LogKind::System,
        code: 0,
        data: 0,
    };
}

/// Ring buffer of the most recent entries. When full the oldest entry is
/// overwritten and counted.
pub struct Logger {
    buffer: [LogEntry; LOG_CAPACITY],
    head: usize,
    len: usize,
    overwritten: u16,
}

impl Logger {
    pub const fn new() -> Self {
        Self {
            buffer: [LogEntry::EMPTY; LOG_CAPACITY],
            head: 0,
            len: 0,
            overwritten: 0,
        }
    }

    pub fn log(&mut self, timestamp: u32, kind: LogKind, code: u8, data: u16) {
        let tail = (self.head + self.len) % LOG_CAPACITY;
        self.buffer[tail] = LogEntry {
            timestamp,
            kind,
            code,
            data,
        };
        if self.len == LOG_CAPACITY {
            self.head = (self.head + 1) % LOG_CAPACITY;
            self.overwritten = self.overwritten.saturating_add(1);
        } else {
            self.len += 1;
        }
    }

    pub fn log_system(&mut self, timestamp: u32, code: u8, data: u16) {
        self.log(timestamp, LogKind::System, code, data);
    }

    pub fn log_clock(&mut self, timestamp: u32, code: u8, data: u16) {
        self.log(timestamp, LogKind::Clock, code, data);
    }

    pub fn log_radio(&mut self, timestamp: u32, code: u8, data: u16) {
        self.log(timestamp, LogKind::Radio, code, data);
    }

    pub fn log_error(&mut self, timestamp: u32, code: u8, data: u16) {
        self.log(timestamp, LogKind::Error, code, data);
    }

    pub fn log_debug(&mut self, timestamp: u32, code: u8, data: u16) {
        if cfg!(feature = "debug") {
            self.log(timestamp, LogKind::Debug, code, data);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries lost to overwriting since start, saturating
    pub fn overwritten(&self) -> u16 {
        self.overwritten
    }

    /// Oldest entry first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        (0..self.len).map(move |i| &self.buffer[(self.head + i) % LOG_CAPACITY])
    }

    pub fn pop(&mut self) -> Option<LogEntry> {
        if self.len == 0 {
            return None;
        }
        let entry = self.buffer[self.head];
        self.head = (self.head + 1) % LOG_CAPACITY;
        self.len -= 1;
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Write every entry as `[<ts>] <KIND> <code> <data>` lines, oldest
    /// first. An entry leaves the buffer only once it was written.
    pub fn drain<W: uWrite>(&mut self, w: &mut W) -> Result<usize, W::Error> {
        let mut written = 0;
        loop {
            let Some(entry) = self.iter().next().copied() else {
                break;
            };
            uwrite!(
                *w,
                "[{}] {} {} {}\r\n",
                entry.timestamp,
                entry.kind.label(),
                entry.code,
                entry.data
            )?;
            self.pop();
            written += 1;
        }
        Ok(written)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
