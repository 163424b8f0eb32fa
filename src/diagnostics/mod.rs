//! Error handling and diagnostics

use crate::logger::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Non-volatile layout unusable; the device refuses to run
    FatalConfiguration = 1,
    /// Out-of-range slot or time, dropped without effect
    BoundsViolation = 2,
    /// A counter reached its limit and was pinned
    TimingOverload = 3,
    /// Non-volatile storage access failed
    StorageFault = 4,
}

impl ErrorCode {
    pub const COUNT: usize = 4;

    #[inline]
    fn slot(self) -> usize {
        self as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub code: ErrorCode,
    pub timestamp: u32,
    pub data: u16,
}

/// Errors that stop the device at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    /// Stored layout marker is not the one this firmware writes
    LayoutMismatch { found: u8, expected: u8 },
    /// Storage could not be read at all
    Storage,
}

impl FatalError {
    /// Code shown on the display before halting, as in `E5`
    pub fn display_code(&self) -> u8 {
        match self {
            FatalError::LayoutMismatch { .. } => 5,
            FatalError::Storage => 6,
        }
    }
}

pub struct Diagnostics {
    logger: Logger,
    last_error: Option<Error>,
    counts: [u8; ErrorCode::COUNT],
}

impl Diagnostics {
    pub const fn new(logger: Logger) -> Self {
        Self {
            logger,
            last_error: None,
            counts: [0; ErrorCode::COUNT],
        }
    }

    /// Record a recovered error: count it and leave a log entry.
    pub fn report(&mut self, code: ErrorCode, timestamp: u32, data: u16) {
        let count = &mut self.counts[code.slot()];
        *count = count.saturating_add(1);
        self.last_error = Some(Error {
            code,
            timestamp,
            data,
        });
        self.logger.log_error(timestamp, code as u8, data);
    }

    pub fn report_fatal(&mut self, error: FatalError, timestamp: u32) {
        let data = match error {
            FatalError::LayoutMismatch { found, expected } => u16::from_be_bytes([found, expected]),
            FatalError::Storage => 0,
        };
        self.report(ErrorCode::FatalConfiguration, timestamp, data);
    }

    pub fn count(&self, code: ErrorCode) -> u8 {
        self.counts[code.slot()]
    }

    pub fn error_count(&self) -> u16 {
        self.counts.iter().map(|&c| c as u16).sum()
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut Logger {
        &mut self.logger
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Logger::new())
    }
}
