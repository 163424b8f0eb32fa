//! Configuration constants for the ATmega169 thermostat firmware

/// CPU frequency in Hz (8 MHz internal RC divided by 2)
pub const CPU_FREQ_HZ: u32 = 4_000_000;

/// Watch crystal driving the asynchronous Timer2
pub const RTC_XTAL_HZ: u32 = 32_768;

/// Timer2 prescaler, 32.768 kHz / 128 = 256 Hz
pub const RTC_PRESCALER: u32 = 128;

/// Hardware counter ticks per second; one 8-bit revolution is one second
pub const TICKS_PER_SECOND: u32 = RTC_XTAL_HZ / RTC_PRESCALER;

/// Convert milliseconds to counter ticks (truncating)
pub const fn ticks_from_ms(ms: u32) -> u8 {
    let ticks = ms * TICKS_PER_SECOND / 1000;
    if ticks > u8::MAX as u32 {
        u8::MAX
    } else {
        ticks as u8
    }
}

/// Keyboard noise cancellation window, ~195 ms
pub const KEYBOARD_NOISE_CANCELATION: u8 = 50;

/// Seconds a key must be held before a long-press event
pub const LONG_PRESS_THRESHOLD: u8 = 3;

/// Seconds without any key before the "no key" event
pub const LONG_QUIET_THRESHOLD: u8 = 10;

/// Display refresh (blink) period, half a second
pub const DISPLAY_REFRESH_TICKS: u8 = ticks_from_ms(500);

/// Program slots per day of week
pub const SLOTS_PER_DAY: usize = 4;

/// Minutes in one day; valid start times are below this
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Hour bar shown for the bulk-programming pseudo-days (08:00 to 21:59)
pub const DEFAULT_FACTORY_HOURBAR: u32 = 0x003F_FF00;

/// Non-volatile layout version marker
pub const EE_LAYOUT: u8 = 0x0C;

/// Highest network address; each address owns one second of the minute
pub const MAX_DEVICE_ADDRESS: u8 = 30;

/// Seconds of every minute reserved for the master's sync broadcast
pub const SYNC_SECONDS: [u8; 2] = [29, 59];

/// Minimum delay before keying the transmitter in an owned second
pub const WL_START_BASE_TICKS: u8 = ticks_from_ms(20);

/// Per-address spread added to the start delay
pub const WL_START_STEP_TICKS: u8 = ticks_from_ms(12);

/// Receiver wake-up ahead of the sync broadcast at the next full second
pub const WL_SYNC_TICKS: u8 = ticks_from_ms(900);

/// Minutes a received time sync stays valid
pub const TIME_SYNC_TIMEOUT: u8 = 4;

/// Entries kept by the RAM log
pub const LOG_CAPACITY: usize = 16;

/// Persisted device configuration.
///
/// Stored as three raw bytes right after the calendar in the non-volatile layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Radio network address, 1..=30; 0 disables scheduled transmission
    pub device_address: u8,
    /// Sync windows to sleep through after each received sync
    pub skip_sync_cycles: u8,
    /// Minutes a received sync stays valid
    pub time_sync_timeout: u8,
}

impl DeviceConfig {
    pub const RAW_SIZE: usize = 3;

    pub const fn new(device_address: u8) -> Self {
        Self {
            device_address: if device_address > MAX_DEVICE_ADDRESS {
                0
            } else {
                device_address
            },
            skip_sync_cycles: 0,
            time_sync_timeout: TIME_SYNC_TIMEOUT,
        }
    }

    /// Decode the persisted form. Out-of-range addresses fall back to unconfigured.
    pub fn from_raw(raw: [u8; Self::RAW_SIZE]) -> Self {
        let mut config = Self::new(raw[0]);
        config.skip_sync_cycles = raw[1];
        if raw[2] != 0 && raw[2] != 0xFF {
            config.time_sync_timeout = raw[2];
        }
        config
    }

    pub fn to_raw(&self) -> [u8; Self::RAW_SIZE] {
        [
            self.device_address,
            self.skip_sync_cycles,
            self.time_sync_timeout,
        ]
    }

    /// True when the device takes part in scheduled transmission
    pub fn is_networked(&self) -> bool {
        self.device_address != 0
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
