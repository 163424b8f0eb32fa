//! Radio slot scheduling on a shared channel
//!
//! Every networked device owns the second of the minute equal to its
//! address, the master broadcasts time sync just after seconds 29 and 59,
//! and devices that missed their slot are granted retry seconds by the
//! master in the sync packet.

use crate::config::{
    DeviceConfig, SYNC_SECONDS, WL_START_BASE_TICKS, WL_START_STEP_TICKS, WL_SYNC_TICKS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    /// The device's own second, used when data is queued
    Primary,
    /// Second granted by the master after a missed transmission
    Retry,
    /// Listen for the master's time broadcast
    Sync,
}

/// Decision for one second: what to do and how long to wait before
/// keying the radio
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WirelessSlot {
    pub own_address: u8,
    pub kind: SlotKind,
    pub delay_ticks: u8,
}

impl WirelessSlot {
    #[inline]
    pub fn is_sync_window(&self) -> bool {
        self.kind == SlotKind::Sync
    }
}

/// Retry grants carried by the master's sync packet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForcedSlots {
    /// Address allowed to send on odd seconds above 30; 0xFF selects `flags`
    pub addr1: u8,
    /// Address allowed to send on even seconds above 30
    pub addr2: u8,
    /// With `addr1 == 0xFF`, bit `a` lets address `a` send at second `a + 30`
    pub flags: u32,
}

impl ForcedSlots {
    pub const FLAGS_SELECTOR: u8 = 0xFF;

    pub const fn none() -> Self {
        Self {
            addr1: 0,
            addr2: 0,
            flags: 0,
        }
    }

    fn grants(&self, address: u8, second: u8) -> bool {
        let paired = second > 30
            && if second & 1 == 1 {
                self.addr1 == address
            } else {
                self.addr2 == address
            };
        let flagged = self.addr1 == Self::FLAGS_SELECTOR
            && second % 30 == address
            && (self.flags >> address) & 1 == 1;
        paired || flagged
    }
}

pub struct WirelessScheduler {
    config: DeviceConfig,
    time_sync_timeout: u8,
    skip_sync: u8,
    forced: ForcedSlots,
}

impl WirelessScheduler {
    /// Starts unsynchronised: nothing is transmitted until the first sync.
    pub const fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            time_sync_timeout: 0,
            skip_sync: 0,
            forced: ForcedSlots::none(),
        }
    }

    #[inline]
    pub fn address(&self) -> u8 {
        self.config.device_address
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DeviceConfig) {
        self.config = config;
    }

    /// True while the last received sync is fresh enough to transmit
    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.time_sync_timeout > 1
    }

    /// Receiver has to stay on until a sync is heard
    pub fn needs_continuous_rx(&self) -> bool {
        self.config.is_networked() && !self.is_synchronized()
    }

    /// `second` is this device's reserved transmission second
    #[inline]
    pub fn is_primary_slot(&self, second: u8) -> bool {
        self.config.is_networked() && second == self.address()
    }

    pub fn is_retry_slot(&self, second: u8) -> bool {
        self.config.is_networked() && self.forced.grants(self.address(), second)
    }

    /// Spread within the second so neighbours in the same slot do not collide
    pub fn start_delay(&self) -> u8 {
        WL_START_BASE_TICKS + (self.address() % 8) * WL_START_STEP_TICKS
    }

    /// Slot decision for the second that has just begun.
    ///
    /// A sync window wins over a transmission in the same second since
    /// both use the single radio timer. Skipped sync windows are consumed
    /// here, so call this exactly once per second.
    pub fn evaluate(&mut self, second: u8, has_pending_data: bool) -> Option<WirelessSlot> {
        if !self.config.is_networked() || !self.is_synchronized() {
            return None;
        }

        let kind = if self.is_primary_slot(second) && has_pending_data {
            Some(SlotKind::Primary)
        } else if self.is_retry_slot(second) {
            Some(SlotKind::Retry)
        } else {
            None
        };
        let mut slot = kind.map(|kind| self.slot(kind, self.start_delay()));

        if SYNC_SECONDS.contains(&second) {
            if self.skip_sync != 0 {
                self.skip_sync -= 1;
            } else {
                slot = Some(self.slot(SlotKind::Sync, WL_SYNC_TICKS));
            }
        }
        slot
    }

    fn slot(&self, kind: SlotKind, delay_ticks: u8) -> WirelessSlot {
        WirelessSlot {
            own_address: self.address(),
            kind,
            delay_ticks,
        }
    }

    /// Received a time sync broadcast from the master.
    pub fn on_time_sync(&mut self, forced: ForcedSlots) {
        self.time_sync_timeout = self.config.time_sync_timeout;
        self.skip_sync = self.config.skip_sync_cycles;
        self.forced = forced;
    }

    /// Called at every minute boundary; ages the last sync.
    pub fn on_minute(&mut self) {
        self.time_sync_timeout = self.time_sync_timeout.saturating_sub(1);
        if !self.is_synchronized() {
            self.forced = ForcedSlots::none();
        }
    }

    pub fn time_sync_timeout(&self) -> u8 {
        self.time_sync_timeout
    }
}
