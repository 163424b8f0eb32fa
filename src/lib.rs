//! Timing and scheduling core of an ATmega169 radiator thermostat
//!
//! Everything here except register access builds on a host; the firmware
//! binary in `main.rs` adds interrupt vectors and the board glue.

#![cfg_attr(not(test), no_std)]

pub mod application;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod hal;
pub mod logger;
pub mod os;
pub mod persist;
pub mod rtc;
pub mod rtos;
pub mod wireless;

pub use application::{Collaborators, DisplayView, Hardware, Thermostat};
pub use diagnostics::FatalError;
