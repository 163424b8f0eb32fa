//! Cooperative scheduling: task flags, dispatch loop and software timers

pub mod scheduler;
pub mod task;
pub mod timer_mux;

pub use scheduler::{Dispatcher, Duties, Iteration, Platform};
pub use task::{Task, TaskFlags, DISPATCH_ORDER};
pub use timer_mux::{Counter, TimerId, TimerMultiplexer};
