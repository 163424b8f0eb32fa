#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

use panic_halt as _;

use atmega169_thermostat::application::{Collaborators, DisplayView, Hardware, Thermostat};
use atmega169_thermostat::diagnostics::{Diagnostics, FatalError};
use atmega169_thermostat::drivers::{InternalEeprom, KeyEvents, SerialConsole};
use atmega169_thermostat::hal::{uart, AsyncTimer, Power, SleepMode, Uart, Watchdog, WatchdogTimeout};
use atmega169_thermostat::os::INTERRUPTS;
use atmega169_thermostat::rtos::{Dispatcher, Platform, TaskFlags, TimerMultiplexer};
use atmega169_thermostat::wireless::WirelessSlot;
use avr_device::interrupt::{self, Mutex};
use core::cell::RefCell;
use core::ptr::{read_volatile, write_volatile};

const PINB: *mut u8 = 0x23 as *mut u8;
const PINE: *mut u8 = 0x2C as *mut u8;
const EIMSK: *mut u8 = 0x3D as *mut u8;
const PCMSK0: *mut u8 = 0x6B as *mut u8;
const PCMSK1: *mut u8 = 0x6C as *mut u8;
const ADCSRA: *mut u8 = 0x7A as *mut u8;

const PCIE0: u8 = 1 << 6;
const PCIE1: u8 = 1 << 7;
const ADSC: u8 = 1 << 6;

// Global state for interrupt handling
static TIMERS: Mutex<RefCell<TimerMultiplexer>> = Mutex::new(RefCell::new(TimerMultiplexer::new()));

/// Timer2 and key capture as seen from the dispatch loop
struct Board {
    timer: AsyncTimer,
}

impl Hardware for Board {
    fn with_timers<R>(&mut self, f: impl FnOnce(&mut TimerMultiplexer, u8) -> R) -> R {
        interrupt::free(|cs| {
            let mut timers = TIMERS.borrow(cs).borrow_mut();
            let now = self.timer.counter();
            let result = f(&mut timers, now);
            if let Some(compare) = timers.next_compare(now) {
                self.timer.set_compare(compare);
            }
            result
        })
    }

    fn raw_keys(&self) -> u8 {
        INTERRUPTS.raw_keys()
    }
}

/// Hooks for the LCD, motor and RFM drivers, which live outside this crate
#[derive(Default)]
struct Subsystems {
    last_view: Option<DisplayView>,
    last_events: KeyEvents,
    radio_slot: Option<WirelessSlot>,
}

impl Collaborators for Subsystems {
    fn radio(&mut self, slot: Option<WirelessSlot>) {
        if slot.is_some() {
            self.radio_slot = slot;
        }
    }

    fn display(&mut self, view: &DisplayView) {
        self.last_view = Some(*view);
    }

    fn key_events(&mut self, events: KeyEvents) {
        self.last_events = events;
    }
}

struct Sleeper {
    power: Power,
    timer: AsyncTimer,
}

impl Platform for Sleeper {
    fn timer_update_pending(&self) -> bool {
        self.timer.update_pending()
    }

    fn needs_fast_clock(&self) -> bool {
        uart::is_transmitting()
    }

    fn needs_adc(&self) -> bool {
        unsafe { read_volatile(ADCSRA) & ADSC != 0 }
    }

    fn sleep(&mut self, mode: SleepMode, flags: &TaskFlags) {
        interrupt::disable();
        if flags.is_empty() {
            self.power.sleep(mode);
        } else {
            unsafe { interrupt::enable() };
        }
    }
}

fn halt(error: FatalError, console: &mut SerialConsole<Uart>, watchdog: &mut Watchdog) -> ! {
    watchdog.disable();
    let mut diagnostics = Diagnostics::default();
    diagnostics.report_fatal(error, 0);
    let _ = diagnostics.logger_mut().drain(console);
    let _ = console.write_str("E");
    let _ = console.write_byte(b'0' + error.display_code());
    let _ = console.write_str("\r\n");
    let _ = console.flush();
    interrupt::disable();
    loop {
        avr_device::asm::sleep();
    }
}

#[avr_device::entry]
fn main() -> ! {
    let mut watchdog = Watchdog::new();
    watchdog.disable();

    let timer = AsyncTimer::new();
    let mut console = SerialConsole::new(Uart::new());

    unsafe {
        write_volatile(PCMSK1, read_volatile(PCMSK1) | 0xF1);
        write_volatile(PCMSK0, read_volatile(PCMSK0) | 0x48);
        write_volatile(EIMSK, read_volatile(EIMSK) | PCIE0 | PCIE1);
        INTERRUPTS.on_key_change(read_volatile(PINB));
    }

    let board = Board { timer };
    let mut thermostat = match Thermostat::boot(board, Subsystems::default(), InternalEeprom::new()) {
        Ok(thermostat) => thermostat,
        Err(error) => halt(error, &mut console, &mut watchdog),
    };

    let mut sleeper = Sleeper {
        power: Power::new(),
        timer: unsafe { AsyncTimer::steal() },
    };
    let mut dispatcher = Dispatcher::new(INTERRUPTS.tasks());

    unsafe { interrupt::enable() };
    watchdog.start(WatchdogTimeout::Ms2100);

    loop {
        dispatcher.run_once(&mut sleeper, &mut thermostat);
        watchdog.feed();
        if !thermostat.diagnostics().logger().is_empty() {
            let _ = thermostat.drain_log(&mut console);
        }
    }
}

// ATmega169 vector numbers
#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_2() {
    // PCINT0: RFM SDO and motor position sensor
    INTERRUPTS.on_port_e_change(read_volatile(PINE));
}

#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_3() {
    // PCINT1: keypad and wheel
    INTERRUPTS.on_key_change(read_volatile(PINB));
}

#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_4() {
    // TIMER2_COMP
    interrupt::free(|cs| {
        let mut timer = AsyncTimer::steal();
        let mut timers = TIMERS.borrow(cs).borrow_mut();
        let now = timer.counter();
        if let Some(compare) = INTERRUPTS.on_timer_compare(&mut timers, now) {
            timer.set_compare(compare);
        }
    });
}

#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_5() {
    // TIMER2_OVF
    interrupt::free(|cs| {
        let mut timer = AsyncTimer::steal();
        if let Some(compare) = INTERRUPTS.on_timer_overflow(&mut TIMERS.borrow(cs).borrow_mut()) {
            timer.set_compare(compare);
        }
    });
}

#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_11() {
    // TIMER0_OVF: motor run timer
    INTERRUPTS.on_motor_timer();
}

#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_14() {
    // USART0_UDRE
    uart::on_data_register_empty();
}

#[no_mangle]
pub unsafe extern "avr-interrupt" fn __vector_19() {
    // ADC conversion complete
    INTERRUPTS.on_adc_complete();
}
