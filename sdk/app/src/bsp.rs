//! The few BSP routines the firmware needs, and the adapters that plug them
//! into the core traits.

use core::fmt;
use log::{LevelFilter, Log, Metadata, Record};
use pdma_core::clock::TimeDaemon;

/// Global timer rate: half the CPU clock.
const COUNTS_PER_MS: u64 = 333_333;

extern "C" {
    fn usleep(useconds: u32) -> i32;
    fn outbyte(c: u8);
    #[link_name = "XTime_GetTime"]
    fn xtime_get_time(now: *mut u64);
}

/// Global timer plus the BSP busy-wait.
pub struct BspClock;

impl TimeDaemon for BspClock {
    fn get_now_ms(&self) -> u64 {
        let mut ticks = 0u64;
        unsafe { xtime_get_time(&mut ticks) };
        ticks / COUNTS_PER_MS
    }

    fn sleep_ms(&mut self, ms: u32) {
        unsafe { usleep(ms.saturating_mul(1000)) };
    }
}

pub struct Uart;

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                unsafe { outbyte(b'\r') };
            }
            unsafe { outbyte(b) };
        }
        Ok(())
    }
}

struct UartLogger;

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = fmt::Write::write_fmt(
                &mut Uart,
                format_args!("[{:<5} {}] {}\n", record.level(), record.target(), record.args()),
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: UartLogger = UartLogger;

pub fn init_logging(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
