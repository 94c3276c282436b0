//! # Shim protocol driver
//!
//! Moves one payload between DDR and the AXI-Stream side of the shim:
//!
//! ```ignore
//! let desc = TransferDescriptor::new(tx_addr, 32, Direction::ToStream)?;
//! shim.start_transfer(&desc);
//! match shim.wait_for_completion(5000) {
//!     Completion::Done => {}
//!     Completion::TimedOut => warn!("{}", shim.debug_status()),
//! }
//! ```
//!
//! The register channels are a single-owner resource. Only one transfer may
//! be in flight; the driver holds the banks by value so a second driver for
//! the same shim cannot exist.
//!
//! Buffers must be cleaned out of the data cache before their address goes
//! into [`ShimDriver::start_transfer`], and invalidated after an S2MM
//! transfer completes before the CPU reads them (see [`crate::cache`]).

use bit_field::BitField;
use log::{debug, warn};
use thiserror::Error;

use crate::clock::TimeDaemon;
use crate::gpio::GpioBank;
use crate::regs::{
    LengthControl, RegisterSnapshot, TransferDescriptor, ADDR_CHANNEL, DONE_BIT, LEN_CHANNEL,
    STATUS_CHANNEL,
};

/// Timing of the handshake.
///
/// Dwell and poll interval are at least 1 ms: a zero dwell would set and
/// clear start in the same instant, a zero interval would spin on a clock
/// that never advances.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShimConfig {
    pulse_dwell_ms: u32,
    poll_interval_ms: u32,
    default_timeout_ms: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ShimConfigError {
    #[error("start pulse dwell must be at least 1 ms")]
    ZeroPulseDwell,
    #[error("poll interval must be at least 1 ms")]
    ZeroPollInterval,
}

impl ShimConfig {
    pub const PULSE_DWELL_MS: u32 = 1;
    pub const POLL_INTERVAL_MS: u32 = 1;
    pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

    pub fn new(pulse_dwell_ms: u32, poll_interval_ms: u32, default_timeout_ms: u32) -> Result<Self, ShimConfigError> {
        if pulse_dwell_ms == 0 {
            return Err(ShimConfigError::ZeroPulseDwell);
        }
        if poll_interval_ms == 0 {
            return Err(ShimConfigError::ZeroPollInterval);
        }
        Ok(Self { pulse_dwell_ms, poll_interval_ms, default_timeout_ms })
    }

    /// Same timing, different budget for [`ShimDriver::transfer`]. Any
    /// budget is valid; zero times out without polling.
    pub fn with_timeout_ms(mut self, default_timeout_ms: u32) -> Self {
        self.default_timeout_ms = default_timeout_ms;
        self
    }

    /// How long the start bit stays asserted.
    #[inline(always)]
    pub fn pulse_dwell_ms(&self) -> u32 {
        self.pulse_dwell_ms
    }

    /// Delay between two reads of the done flag.
    #[inline(always)]
    pub fn poll_interval_ms(&self) -> u32 {
        self.poll_interval_ms
    }

    /// Budget used by [`ShimDriver::transfer`].
    #[inline(always)]
    pub fn default_timeout_ms(&self) -> u32 {
        self.default_timeout_ms
    }
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            pulse_dwell_ms: Self::PULSE_DWELL_MS,
            poll_interval_ms: Self::POLL_INTERVAL_MS,
            default_timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Done,
    TimedOut,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ShimError {
    /// The done flag never rose. The start bit is already clear, so a new
    /// transfer may be issued.
    #[error("transfer not done after {timeout_ms} ms ({snapshot})")]
    ProtocolTimeout { timeout_ms: u32, snapshot: RegisterSnapshot },
}

/// Owns the output bank (address, length/control), the input bank (status)
/// and the time source.
pub struct ShimDriver<O: GpioBank, I: GpioBank, T: TimeDaemon> {
    out: O,
    status: I,
    clock: T,
    config: ShimConfig,
    last_control: LengthControl,
}

impl<O: GpioBank, I: GpioBank, T: TimeDaemon> ShimDriver<O, I, T> {
    pub fn new(out: O, status: I, clock: T, config: ShimConfig) -> Self {
        Self {
            out,
            status,
            clock,
            config,
            last_control: LengthControl(0),
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    #[inline(always)]
    pub fn clock(&self) -> &T {
        &self.clock
    }

    #[inline(always)]
    pub fn clock_mut(&mut self) -> &mut T {
        &mut self.clock
    }

    /// The last value this driver wrote to the length/control channel.
    #[inline(always)]
    pub fn last_control(&self) -> LengthControl {
        self.last_control
    }

    /// Give the banks and clock back.
    pub fn release(self) -> (O, I, T) {
        (self.out, self.status, self.clock)
    }

    /// Encode `desc` and pulse the start bit.
    ///
    /// Every step is a full register write, in this order: address, control
    /// with start clear, control with start set, dwell, control with start
    /// clear. The start bit is never left asserted.
    pub fn start_transfer(&mut self, desc: &TransferDescriptor) {
        debug!(target: "shim", "start {} addr=0x{:08X} len={}",
            desc.direction().short_name(), desc.address(), desc.length());

        self.out.write(ADDR_CHANNEL, desc.address());

        let mut control = desc.control_word();
        self.write_control(control);

        control.set_start(true);
        self.write_control(control);

        self.clock.sleep_ms(self.config.pulse_dwell_ms);

        control.set_start(false);
        self.write_control(control);
    }

    #[inline(always)]
    fn write_control(&mut self, control: LengthControl) {
        debug!(target: "shim", "len_ctrl <- 0x{:08X}", control.0);
        self.out.write(LEN_CHANNEL, control.0);
        self.last_control = control;
    }

    #[inline(always)]
    pub fn is_done(&self) -> bool {
        self.status.read(STATUS_CHANNEL).get_bit(DONE_BIT)
    }

    /// Poll the done flag every `poll_interval_ms` until it is seen or
    /// `timeout_ms` has elapsed. A zero budget times out without polling.
    pub fn wait_for_completion(&mut self, timeout_ms: u32) -> Completion {
        let started = self.clock.get_now_ms();
        let budget = timeout_ms as u64;

        loop {
            let waited = self.clock.get_now_ms().saturating_sub(started);
            if waited >= budget {
                debug!(target: "shim", "no done flag after {} ms", waited);
                return Completion::TimedOut;
            }
            if self.is_done() {
                debug!(target: "shim", "done after {} ms", waited);
                return Completion::Done;
            }
            self.clock.sleep_ms(self.config.poll_interval_ms);
        }
    }

    /// Start `desc` and wait up to `timeout_ms`, dumping the registers on
    /// timeout. No retry happens here.
    pub fn transfer_with_timeout(
        &mut self,
        desc: &TransferDescriptor,
        timeout_ms: u32,
    ) -> Result<(), ShimError> {
        self.start_transfer(desc);
        match self.wait_for_completion(timeout_ms) {
            Completion::Done => Ok(()),
            Completion::TimedOut => {
                let snapshot = self.debug_status();
                warn!(target: "shim", "{} timeout: {}", desc.direction().short_name(), snapshot);
                Err(ShimError::ProtocolTimeout { timeout_ms, snapshot })
            }
        }
    }

    /// [`ShimDriver::transfer_with_timeout`] with the configured default budget.
    pub fn transfer(&mut self, desc: &TransferDescriptor) -> Result<(), ShimError> {
        self.transfer_with_timeout(desc, self.config.default_timeout_ms)
    }

    /// Read all three channels. Reads have no side effects on the shim.
    pub fn debug_status(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            address: self.out.read(ADDR_CHANNEL),
            len_ctrl: self.out.read(LEN_CHANNEL),
            status: self.status.read(STATUS_CHANNEL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::Channel;
    use crate::regs::Direction;
    use crate::sim::{BusWrite, SimBoard, SimClock, SimGpio, SimParams};

    fn driver(board: &SimBoard) -> ShimDriver<SimGpio, SimGpio, SimClock> {
        ShimDriver::new(board.gpio_out(), board.gpio_in(), board.clock(), ShimConfig::default())
    }

    #[test]
    fn start_is_four_full_writes_with_dwell() {
        let board = SimBoard::new(SimParams::default());
        let mut shim = driver(&board);
        let desc = TransferDescriptor::new(0x1000, 16, Direction::ToStream).unwrap();

        shim.start_transfer(&desc);

        let ctrl = (16 << 2) | (1 << 1);
        assert_eq!(
            board.shim().borrow().writes(),
            &[
                BusWrite { at_ms: 0, channel: Channel::One, value: 0x1000 },
                BusWrite { at_ms: 0, channel: Channel::Two, value: ctrl },
                BusWrite { at_ms: 0, channel: Channel::Two, value: ctrl | 1 },
                BusWrite { at_ms: 1, channel: Channel::Two, value: ctrl },
            ]
        );
        assert!(!shim.last_control().start());
        assert!(!shim.debug_status().start_asserted());
    }

    #[test]
    fn dwell_is_tunable() {
        let board = SimBoard::new(SimParams::default());
        let config = ShimConfig::new(4, ShimConfig::POLL_INTERVAL_MS, ShimConfig::DEFAULT_TIMEOUT_MS).unwrap();
        let mut shim = ShimDriver::new(board.gpio_out(), board.gpio_in(), board.clock(), config);
        shim.start_transfer(&TransferDescriptor::new(0, 4, Direction::FromStream).unwrap());

        let shim_model = board.shim().borrow();
        let writes = shim_model.writes();
        assert_eq!(writes[3].at_ms - writes[2].at_ms, 4);
    }

    #[test]
    fn zero_budget_times_out_before_any_ack() {
        let board = SimBoard::new(SimParams { latency_ms: 0, ..SimParams::default() });
        let mut shim = driver(&board);
        shim.start_transfer(&TransferDescriptor::new(0x1000, 16, Direction::ToStream).unwrap());
        assert_eq!(shim.wait_for_completion(0), Completion::TimedOut);
    }

    #[test]
    fn timeout_lands_within_one_poll() {
        for budget in [1, 2, 7, 50, 333] {
            let board = SimBoard::new(SimParams::default());
            board.shim().borrow_mut().set_stalled(true);
            let mut shim = driver(&board);

            let before = shim.clock().get_now_ms();
            assert_eq!(shim.wait_for_completion(budget), Completion::TimedOut);
            let waited = shim.clock().get_now_ms() - before;
            let poll = shim.config().poll_interval_ms() as u64;
            assert!(waited >= budget as u64 && waited <= budget as u64 + poll, "{budget}: {waited}");
        }
    }

    #[test]
    fn completes_after_latency() {
        let board = SimBoard::new(SimParams { latency_ms: 5, ..SimParams::default() });
        let base = board.params().ddr_base;
        let mut shim = driver(&board);

        let desc = TransferDescriptor::new(base, 32, Direction::ToStream).unwrap();
        shim.transfer(&desc).unwrap();

        let model = board.shim().borrow();
        let latched = model.latched()[0];
        assert_eq!(latched.desc, desc);
        assert_eq!(latched.completed_ms, Some(5));
        assert_eq!(model.stream_len(), 32);
    }

    #[test]
    fn reserved_status_bits_do_not_read_as_done() {
        let board = SimBoard::new(SimParams::default());
        board.shim().borrow_mut().set_reserved_noise(0xFFFF_FFFE);
        board.shim().borrow_mut().set_stalled(true);
        let mut shim = driver(&board);
        assert!(!shim.is_done());
        assert_eq!(shim.wait_for_completion(3), Completion::TimedOut);
    }

    #[test]
    fn timeout_carries_snapshot() {
        let board = SimBoard::new(SimParams::default());
        board.shim().borrow_mut().set_stalled(true);
        let mut shim = driver(&board);
        let desc = TransferDescriptor::new(0x0040_0000, 32, Direction::FromStream).unwrap();

        let err = shim.transfer_with_timeout(&desc, 20).unwrap_err();
        let ShimError::ProtocolTimeout { timeout_ms, snapshot } = err;
        assert_eq!(timeout_ms, 20);
        assert_eq!(snapshot, RegisterSnapshot { address: 0x0040_0000, len_ctrl: 32 << 2, status: 0 });

        // a fresh transfer redefines the state
        board.shim().borrow_mut().set_stalled(false);
        board.shim().borrow_mut().inject_stream(&[0xAA; 32]);
        shim.transfer(&desc).unwrap();
        assert!(shim.is_done());
    }

    #[test]
    fn zero_dwell_is_rejected() {
        assert_eq!(ShimConfig::new(0, 1, 100), Err(ShimConfigError::ZeroPulseDwell));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert_eq!(ShimConfig::new(1, 0, 100), Err(ShimConfigError::ZeroPollInterval));
    }

    #[test]
    fn start_is_held_for_at_least_one_ms() {
        let board = SimBoard::new(SimParams::default());
        let config = ShimConfig::new(1, 1, 10).unwrap().with_timeout_ms(0);
        let mut shim = ShimDriver::new(board.gpio_out(), board.gpio_in(), board.clock(), config);
        shim.start_transfer(&TransferDescriptor::new(0, 4, Direction::ToStream).unwrap());

        let model = board.shim().borrow();
        let writes = model.writes();
        assert!(writes[3].at_ms > writes[2].at_ms);
    }

    #[test]
    fn stalled_wait_returns_with_slowest_poll() {
        let board = SimBoard::new(SimParams::default());
        board.shim().borrow_mut().set_stalled(true);
        let config = ShimConfig::new(1, 7, 10).unwrap();
        let mut shim = ShimDriver::new(board.gpio_out(), board.gpio_in(), board.clock(), config);

        assert_eq!(shim.wait_for_completion(10), Completion::TimedOut);
        assert_eq!(shim.clock().get_now_ms(), 14);
    }
}
