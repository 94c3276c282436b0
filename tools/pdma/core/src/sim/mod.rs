//! # Board simulator
//!
//! Deterministic stand-ins for everything the driver talks to:
//!
//! | Model       | Implements           | Behaviour                                  |
//! |-------------|----------------------|--------------------------------------------|
//! | [`SimGpio`] | `GpioBank`           | output/input banks wired to [`ShimCore`]   |
//! | [`SimClock`]| `TimeDaemon`         | advances only on sleep, ticks the shim     |
//! | [`SimCache`]| `CacheMaintenance`   | clean copies out to DDR, invalidate in     |
//! | [`SimVdma`] | `VideoEngine`        | scans the parked frame store out of DDR    |
//!
//! The shim's MM2S side feeds an AXI-Stream loopback FIFO that its S2MM
//! side drains, so a TX transfer followed by an RX transfer round-trips the
//! payload.

mod cache;
mod clock;
mod ddr;
mod gpio;
mod shim;
mod vdma;

pub use cache::SimCache;
pub use clock::SimClock;
pub use ddr::{Ddr, SharedDdr};
pub use gpio::SimGpio;
pub use shim::{BusWrite, Latched, ShimCore};
pub use vdma::SimVdma;

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use crate::layout::DDR_BASE;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimParams {
    pub ddr_base: u32,
    pub ddr_len: u32,
    /// Time from the start edge to the payload moving.
    pub latency_ms: u32,
    pub fifo_bytes: usize,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            ddr_base: DDR_BASE,
            ddr_len: 0x2000_0000,
            latency_ms: 3,
            fifo_bytes: 4096,
        }
    }
}

/// Shared state of one simulated board. Handles created from it all see the
/// same DDR, shim and time.
pub struct SimBoard {
    params: SimParams,
    ddr: SharedDdr,
    shim: Rc<RefCell<ShimCore>>,
    now: Rc<Cell<u64>>,
}

impl SimBoard {
    pub fn new(params: SimParams) -> Self {
        let ddr = Ddr::shared(params.ddr_base, params.ddr_len);
        let shim = ShimCore::new(ddr.clone(), params.latency_ms, params.fifo_bytes);
        Self {
            params,
            ddr,
            shim: Rc::new(RefCell::new(shim)),
            now: Rc::new(Cell::new(0)),
        }
    }

    #[inline(always)]
    pub fn params(&self) -> &SimParams {
        &self.params
    }

    #[inline(always)]
    pub fn ddr(&self) -> &SharedDdr {
        &self.ddr
    }

    #[inline(always)]
    pub fn shim(&self) -> &Rc<RefCell<ShimCore>> {
        &self.shim
    }

    pub fn now_ms(&self) -> u64 {
        self.now.get()
    }

    /// Address and length/control bank.
    pub fn gpio_out(&self) -> SimGpio {
        SimGpio::control(self.shim.clone(), self.now.clone())
    }

    /// Status bank.
    pub fn gpio_in(&self) -> SimGpio {
        SimGpio::status(self.shim.clone(), self.now.clone())
    }

    pub fn clock(&self) -> SimClock {
        SimClock::new(self.now.clone(), self.shim.clone())
    }

    pub fn cache(&self) -> SimCache {
        SimCache::new(self.ddr.clone())
    }

    pub fn vdma(&self) -> SimVdma {
        SimVdma::new(self.ddr.clone())
    }
}
