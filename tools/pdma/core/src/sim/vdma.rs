use alloc::vec;
use alloc::vec::Vec;
use log::debug;

use super::ddr::SharedDdr;
use crate::video::{EngineFault, ReadSetup, VideoEngine, MAX_FRAME_STORES};

/// Video engine model. Once running and parked it scans its frame store
/// straight out of DDR, so it only ever sees what was cleaned.
pub struct SimVdma {
    ddr: SharedDdr,
    setup: Option<ReadSetup>,
    addresses: Vec<u32>,
    running: bool,
    parked: Option<u8>,
    reject_config: bool,
    refuse_start: bool,
}

impl SimVdma {
    pub(super) fn new(ddr: SharedDdr) -> Self {
        Self {
            ddr,
            setup: None,
            addresses: Vec::new(),
            running: false,
            parked: None,
            reject_config: false,
            refuse_start: false,
        }
    }

    pub fn set_reject_config(&mut self, reject: bool) {
        self.reject_config = reject;
    }

    pub fn set_refuse_start(&mut self, refuse: bool) {
        self.refuse_start = refuse;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn parked(&self) -> Option<u8> {
        self.parked
    }

    pub fn setup(&self) -> Option<&ReadSetup> {
        self.setup.as_ref()
    }

    /// The frame currently on screen as 32-bit pixels, `hsize / 4` per line.
    /// `None` unless the engine is running and parked.
    pub fn scanout(&self) -> Option<Vec<u32>> {
        let setup = self.setup.as_ref()?;
        if !self.running {
            return None;
        }
        let base = *self.addresses.get(self.parked? as usize)?;

        let ddr = self.ddr.borrow();
        let mut line = vec![0u8; setup.hsize as usize];
        let mut pixels = Vec::with_capacity((setup.hsize / 4 * setup.vsize) as usize);
        for y in 0..setup.vsize {
            if !ddr.read(base + y * setup.stride, &mut line) {
                return None;
            }
            pixels.extend(line.chunks_exact(4).map(|px| u32::from_le_bytes([px[0], px[1], px[2], px[3]])));
        }
        Some(pixels)
    }
}

impl VideoEngine for SimVdma {
    fn configure_read(&mut self, setup: &ReadSetup) -> Result<(), EngineFault> {
        if self.reject_config {
            return Err(EngineFault::Rejected { what: "read setup" });
        }
        if setup.stride < setup.hsize || setup.frame_stores as usize > MAX_FRAME_STORES {
            return Err(EngineFault::Rejected { what: "read setup" });
        }
        self.setup = Some(*setup);
        self.running = false;
        self.parked = None;
        Ok(())
    }

    fn set_frame_stores(&mut self, addresses: &[u32]) -> Result<(), EngineFault> {
        let Some(setup) = self.setup else {
            return Err(EngineFault::Rejected { what: "frame stores before setup" });
        };
        if addresses.len() != setup.frame_stores as usize {
            return Err(EngineFault::Rejected { what: "frame store count" });
        }
        let span = setup.stride as usize * setup.vsize as usize;
        if addresses.iter().any(|a| !self.ddr.borrow().contains(*a, span)) {
            return Err(EngineFault::Rejected { what: "frame store address" });
        }
        self.addresses = addresses.to_vec();
        Ok(())
    }

    fn start_read(&mut self) -> Result<(), EngineFault> {
        if self.refuse_start || self.addresses.is_empty() {
            return Err(EngineFault::StillHalted { status: 1 });
        }
        self.running = true;
        if self.setup.is_some_and(|s| s.circular) {
            self.parked = None;
        }
        debug!(target: "sim::vdma", "running");
        Ok(())
    }

    fn park_read(&mut self, frame_index: u8) -> Result<(), EngineFault> {
        if frame_index as usize >= self.addresses.len() {
            return Err(EngineFault::Rejected { what: "park index" });
        }
        self.parked = Some(frame_index);
        debug!(target: "sim::vdma", "parked on {}", frame_index);
        Ok(())
    }
}
