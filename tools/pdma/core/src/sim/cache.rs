use super::ddr::SharedDdr;
use crate::cache::CacheMaintenance;

/// Write-back cache model. The CPU's buffers are the cached copy and DDR is
/// what the devices see: a clean copies the buffer out, an invalidate
/// copies DDR in. Nothing else moves data between the two.
pub struct SimCache {
    ddr: SharedDdr,
    cleans: usize,
    invalidates: usize,
    bus_errors: usize,
}

impl SimCache {
    pub(super) fn new(ddr: SharedDdr) -> Self {
        Self { ddr, cleans: 0, invalidates: 0, bus_errors: 0 }
    }

    pub fn cleans(&self) -> usize {
        self.cleans
    }

    pub fn invalidates(&self) -> usize {
        self.invalidates
    }

    /// Maintenance calls on ranges DDR does not back.
    pub fn bus_errors(&self) -> usize {
        self.bus_errors
    }
}

impl CacheMaintenance for SimCache {
    fn clean(&mut self, bytes: &[u8], bus_addr: u32) {
        self.cleans += 1;
        if !self.ddr.borrow_mut().write(bus_addr, bytes) {
            self.bus_errors += 1;
        }
    }

    fn invalidate(&mut self, bytes: &mut [u8], bus_addr: u32) {
        self.invalidates += 1;
        if !self.ddr.borrow().read(bus_addr, bytes) {
            self.bus_errors += 1;
        }
    }
}
