//! # Coherency boundary
//!
//! The CPU sees DDR through its data cache, the shim and the video engine
//! do not. Every hand-off of a shared buffer therefore goes through one of
//! two calls:
//!
//! | Call        | When                                      | Cache op    |
//! |-------------|-------------------------------------------|-------------|
//! | [`publish`] | CPU wrote, a device will read             | clean       |
//! | [`acquire`] | a device wrote, the CPU will read         | invalidate  |
//!
//! Both are idempotent. Forgetting either does not fail loudly: the device
//! reads stale DDR or the CPU reads stale lines.

use alloc::vec;
use alloc::vec::Vec;
use log::debug;

/// Cache maintenance by address range.
///
/// `bus_addr` is the address the devices use for `bytes`. On the board it is
/// the same as `bytes.as_ptr()`; the simulator uses it to find the DDR copy.
pub trait CacheMaintenance {
    /// Write dirty lines covering `bytes` back to memory.
    fn clean(&mut self, bytes: &[u8], bus_addr: u32);
    /// Drop lines covering `bytes` so the next read comes from memory.
    fn invalidate(&mut self, bytes: &mut [u8], bus_addr: u32);
}

impl<C: CacheMaintenance + ?Sized> CacheMaintenance for &mut C {
    fn clean(&mut self, bytes: &[u8], bus_addr: u32) {
        (**self).clean(bytes, bus_addr)
    }

    fn invalidate(&mut self, bytes: &mut [u8], bus_addr: u32) {
        (**self).invalidate(bytes, bus_addr)
    }
}

/// Anything with a fixed bus address that a device reads or writes.
pub trait DmaRegion {
    fn bus_addr(&self) -> u32;
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];

    #[inline(always)]
    fn byte_len(&self) -> u32 {
        self.bytes().len() as u32
    }
}

/// Make CPU writes to `region` visible to devices.
pub fn publish<C: CacheMaintenance, R: DmaRegion + ?Sized>(cache: &mut C, region: &R) {
    debug!(target: "cache", "publish 0x{:08X}+{}", region.bus_addr(), region.byte_len());
    cache.clean(region.bytes(), region.bus_addr());
}

/// Make device writes to `region` visible to the CPU.
pub fn acquire<C: CacheMaintenance, R: DmaRegion + ?Sized>(cache: &mut C, region: &mut R) {
    debug!(target: "cache", "acquire 0x{:08X}+{}", region.bus_addr(), region.byte_len());
    let bus_addr = region.bus_addr();
    cache.invalidate(region.bytes_mut(), bus_addr);
}

/// A byte buffer at a fixed bus address: TX/RX payloads, the text region.
pub struct DmaBuffer<S = Vec<u8>> {
    bus_addr: u32,
    storage: S,
}

impl DmaBuffer<Vec<u8>> {
    /// Zeroed host-side buffer standing in for `len` bytes at `bus_addr`.
    pub fn zeroed(bus_addr: u32, len: usize) -> Self {
        Self { bus_addr, storage: vec![0; len] }
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> DmaBuffer<S> {
    pub fn new(bus_addr: u32, storage: S) -> Self {
        Self { bus_addr, storage }
    }

    pub fn fill(&mut self, value: u8) {
        self.storage.as_mut().fill(value);
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> DmaRegion for DmaBuffer<S> {
    #[inline(always)]
    fn bus_addr(&self) -> u32 {
        self.bus_addr
    }

    #[inline(always)]
    fn bytes(&self) -> &[u8] {
        self.storage.as_ref()
    }

    #[inline(always)]
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.storage.as_mut()
    }
}

/// Read-only window into another region, e.g. the image rows inside the
/// frame buffer that feed an MM2S transfer. It can be published, never
/// acquired.
#[derive(Copy, Clone)]
pub struct DmaSlice<'a> {
    bus_addr: u32,
    bytes: &'a [u8],
}

impl<'a> DmaSlice<'a> {
    pub fn new(bus_addr: u32, bytes: &'a [u8]) -> Self {
        Self { bus_addr, bytes }
    }

    #[inline(always)]
    pub fn bus_addr(&self) -> u32 {
        self.bus_addr
    }

    #[inline(always)]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn publish<C: CacheMaintenance>(&self, cache: &mut C) {
        debug!(target: "cache", "publish 0x{:08X}+{}", self.bus_addr, self.bytes.len());
        cache.clean(self.bytes, self.bus_addr);
    }
}

/// L1 data cache of the application core.
///
/// Only the inner cache is maintained. Boards with an outer L2 in the
/// coherency path need their own [`CacheMaintenance`] wrapping this one.
pub struct DataCache;

impl DataCache {
    #[cfg(target_arch = "arm")]
    pub const LINE_SIZE: usize = 32;
    #[cfg(not(target_arch = "arm"))]
    pub const LINE_SIZE: usize = 64;

    #[inline(always)]
    fn lines(start: usize, len: usize) -> impl Iterator<Item = usize> {
        let first = start & !(Self::LINE_SIZE - 1);
        (first..start + len).step_by(Self::LINE_SIZE)
    }

    #[inline(always)]
    fn is_aligned(addr: usize) -> bool {
        addr & (Self::LINE_SIZE - 1) == 0
    }
}

#[cfg(target_arch = "arm")]
mod ops {
    #[inline(always)]
    pub unsafe fn clean_line(addr: usize) {
        // DCCMVAC
        unsafe { core::arch::asm!("mcr p15, 0, {}, c7, c10, 1", in(reg) addr) };
    }

    #[inline(always)]
    pub unsafe fn invalidate_line(addr: usize) {
        // DCIMVAC
        unsafe { core::arch::asm!("mcr p15, 0, {}, c7, c6, 1", in(reg) addr) };
    }

    #[inline(always)]
    pub unsafe fn clean_invalidate_line(addr: usize) {
        // DCCIMVAC
        unsafe { core::arch::asm!("mcr p15, 0, {}, c7, c14, 1", in(reg) addr) };
    }

    #[inline(always)]
    pub fn barrier() {
        unsafe { core::arch::asm!("dsb") };
    }
}

#[cfg(target_arch = "aarch64")]
mod ops {
    #[inline(always)]
    pub unsafe fn clean_line(addr: usize) {
        unsafe { core::arch::asm!("dc cvac, {}", in(reg) addr) };
    }

    #[inline(always)]
    pub unsafe fn invalidate_line(addr: usize) {
        unsafe { core::arch::asm!("dc ivac, {}", in(reg) addr) };
    }

    #[inline(always)]
    pub unsafe fn clean_invalidate_line(addr: usize) {
        unsafe { core::arch::asm!("dc civac, {}", in(reg) addr) };
    }

    #[inline(always)]
    pub fn barrier() {
        unsafe { core::arch::asm!("dsb sy") };
    }
}

// hosts are coherent enough for the memory-backed register tests
#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
mod ops {
    use core::sync::atomic::{fence, Ordering};

    pub unsafe fn clean_line(_addr: usize) {}
    pub unsafe fn invalidate_line(_addr: usize) {}
    pub unsafe fn clean_invalidate_line(_addr: usize) {}

    pub fn barrier() {
        fence(Ordering::SeqCst);
    }
}

impl CacheMaintenance for DataCache {
    fn clean(&mut self, bytes: &[u8], _bus_addr: u32) {
        let start = bytes.as_ptr() as usize;
        ops::barrier();
        for line in Self::lines(start, bytes.len()) {
            unsafe { ops::clean_line(line) };
        }
        ops::barrier();
    }

    fn invalidate(&mut self, bytes: &mut [u8], _bus_addr: u32) {
        let start = bytes.as_mut_ptr() as usize;
        let end = start + bytes.len();
        for line in Self::lines(start, bytes.len()) {
            // partial lines at the edges may hold someone else's dirty data
            let partial = (line < start && !Self::is_aligned(start))
                || (line + Self::LINE_SIZE > end && !Self::is_aligned(end));
            unsafe {
                if partial {
                    ops::clean_invalidate_line(line);
                } else {
                    ops::invalidate_line(line);
                }
            }
        }
        ops::barrier();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_cover_unaligned_range() {
        let line = DataCache::LINE_SIZE;
        let lines: Vec<usize> = DataCache::lines(line + 3, line).collect();
        assert_eq!(lines, vec![line, 2 * line]);
    }
}
