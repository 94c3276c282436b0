//! # AXI VDMA read channel
//!
//! Only the MM2S (memory to stream) half of the engine is driven. The
//! programming order is the one the engine requires:
//!
//! 1. control (park/circular, frame count), frame store count, stride, hsize
//! 2. frame store start addresses
//! 3. run/stop set, wait for halted to clear
//! 4. vsize, which kicks off the first fetch
//! 5. park pointer, then circular/park cleared to park

use bitfield::bitfield;
use log::debug;
use volatile_register::{RO, RW};

use super::{EngineFault, ReadSetup, VideoEngine, MAX_FRAME_STORES};

/// MM2S register block, offsets from the engine base.
#[repr(C)]
pub struct AxiVdmaRegs {
    /// 0x00 MM2S_VDMACR
    pub control: RW<u32>,
    /// 0x04 MM2S_VDMASR
    pub status: RO<u32>,
    _reserved0: [u32; 3],
    /// 0x14 MM2S_REG_INDEX
    pub reg_index: RW<u32>,
    /// 0x18 MM2S_FRMSTORE
    pub frame_stores: RW<u32>,
    /// 0x1C MM2S_THRESHOLD
    pub threshold: RW<u32>,
    _reserved1: u32,
    /// 0x24 MM2S frame pointer status
    pub frame_ptr_status: RO<u32>,
    /// 0x28 PARK_PTR_REG
    pub park_ptr: RW<u32>,
    /// 0x2C VDMA_VERSION
    pub version: RO<u32>,
    _reserved2: [u32; 8],
    /// 0x50 MM2S_VSIZE
    pub vsize: RW<u32>,
    /// 0x54 MM2S_HSIZE
    pub hsize: RW<u32>,
    /// 0x58 MM2S_FRMDLY_STRIDE
    pub frame_delay_stride: RW<u32>,
    /// 0x5C.. MM2S_START_ADDRESS1..16
    pub start_address: [RW<u32>; MAX_FRAME_STORES],
}

const _: () = assert!(core::mem::offset_of!(AxiVdmaRegs, reg_index) == 0x14);
const _: () = assert!(core::mem::offset_of!(AxiVdmaRegs, park_ptr) == 0x28);
const _: () = assert!(core::mem::offset_of!(AxiVdmaRegs, vsize) == 0x50);
const _: () = assert!(core::mem::offset_of!(AxiVdmaRegs, start_address) == 0x5C);

bitflags::bitflags! {
    /// MM2S_VDMACR.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ControlFlags: u32 {
        /// Run/stop.
        const RUN                 = 1 << 0;
        /// Set: cycle through frame stores. Clear: park.
        const CIRCULAR_PARK       = 1 << 1;
        const RESET               = 1 << 2;
        const GENLOCK_EN          = 1 << 3;
        const FRAME_CNT_EN        = 1 << 4;
    }

    /// MM2S_VDMASR.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        const HALTED              = 1 << 0;
        const INTERNAL_ERR        = 1 << 4;
        const SLAVE_ERR           = 1 << 5;
        const DECODE_ERR          = 1 << 6;
    }
}

impl StatusFlags {
    const ERRORS: Self = Self::INTERNAL_ERR.union(Self::SLAVE_ERR).union(Self::DECODE_ERR);
}

bitfield! {
    /// MM2S_FRMDLY_STRIDE.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct FrameDelayStride(u32);
    impl Debug;
    pub stride, set_stride: 15, 0;
    pub frame_delay, set_frame_delay: 28, 24;
}

bitfield! {
    /// PARK_PTR_REG. The frame store fields are read-only.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct ParkPointer(u32);
    impl Debug;
    pub read_ref, set_read_ref: 4, 0;
    pub write_ref, set_write_ref: 12, 8;
    pub read_store, _: 20, 16;
    pub write_store, _: 28, 24;
}

/// Widest value of the 16-bit size/stride fields.
const MAX_LINE_BYTES: u32 = 0xFFFF;
/// Widest value of the 13-bit vsize field.
const MAX_LINES: u32 = 0x1FFF;
/// Status reads before giving up on the halted bit.
const HALT_POLL_LIMIT: u32 = 10_000;

/// Owned handle on the engine's MM2S channel.
pub struct AxiVdma {
    regs: &'static mut AxiVdmaRegs,
    vsize: u32,
}

impl AxiVdma {
    /// # Safety
    /// `base` must point at an AXI VDMA register block and no other handle
    /// for it may exist.
    pub unsafe fn new(base: usize) -> Self {
        debug!(target: "vdma", "claimed engine at 0x{:08X}", base);
        Self { regs: unsafe { &mut *(base as *mut AxiVdmaRegs) }, vsize: 0 }
    }

    #[inline(always)]
    pub fn status(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.regs.status.read())
    }

    #[inline(always)]
    fn control(&self) -> ControlFlags {
        ControlFlags::from_bits_retain(self.regs.control.read())
    }

    #[inline(always)]
    fn set_control(&mut self, flags: ControlFlags) {
        debug!(target: "vdma", "cr <- 0x{:08X}", flags.bits());
        unsafe { self.regs.control.write(flags.bits()) };
    }
}

impl VideoEngine for AxiVdma {
    fn configure_read(&mut self, setup: &ReadSetup) -> Result<(), EngineFault> {
        if setup.hsize > MAX_LINE_BYTES || setup.stride > MAX_LINE_BYTES {
            return Err(EngineFault::Rejected { what: "line size" });
        }
        if setup.vsize > MAX_LINES {
            return Err(EngineFault::Rejected { what: "line count" });
        }
        if setup.frame_stores == 0 || setup.frame_stores as usize > MAX_FRAME_STORES {
            return Err(EngineFault::Rejected { what: "frame store count" });
        }

        let mut control = self.control() - ControlFlags::RUN - ControlFlags::GENLOCK_EN;
        control.set(ControlFlags::CIRCULAR_PARK, setup.circular);
        control.remove(ControlFlags::FRAME_CNT_EN);
        self.set_control(control);

        let mut delay_stride = FrameDelayStride(0);
        delay_stride.set_stride(setup.stride);
        unsafe {
            self.regs.frame_stores.write(setup.frame_stores as u32);
            self.regs.frame_delay_stride.write(delay_stride.0);
            self.regs.hsize.write(setup.hsize);
        }
        self.vsize = setup.vsize;
        Ok(())
    }

    fn set_frame_stores(&mut self, addresses: &[u32]) -> Result<(), EngineFault> {
        if addresses.len() > MAX_FRAME_STORES {
            return Err(EngineFault::Rejected { what: "frame store count" });
        }
        for (slot, address) in self.regs.start_address.iter().zip(addresses) {
            unsafe { slot.write(*address) };
        }
        debug!(target: "vdma", "{} frame store address(es) written", addresses.len());
        Ok(())
    }

    fn start_read(&mut self) -> Result<(), EngineFault> {
        let control = self.control() | ControlFlags::RUN;
        self.set_control(control);

        let mut polls = 0;
        while self.status().contains(StatusFlags::HALTED) {
            polls += 1;
            if polls >= HALT_POLL_LIMIT {
                return Err(EngineFault::StillHalted { status: self.status().bits() });
            }
        }
        let status = self.status();
        if status.intersects(StatusFlags::ERRORS) {
            return Err(EngineFault::Errors { status: status.bits() });
        }

        unsafe { self.regs.vsize.write(self.vsize) };
        Ok(())
    }

    fn park_read(&mut self, frame_index: u8) -> Result<(), EngineFault> {
        if frame_index as usize >= MAX_FRAME_STORES {
            return Err(EngineFault::Rejected { what: "park index" });
        }
        let mut park = ParkPointer(self.regs.park_ptr.read());
        park.set_read_ref(frame_index as u32);
        unsafe { self.regs.park_ptr.write(park.0) };

        let control = self.control() - ControlFlags::CIRCULAR_PARK;
        self.set_control(control);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    const WORDS: usize = 0x5C / 4 + MAX_FRAME_STORES;

    fn backing() -> *mut [u32; WORDS] {
        Box::into_raw(Box::new([0u32; WORDS]))
    }

    fn word(mem: *mut [u32; WORDS], offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile((mem as *const u32).add(offset / 4)) }
    }

    fn poke(mem: *mut [u32; WORDS], offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile((mem as *mut u32).add(offset / 4), value) }
    }

    const SETUP: ReadSetup = ReadSetup { vsize: 720, hsize: 5120, stride: 5120, circular: false, frame_stores: 1 };

    #[test]
    fn programs_read_channel() {
        let mem = backing();
        let mut vdma = unsafe { AxiVdma::new(mem as usize) };
        poke(mem, 0x28, 0x0102_0000);

        vdma.configure_read(&SETUP).unwrap();
        vdma.set_frame_stores(&[0x1010_0000]).unwrap();
        assert_eq!(word(mem, 0x50), 0, "vsize written before start");

        vdma.start_read().unwrap();
        vdma.park_read(0).unwrap();

        assert_eq!(word(mem, 0x00), ControlFlags::RUN.bits());
        assert_eq!(word(mem, 0x18), 1);
        assert_eq!(word(mem, 0x50), 720);
        assert_eq!(word(mem, 0x54), 5120);
        assert_eq!(word(mem, 0x58) & 0xFFFF, 5120);
        assert_eq!(word(mem, 0x5C), 0x1010_0000);
        assert_eq!(word(mem, 0x28), 0x0102_0000);
    }

    #[test]
    fn stuck_halt_is_reported() {
        let mem = backing();
        poke(mem, 0x04, StatusFlags::HALTED.bits());
        let mut vdma = unsafe { AxiVdma::new(mem as usize) };
        vdma.configure_read(&SETUP).unwrap();
        assert_eq!(vdma.start_read(), Err(EngineFault::StillHalted { status: 1 }));
        assert_eq!(word(mem, 0x50), 0);
    }

    #[test]
    fn error_bits_fail_start() {
        let mem = backing();
        poke(mem, 0x04, StatusFlags::DECODE_ERR.bits());
        let mut vdma = unsafe { AxiVdma::new(mem as usize) };
        vdma.configure_read(&SETUP).unwrap();
        assert!(matches!(vdma.start_read(), Err(EngineFault::Errors { .. })));
    }

    #[test]
    fn oversize_lines_rejected() {
        let mem = backing();
        let mut vdma = unsafe { AxiVdma::new(mem as usize) };
        let wide = ReadSetup { hsize: 0x1_0000, stride: 0x1_0000, ..SETUP };
        assert!(vdma.configure_read(&wide).is_err());
        assert_eq!(word(mem, 0x54), 0);
    }
}
