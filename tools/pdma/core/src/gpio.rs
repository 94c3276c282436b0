use log::debug;
use volatile_register::RW;

/// One of the two 32-bit channels of an AXI GPIO bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    One,
    Two,
}

/// A two-channel general purpose register bank.
///
/// Implementors are single-owner handles: they are created once by an
/// explicit init step and moved into whichever driver uses them.
pub trait GpioBank {
    fn read(&self, channel: Channel) -> u32;
    fn write(&mut self, channel: Channel, value: u32);
}

/// AXI GPIO register block.
///
/// GPIO_DATA 0x00
/// GPIO_TRI 0x04
/// GPIO2_DATA 0x08
/// GPIO2_TRI 0x0C
#[repr(C)]
pub struct AxiGpioRegs {
    pub data: RW<u32>,
    pub tri: RW<u32>,
    pub data2: RW<u32>,
    pub tri2: RW<u32>,
}

const _: () = assert!(core::mem::offset_of!(AxiGpioRegs, tri2) == 0x0C);

/// Owned handle on one memory-mapped AXI GPIO bank.
pub struct AxiGpio {
    regs: &'static mut AxiGpioRegs,
}

impl AxiGpio {
    /// Claim the bank at `base` with both channels driven as outputs.
    ///
    /// # Safety
    /// `base` must point at an AXI GPIO register block and no other handle
    /// for it may exist.
    pub unsafe fn output(base: usize) -> Self {
        let gpio = unsafe { Self::claim(base) };
        unsafe {
            gpio.regs.tri.write(0x0000_0000);
            gpio.regs.tri2.write(0x0000_0000);
        }
        debug!(target: "gpio", "claimed output bank at 0x{:08X}", base);
        gpio
    }

    /// Claim the bank at `base` with channel 1 bit 0 as an input.
    ///
    /// # Safety
    /// Same contract as [`AxiGpio::output`].
    pub unsafe fn input(base: usize) -> Self {
        let gpio = unsafe { Self::claim(base) };
        unsafe { gpio.regs.tri.write(0x0000_0001) };
        debug!(target: "gpio", "claimed input bank at 0x{:08X}", base);
        gpio
    }

    #[inline(always)]
    unsafe fn claim(base: usize) -> Self {
        Self { regs: unsafe { &mut *(base as *mut AxiGpioRegs) } }
    }
}

impl GpioBank for AxiGpio {
    #[inline(always)]
    fn read(&self, channel: Channel) -> u32 {
        match channel {
            Channel::One => self.regs.data.read(),
            Channel::Two => self.regs.data2.read(),
        }
    }

    #[inline(always)]
    fn write(&mut self, channel: Channel, value: u32) {
        unsafe {
            match channel {
                Channel::One => self.regs.data.write(value),
                Channel::Two => self.regs.data2.write(value),
            }
        }
    }
}
