//! Register map of the pseudo-DMA shim.
//!
//! | Bank   | Channel | Bits    | Meaning                                  |
//! |--------|---------|---------|------------------------------------------|
//! | output | 1       | 31..0   | DDR byte address of the transfer         |
//! | output | 2       | 0       | start (rising edge triggers the shim)    |
//! | output | 2       | 1       | direction: 1 = MM2S, 0 = S2MM            |
//! | output | 2       | 31..2   | length in bytes                          |
//! | input  | 1       | 0       | transfer done; all other bits reserved   |

use core::fmt;

use bit_field::BitField;
use bitfield::bitfield;
use thiserror::Error;

use crate::gpio::Channel;

pub const ADDR_CHANNEL: Channel = Channel::One;
pub const LEN_CHANNEL: Channel = Channel::Two;
pub const STATUS_CHANNEL: Channel = Channel::One;

pub const START_BIT: usize = 0;
pub const DIRECTION_BIT: usize = 1;
pub const LENGTH_SHIFT: usize = 2;
pub const LENGTH_BITS: usize = 30;
pub const DONE_BIT: usize = 0;

/// Largest length the 30-bit field can carry.
pub const MAX_LENGTH: u32 = (1 << LENGTH_BITS) - 1;

bitfield! {
    /// Image of output channel 2: `{length[29:0], direction, start}`.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct LengthControl(u32);
    impl Debug;
    pub start, set_start: 0;
    pub to_stream, set_to_stream: 1;
    pub length, set_length: 31, 2;
}

bitfield! {
    /// Input channel 1. Only bit 0 is defined.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct Status(u32);
    impl Debug;
    pub done, _: 0;
}

/// Which way the payload moves relative to DDR.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// MM2S: DDR to the AXI-Stream sink.
    ToStream,
    /// S2MM: AXI-Stream source to DDR.
    FromStream,
}

impl Direction {
    #[inline(always)]
    pub fn bit(self) -> bool {
        matches!(self, Direction::ToStream)
    }

    #[inline(always)]
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Direction::ToStream
        } else {
            Direction::FromStream
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Direction::ToStream => "MM2S",
            Direction::FromStream => "S2MM",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("length {0} does not fit the 30-bit length field")]
    LengthOverflow(u32),
    #[error("region 0x{address:08X}+{length} wraps the 32-bit bus")]
    AddressOverflow { address: u32, length: u32 },
}

/// One transfer request. Immutable once built; the driver encodes it into
/// the two output channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransferDescriptor {
    address: u32,
    length: u32,
    direction: Direction,
}

impl TransferDescriptor {
    pub fn new(address: u32, length: u32, direction: Direction) -> Result<Self, DescriptorError> {
        if length > MAX_LENGTH {
            return Err(DescriptorError::LengthOverflow(length));
        }
        if address.checked_add(length).is_none() {
            return Err(DescriptorError::AddressOverflow { address, length });
        }
        Ok(Self { address, length, direction })
    }

    #[inline(always)]
    pub fn address(&self) -> u32 {
        self.address
    }

    #[inline(always)]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[inline(always)]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Channel 2 value with the start bit clear.
    pub fn control_word(&self) -> LengthControl {
        let mut word = LengthControl(0);
        word.set_length(self.length);
        word.set_to_stream(self.direction.bit());
        word
    }

    /// Inverse of `(address, control_word())`. The start bit is ignored.
    pub fn decode(address: u32, control: LengthControl) -> Self {
        Self {
            address,
            length: control.length(),
            direction: Direction::from_bit(control.to_stream()),
        }
    }
}

/// Raw values of all three channels, for failure triage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub address: u32,
    pub len_ctrl: u32,
    pub status: u32,
}

impl RegisterSnapshot {
    pub fn done(&self) -> bool {
        self.status.get_bit(DONE_BIT)
    }

    pub fn start_asserted(&self) -> bool {
        self.len_ctrl.get_bit(START_BIT)
    }
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "addr=0x{:08X} len_ctrl=0x{:08X} status=0x{:08X}",
            self.address, self.len_ctrl, self.status
        )
    }
}
