use alloc::vec;
use alloc::vec::Vec;
use bit_field::BitField;
use log::{debug, trace};
use rtrb::{Consumer, Producer, RingBuffer};

use super::ddr::SharedDdr;
use crate::gpio::Channel;
use crate::regs::{Direction, LengthControl, TransferDescriptor, DONE_BIT, START_BIT};

/// One write the CPU made to the output bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusWrite {
    pub at_ms: u64,
    pub channel: Channel,
    pub value: u32,
}

/// A transfer the shim latched on a start edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Latched {
    pub desc: TransferDescriptor,
    pub at_ms: u64,
    pub completed_ms: Option<u64>,
}

/// Behavioural model of the pseudo-DMA shim.
///
/// A rising edge on the start bit latches the address and length/control
/// channels and clears done. After `latency_ms` the payload moves: MM2S
/// pushes DDR bytes into the stream FIFO, S2MM pops them back into DDR. A
/// transfer that cannot make progress (FIFO full, FIFO short, bus error,
/// stalled sink) stays pending and done never rises.
pub struct ShimCore {
    ddr: SharedDdr,
    latency_ms: u32,
    address: u32,
    len_ctrl: u32,
    done: bool,
    reserved_noise: u32,
    stall_until: u64,
    pending: Option<usize>,
    latched: Vec<Latched>,
    writes: Vec<BusWrite>,
    tx: Producer<u8>,
    rx: Consumer<u8>,
}

impl ShimCore {
    pub fn new(ddr: SharedDdr, latency_ms: u32, fifo_bytes: usize) -> Self {
        let (tx, rx) = RingBuffer::new(fifo_bytes);
        Self {
            ddr,
            latency_ms,
            address: 0,
            len_ctrl: 0,
            done: false,
            reserved_noise: 0,
            stall_until: 0,
            pending: None,
            latched: Vec::new(),
            writes: Vec::new(),
            tx,
            rx,
        }
    }

    /// While stalled nothing completes, like a sink that never asserts ready.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stall_until = if stalled { u64::MAX } else { 0 };
    }

    /// Stall until hardware time reaches `now_ms`.
    pub fn stall_until(&mut self, now_ms: u64) {
        self.stall_until = now_ms;
    }

    /// Garbage in the reserved status bits.
    pub fn set_reserved_noise(&mut self, bits: u32) {
        let mut bits = bits;
        bits.set_bit(DONE_BIT, false);
        self.reserved_noise = bits;
    }

    /// Feed the stream source directly, as if an upstream block produced data.
    pub fn inject_stream(&mut self, bytes: &[u8]) -> usize {
        bytes.iter().take_while(|b| self.tx.push(**b).is_ok()).count()
    }

    /// Bytes waiting in the stream FIFO.
    pub fn stream_len(&self) -> usize {
        self.rx.slots()
    }

    pub fn writes(&self) -> &[BusWrite] {
        &self.writes
    }

    pub fn latched(&self) -> &[Latched] {
        &self.latched
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn output(&self, channel: Channel) -> u32 {
        match channel {
            Channel::One => self.address,
            Channel::Two => self.len_ctrl,
        }
    }

    pub fn status(&self) -> u32 {
        self.reserved_noise | self.done as u32
    }

    pub fn write(&mut self, channel: Channel, value: u32, now_ms: u64) {
        self.writes.push(BusWrite { at_ms: now_ms, channel, value });
        match channel {
            Channel::One => self.address = value,
            Channel::Two => {
                let rising = !self.len_ctrl.get_bit(START_BIT) && value.get_bit(START_BIT);
                self.len_ctrl = value;
                if rising {
                    self.latch(now_ms);
                }
            }
        }
    }

    fn latch(&mut self, now_ms: u64) {
        let desc = TransferDescriptor::decode(self.address, LengthControl(self.len_ctrl));
        debug!(target: "sim::shim", "latched {} 0x{:08X}+{} at {} ms",
            desc.direction().short_name(), desc.address(), desc.length(), now_ms);
        if self.pending.is_some() {
            debug!(target: "sim::shim", "previous transfer abandoned");
        }
        self.done = false;
        self.latched.push(Latched { desc, at_ms: now_ms, completed_ms: None });
        self.pending = Some(self.latched.len() - 1);
    }

    /// Advance the model to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        let Some(index) = self.pending else {
            return;
        };
        let Latched { desc, at_ms, .. } = self.latched[index];
        if now_ms < self.stall_until || now_ms < at_ms + self.latency_ms as u64 {
            return;
        }
        if self.move_payload(&desc) {
            trace!(target: "sim::shim", "done at {} ms", now_ms);
            self.latched[index].completed_ms = Some(now_ms);
            self.pending = None;
            self.done = true;
        }
    }

    fn move_payload(&mut self, desc: &TransferDescriptor) -> bool {
        let len = desc.length() as usize;
        match desc.direction() {
            Direction::ToStream => {
                if self.tx.slots() < len {
                    return false;
                }
                let mut payload = vec![0u8; len];
                if !self.ddr.borrow().read(desc.address(), &mut payload) {
                    return false;
                }
                payload.iter().all(|b| self.tx.push(*b).is_ok())
            }
            Direction::FromStream => {
                if self.rx.slots() < len {
                    return false;
                }
                let mut payload = vec![0u8; len];
                if !self.ddr.borrow().contains(desc.address(), len) {
                    return false;
                }
                for b in payload.iter_mut() {
                    match self.rx.pop() {
                        Ok(v) => *b = v,
                        Err(_) => return false,
                    }
                }
                self.ddr.borrow_mut().write(desc.address(), &payload)
            }
        }
    }
}
