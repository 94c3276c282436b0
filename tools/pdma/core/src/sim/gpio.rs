use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use super::shim::ShimCore;
use crate::gpio::{Channel, GpioBank};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Control,
    Status,
}

/// A GPIO bank wired to the shim model. The control bank reads back what
/// was written; the status bank ignores writes.
pub struct SimGpio {
    side: Side,
    shim: Rc<RefCell<ShimCore>>,
    now: Rc<Cell<u64>>,
}

impl SimGpio {
    pub(super) fn control(shim: Rc<RefCell<ShimCore>>, now: Rc<Cell<u64>>) -> Self {
        Self { side: Side::Control, shim, now }
    }

    pub(super) fn status(shim: Rc<RefCell<ShimCore>>, now: Rc<Cell<u64>>) -> Self {
        Self { side: Side::Status, shim, now }
    }
}

impl GpioBank for SimGpio {
    fn read(&self, channel: Channel) -> u32 {
        let shim = self.shim.borrow();
        match (self.side, channel) {
            (Side::Control, channel) => shim.output(channel),
            (Side::Status, Channel::One) => shim.status(),
            (Side::Status, Channel::Two) => 0,
        }
    }

    fn write(&mut self, channel: Channel, value: u32) {
        if self.side == Side::Control {
            self.shim.borrow_mut().write(channel, value, self.now.get());
        }
    }
}
