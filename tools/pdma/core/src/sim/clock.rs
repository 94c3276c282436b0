use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use super::shim::ShimCore;
use crate::clock::TimeDaemon;

/// Fake millisecond clock. Hardware time only moves when someone sleeps,
/// one millisecond at a time, and the shim model is ticked on every step.
pub struct SimClock {
    now: Rc<Cell<u64>>,
    shim: Rc<RefCell<ShimCore>>,
}

impl SimClock {
    pub(super) fn new(now: Rc<Cell<u64>>, shim: Rc<RefCell<ShimCore>>) -> Self {
        Self { now, shim }
    }

    pub fn advance(&mut self, ms: u32) {
        for _ in 0..ms {
            self.now.set(self.now.get() + 1);
            self.shim.borrow_mut().tick(self.now.get());
        }
    }
}

impl TimeDaemon for SimClock {
    fn get_now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.advance(ms);
    }
}
