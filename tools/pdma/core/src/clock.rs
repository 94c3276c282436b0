/// Millisecond time source injected into everything that waits.
///
/// On the board this wraps the global timer; on a host it is
/// [`crate::sim::SimClock`], which only advances when somebody sleeps.
pub trait TimeDaemon {
    fn get_now_ms(&self) -> u64;

    /// Busy-wait for at least `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);
}

impl<T: TimeDaemon + ?Sized> TimeDaemon for &mut T {
    #[inline(always)]
    fn get_now_ms(&self) -> u64 {
        (**self).get_now_ms()
    }

    #[inline(always)]
    fn sleep_ms(&mut self, ms: u32) {
        (**self).sleep_ms(ms)
    }
}
