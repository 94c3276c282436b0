#![allow(dead_code)]

use pdma_core::cache::DmaBuffer;
use pdma_core::compose::{SourceImage, TextSource};
use pdma_core::framebuffer::FrameBuffer;
use pdma_core::layout::Layout;
use pdma_core::session::Session;
use pdma_core::sim::{SimBoard, SimCache, SimClock, SimGpio, SimParams, SimVdma};
use pdma_core::{ShimConfig, ShimDriver};

pub type SimSession = Session<SimGpio, SimGpio, SimClock, SimCache, SimVdma>;

pub struct Rig {
    pub board: SimBoard,
    pub layout: Layout,
    pub frame: FrameBuffer,
    pub text: TextSource,
    pub rx: DmaBuffer,
}

impl Rig {
    pub fn new(params: SimParams) -> Self {
        let layout = Layout::default();
        Self {
            board: SimBoard::new(params),
            frame: FrameBuffer::alloc(layout.h_res, layout.v_res, layout.frame_base),
            text: TextSource::zeroed(layout.text_base, layout.text_len as usize),
            rx: DmaBuffer::zeroed(layout.rx_base, layout.packet_len as usize),
            layout,
        }
    }

    pub fn session(&self, config: ShimConfig) -> SimSession {
        self.session_with(config, self.board.vdma())
    }

    pub fn session_with(&self, config: ShimConfig, vdma: SimVdma) -> SimSession {
        let shim = ShimDriver::new(self.board.gpio_out(), self.board.gpio_in(), self.board.clock(), config);
        Session::new(shim, self.board.cache(), vdma, self.layout)
    }

    /// What the classifier would leave in the text region.
    pub fn classify(&self, label: &str) {
        let mut bytes = label.as_bytes().to_vec();
        bytes.push(0);
        assert!(self.board.ddr().borrow_mut().write(self.layout.text_base, &bytes));
    }
}

pub fn test_image() -> SourceImage {
    SourceImage::from_fn(96, 64, |x, y| 0xFF00_0000 | (x * 2) << 16 | (y * 3) << 8 | (x ^ y)).unwrap()
}
