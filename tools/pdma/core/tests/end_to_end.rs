mod common;

use common::{test_image, Rig};
use pdma_core::cache::DmaRegion;
use pdma_core::framebuffer::Owner;
use pdma_core::layout::NUMBER_OF_FRAME_SETS;
use pdma_core::regs::RegisterSnapshot;
use pdma_core::shim::ShimError;
use pdma_core::sim::SimParams;
use pdma_core::video::ConfigError;
use pdma_core::{Error, ShimConfig, Stage};

#[test]
fn full_run_on_the_simulator() {
    let mut rig = Rig::new(SimParams::default());
    rig.classify("Dog: 99%");
    let mut session = rig.session(ShimConfig::default());

    let image = test_image();
    let report = session.run(&mut rig.frame, &image, &mut rig.text, &mut rig.rx);

    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(report.stages.len(), 8);
    assert!(report.stages.iter().all(|s| s.passed));
    assert_eq!(report.label.as_str(), "Dog: 99%");
    assert!(report.verification.passed());
    assert!(!report.snapshot.start_asserted());
    assert!(report.snapshot.done());

    // loopback payload is the first image row
    let tx = rig.frame.slice(rig.layout.image_offset(), rig.layout.packet_len).unwrap();
    assert_eq!(rig.rx.bytes(), tx.bytes());
    assert_eq!(&rig.rx.bytes()[..4], &image.get(0, 0).to_le_bytes());

    // the display shows exactly what was composed
    let vdma = session.video().engine();
    assert_eq!(vdma.parked(), Some(0));
    assert_eq!(vdma.setup().map(|s| s.frame_stores as usize), Some(NUMBER_OF_FRAME_SETS));
    assert_eq!(vdma.scanout().as_deref(), Some(rig.frame.pixels()));
}

#[test]
fn composed_frame_layout() {
    let mut rig = Rig::new(SimParams::default());
    rig.classify("Cat: 51%");
    let mut session = rig.session(ShimConfig::default());
    let image = test_image();
    session.run(&mut rig.frame, &image, &mut rig.text, &mut rig.rx);

    let (ix, iy) = rig.layout.image_pos;
    assert_eq!(rig.frame.get(ix, iy), Some(image.get(0, 0)));
    assert_eq!(rig.frame.get(ix + 223, iy + 223), Some(image.get(95, 63)));
    assert_eq!(rig.frame.get(ix - 1, iy), Some(0));
    assert_eq!(rig.frame.get(ix + 224, iy), Some(0));

    let area = rig.layout.label_area();
    let lit = (area.y as u32..area.y as u32 + area.height)
        .flat_map(|y| (area.x as u32..area.x as u32 + 8 * 32).map(move |x| (x, y)))
        .filter(|&(x, y)| rig.frame.get(x, y) == Some(rig.layout.text_color))
        .count();
    assert!(lit > 0);
}

#[test]
fn label_update_after_display_started() {
    let mut rig = Rig::new(SimParams::default());
    rig.classify("Dog: 99%");
    let mut session = rig.session(ShimConfig::default());
    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);
    assert!(report.passed());
    let before = session.video().engine().scanout().unwrap();

    rig.classify("Bird: 7%");
    let label = session.update_label(&mut rig.frame, &mut rig.text).unwrap();

    assert_eq!(label.as_str(), "Bird: 7%");
    assert_eq!(rig.frame.owner(), Owner::Device);
    let after = session.video().engine().scanout().unwrap();
    assert_ne!(before, after);
    assert_eq!(after, rig.frame.pixels());
}

#[test]
fn stalled_sink_halts_at_mm2s() {
    let mut rig = Rig::new(SimParams::default());
    rig.board.shim().borrow_mut().set_stalled(true);
    let config = ShimConfig::default().with_timeout_ms(25);
    let mut session = rig.session(config);

    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);

    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, Stage::Mm2s);
    assert!(matches!(failure.source, Error::Shim(ShimError::ProtocolTimeout { timeout_ms: 25, .. })));
    assert_eq!(report.stages.last().map(|s| (s.stage, s.passed)), Some((Stage::Mm2s, false)));
    assert!(report.stages.last().unwrap().elapsed_ms >= 25);

    let tx_addr = rig.layout.tx_base();
    assert_eq!(
        report.snapshot,
        RegisterSnapshot { address: tx_addr, len_ctrl: (32 << 2) | (1 << 1), status: 0 }
    );
    // the display was already up and stays up
    assert!(session.video().engine().is_running());
}

#[test]
fn retry_recovers_from_transient_stall() {
    let mut rig = Rig::new(SimParams::default());
    rig.board.shim().borrow_mut().stall_until(40);
    let config = ShimConfig::default().with_timeout_ms(25);
    let mut session = rig.session(config).with_retries(2);

    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);

    assert!(report.passed(), "{:?}", report.failure);
    let latched = rig.board.shim().borrow().latched().to_vec();
    assert_eq!(latched.len(), 3, "two MM2S attempts and one S2MM");
    assert_eq!(latched[0].completed_ms, None);
    assert!(latched[1].completed_ms.is_some());
}

#[test]
fn no_retries_means_first_timeout_is_final() {
    let mut rig = Rig::new(SimParams::default());
    rig.board.shim().borrow_mut().stall_until(40);
    let config = ShimConfig::default().with_timeout_ms(25);
    let mut session = rig.session(config);

    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);
    assert_eq!(report.failure.map(|f| f.stage), Some(Stage::Mm2s));
    assert_eq!(rig.board.shim().borrow().latched().len(), 1);
}

#[test]
fn rejected_configuration_stops_before_transfers() {
    let mut rig = Rig::new(SimParams::default());
    let mut vdma = rig.board.vdma();
    vdma.set_reject_config(true);
    let mut session = rig.session_with(ShimConfig::default(), vdma);

    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);

    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, Stage::ConfigureVideo);
    assert!(matches!(failure.source, Error::Config(ConfigError::ConfigurationRejected(_))));
    assert!(rig.board.shim().borrow().writes().is_empty());
}

#[test]
fn refused_start_is_its_own_stage() {
    let mut rig = Rig::new(SimParams::default());
    let mut vdma = rig.board.vdma();
    vdma.set_refuse_start(true);
    let mut session = rig.session_with(ShimConfig::default(), vdma);

    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);
    assert_eq!(report.failure.map(|f| f.stage), Some(Stage::StartVideo));
}

#[test]
fn verify_catches_corrupted_stream() {
    let mut rig = Rig::new(SimParams::default());
    // junk already sitting in the stream FIFO lands in RX instead
    rig.board.shim().borrow_mut().inject_stream(&[0x5A; 32]);
    let mut session = rig.session(ShimConfig::default());

    let report = session.run(&mut rig.frame, &test_image(), &mut rig.text, &mut rig.rx);

    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, Stage::Verify);
    assert!(matches!(failure.source, Error::VerifyFailed { mismatches } if mismatches > 0));
    assert!(report.verification.first.len() <= 10);
    assert_eq!(rig.rx.bytes(), &[0x5A; 32]);
}
