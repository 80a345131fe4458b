//! End-to-end checks for the detection pipeline thread: synthetic frames in,
//! annotated packets out of the shared slot, lifecycle over the status
//! channel.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;

use agv_console::vision::{
    CaptureError, Frame, FramePacket, FrameSource, PipelineOptions, SharedFrame, SyntheticEngine,
    SyntheticSource, VisionStatus, spawn_detection_pipeline,
};
use detect_core::LabelMap;

fn options() -> PipelineOptions {
    PipelineOptions {
        labels: LabelMap::new(vec!["person".to_string(), "agv".to_string()]),
        ..PipelineOptions::default()
    }
}

fn wait_for_packet(shared: &SharedFrame) -> FramePacket {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(packet) = shared.lock().unwrap().clone() {
            return packet;
        }
        if Instant::now() > deadline {
            panic!("pipeline produced no frame within 2s");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_pipeline_fills_shared_slot_with_annotated_packets() {
    let shared: SharedFrame = Arc::new(Mutex::new(None));
    let (status_tx, status_rx) = unbounded();
    let handle = spawn_detection_pipeline(
        Box::new(SyntheticSource::new(64, 48).with_interval(Duration::from_millis(1))),
        Box::new(SyntheticEngine::new(64, 64)),
        options(),
        shared.clone(),
        status_tx,
    )
    .unwrap();

    let first = wait_for_packet(&shared);
    assert_eq!(&first.jpeg[..2], &[0xFF, 0xD8], "packet is not a JPEG");
    assert_eq!(first.detections.len(), 2);

    let mut classes: Vec<&str> = first.detections.iter().map(|d| d.class.as_str()).collect();
    classes.sort_unstable();
    assert_eq!(classes, ["agv", "person"]);

    for det in &first.detections {
        let [x1, y1, x2, y2] = det.bbox;
        assert!(x2 > x1 && y2 > y1, "degenerate bbox {:?}", det.bbox);
        assert!(
            x1 >= 0.0 && y1 >= 0.0 && x2 <= 64.0 && y2 <= 48.0,
            "bbox {:?} escapes the 64x48 frame",
            det.bbox
        );
    }

    // Latest-wins slot: newer frames keep replacing the packet.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let later = wait_for_packet(&shared);
        if later.frame_number > first.frame_number {
            break;
        }
        if Instant::now() > deadline {
            panic!("frame number did not advance within 2s");
        }
        thread::sleep(Duration::from_millis(5));
    }

    handle.stop();
    let saw_stop = status_rx
        .try_iter()
        .any(|status| matches!(status, VisionStatus::Stopped));
    assert!(saw_stop, "no Stopped status after handle.stop()");
}

struct FailingSource;

impl FrameSource for FailingSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        Err(CaptureError::Open {
            uri: "rtsp://camera.local/stream".to_string(),
        })
    }
}

/// Fails every other read with a transient error.
struct FlakySource {
    inner: SyntheticSource,
    tick: u32,
}

impl FrameSource for FlakySource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.tick += 1;
        if self.tick % 2 == 1 {
            return Err(CaptureError::Other(anyhow::anyhow!("decoder hiccup")));
        }
        self.inner.next_frame()
    }
}

#[test]
fn test_transient_capture_errors_only_cost_frames() {
    let shared: SharedFrame = Arc::new(Mutex::new(None));
    let (status_tx, status_rx) = unbounded();
    let handle = spawn_detection_pipeline(
        Box::new(FlakySource {
            inner: SyntheticSource::new(64, 48).with_interval(Duration::from_millis(1)),
            tick: 0,
        }),
        Box::new(SyntheticEngine::new(64, 64)),
        options(),
        shared.clone(),
        status_tx,
    )
    .unwrap();

    let packet = wait_for_packet(&shared);
    assert!(!packet.jpeg.is_empty());

    handle.stop();
    assert!(
        !status_rx
            .try_iter()
            .any(|status| matches!(status, VisionStatus::CaptureFailed { .. })),
        "transient errors must not be reported as capture failure"
    );
}

#[test]
fn test_capture_failure_reports_status_and_stops() {
    let shared: SharedFrame = Arc::new(Mutex::new(None));
    let (status_tx, status_rx) = unbounded();
    let handle = spawn_detection_pipeline(
        Box::new(FailingSource),
        Box::new(SyntheticEngine::new(32, 32)),
        PipelineOptions::default(),
        shared.clone(),
        status_tx,
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut saw_failure = false;
    let mut saw_stop = false;
    while Instant::now() < deadline && !(saw_failure && saw_stop) {
        match status_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(VisionStatus::CaptureFailed { error }) => {
                assert!(
                    error.contains("rtsp://camera.local/stream"),
                    "unexpected capture error: {error}"
                );
                saw_failure = true;
            }
            Ok(VisionStatus::Stopped) => saw_stop = true,
            Ok(_) | Err(_) => {}
        }
    }
    assert!(saw_failure, "capture failure was never reported");
    assert!(saw_stop, "pipeline did not stop after capture failure");
    assert!(
        shared.lock().unwrap().is_none(),
        "no packet should land after a capture failure on the first frame"
    );
    handle.stop();
}
