//! Integration tests for segment recording through the public API
//!
//! These tests drive a SegmentCommandBuffer over the in-memory backend in
//! recording_test_utils and check what reaches the device and the log.
//! No GPU is required.
//!
//! All tests are #[serial]: the logger is global and every recording logs.


use recording_test_utils::*;
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use strata_gpu::strata::gpu::*;
use strata_gpu::strata::log::{LogEntry, LogSeverity, Logger};
use strata_gpu::strata::Engine;

const RECORDER_SOURCE: &str = "strata::SegmentCommandBuffer";

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Logger capturing the recorder's entries
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.source == RECORDER_SOURCE {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

fn begin(gpu: &Arc<TestGpu>, target: &Arc<TestTarget>) -> SegmentCommandBuffer {
    SegmentCommandBuffer::new(
        gpu.clone(),
        target.clone(),
        LoadAndStoreInfo::load_store(),
        LoadAndStoreInfo::load_store(),
    )
    .unwrap()
}

// ============================================================================
// RECORDING FLOW TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_clear_draw_upload_draw_submit() {
    let gpu = TestGpu::new();
    let target = TestTarget::new(64, 32);
    let mut cb = begin(&gpu, &target);

    cb.clear(&FixedClip::disabled(), [0.0, 0.0, 1.0, 1.0]).unwrap();
    cb.draw(&Pipeline::default(), &TestPrimitiveProcessor, &[triangle_mesh()], &Rect::from_xywh(0.0, 0.0, 16.0, 16.0))
        .unwrap();
    cb.inline_upload(Arc::new(TestFlushState), Box::new(|_writer| {})).unwrap();
    cb.draw(&Pipeline::default(), &TestPrimitiveProcessor, &[triangle_mesh()], &Rect::from_xywh(8.5, 4.25, 4.0, 4.0))
        .unwrap();
    cb.submit().unwrap();

    assert_eq!(cb.segments().len(), 2);
    let replays = gpu.replays.lock().unwrap();
    assert_eq!(replays.len(), 2);

    // First segment starts from the folded clear, so it covers the target
    assert_eq!(replays[0].0, LoadOp::Clear);
    assert_eq!(replays[0].2, IRect::from_size(64, 32));
    assert!(replays[0].1 > 0);

    // Second keeps prior content and only spans the rounded-out draw
    assert_eq!(replays[1].0, LoadOp::Load);
    assert_eq!(replays[1].2, IRect::from_ltrb(8, 4, 13, 9));

    assert_eq!(gpu.stats().draws(), 2);
    assert_eq!(gpu.stats().segments_submitted(), 2);
    assert_eq!(target.image.current_layout(), ImageLayout::ColorAttachment);
}

#[test]
#[serial]
fn test_integration_untouched_command_buffer_submits_nothing() {
    let gpu = TestGpu::new();
    let target = TestTarget::new(64, 32);
    let mut cb = begin(&gpu, &target);

    cb.submit().unwrap();

    assert!(gpu.replays.lock().unwrap().is_empty());
    assert_eq!(gpu.stats().segments_dropped(), 1);
}

#[test]
#[serial]
fn test_integration_drop_recycles_every_segment() {
    let gpu = TestGpu::new();
    let target = TestTarget::new(64, 32);
    {
        let mut cb = begin(&gpu, &target);
        cb.draw(&Pipeline::default(), &TestPrimitiveProcessor, &[triangle_mesh()], &Rect::from_size(8, 8))
            .unwrap();
        cb.inline_upload(Arc::new(TestFlushState), Box::new(|_writer| {})).unwrap();
        cb.submit().unwrap();
    }

    assert_eq!(gpu.provider.recycled.load(Ordering::Relaxed), 2);
}

// ============================================================================
// POLICY LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_missing_pipeline_state_is_traced() {
    let (logger, entries) = CaptureLogger::new();
    Engine::set_logger(logger);

    let gpu = TestGpu::new();
    gpu.provider.pipeline_states_available.store(false, Ordering::Relaxed);
    let target = TestTarget::new(64, 32);
    let mut cb = begin(&gpu, &target);

    let result = cb.draw(&Pipeline::default(), &TestPrimitiveProcessor, &[triangle_mesh()], &Rect::from_size(8, 8));

    Engine::reset_logger();

    assert!(result.is_ok(), "a missing pipeline state is not an error");
    assert_eq!(gpu.stats().draws(), 0);
    assert!(cb.segments()[0].is_empty());

    let entries = entries.lock().unwrap();
    assert!(entries.iter().any(|e| e.severity == LogSeverity::Trace));
}

#[test]
#[serial]
fn test_integration_dropped_segment_is_traced() {
    let (logger, entries) = CaptureLogger::new();
    Engine::set_logger(logger);

    let gpu = TestGpu::new();
    let target = TestTarget::new(64, 32);
    let mut cb = begin(&gpu, &target);
    cb.draw(&Pipeline::default(), &TestPrimitiveProcessor, &[triangle_mesh()], &Rect::from_xywh(100.0, 100.0, 8.0, 8.0))
        .unwrap();
    cb.submit().unwrap();

    Engine::reset_logger();

    assert!(gpu.replays.lock().unwrap().is_empty());
    let entries = entries.lock().unwrap();
    assert!(entries
        .iter()
        .any(|e| e.severity == LogSeverity::Trace && e.message.contains("dropped")));
    assert!(entries.iter().all(|e| e.file.is_none()), "policy logs carry no location");
}
