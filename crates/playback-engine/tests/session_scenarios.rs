use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use talkpic_animation_core::AnchorOrigin;
use talkpic_common::TalkpicError;
use talkpic_face_model::{AnchorRegion, RegionKind, Size};
use talkpic_playback_engine::{
    AnimationClock, ClockConfig, FaceDetector, FrameInfo, LandmarkFileDetector, Pacing,
    PreviewSink, RecordRequest, RunEnd, Session, SessionState,
};
use talkpic_render_engine::{CaptureJob, ExportFormat, FinalizePolicy, FrameEncoder};

fn write_wav(path: &Path, secs: f64, amplitude: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (8_000.0 * secs) as usize;
    // Broadband noise from a xorshift generator.
    let mut state: u32 = 0x9e37_79b9;
    for _ in 0..n {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let unit = state as f32 / u32::MAX as f32 * 2.0 - 1.0;
        writer
            .write_sample((unit * amplitude * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

fn write_face(path: &Path) {
    RgbaImage::from_pixel(80, 60, Rgba([200, 170, 150, 255]))
        .save(path)
        .unwrap();
}

fn offline_clock() -> AnimationClock {
    AnimationClock::new(ClockConfig {
        surface: Size::new(80, 60),
        blink_seed: Some(11),
        ..ClockConfig::default().with_pacing(Pacing::Offline)
    })
}

fn fast_finalize() -> FinalizePolicy {
    FinalizePolicy {
        attempts: 3,
        retry_delay: Duration::from_millis(1),
        min_readable_bytes: 1024,
        min_plausible_bytes: 10 * 1024,
    }
}

/// Writes 1000 bytes per pushed frame when finished.
#[derive(Default)]
struct CountingEncoder {
    output: Option<PathBuf>,
    frames: usize,
    active: bool,
    aborted: bool,
}

impl FrameEncoder for CountingEncoder {
    fn name(&self) -> &str {
        "counting"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports(&self, _format: ExportFormat) -> bool {
        true
    }

    fn begin(&mut self, job: &CaptureJob) -> talkpic_common::TalkpicResult<()> {
        assert!(job.audio_path.exists());
        self.output = Some(job.output_path.clone());
        self.active = true;
        Ok(())
    }

    fn push_frame(&mut self, frame: &RgbaImage) -> talkpic_common::TalkpicResult<()> {
        assert_eq!(frame.dimensions(), (80, 60));
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> talkpic_common::TalkpicResult<()> {
        self.active = false;
        if let Some(path) = &self.output {
            std::fs::write(path, vec![0u8; self.frames * 1000])?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.active = false;
        self.aborted = true;
    }

    fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[tokio::test]
async fn landmark_sidecar_drives_the_mouth() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("face.png");
    write_face(&image_path);
    std::fs::write(
        dir.path().join("face.landmarks.json"),
        r#"{"landmarks":[{"x":30,"y":40},{"x":50,"y":44}]}"#,
    )
    .unwrap();

    let sidecar = LandmarkFileDetector::for_image(&image_path).expect("sidecar exists");
    let detector: &dyn FaceDetector = &sidecar;
    let mut session = Session::new();
    session
        .load_image(&image_path, Some(detector))
        .await
        .unwrap();

    let anchors = session.resolve_anchors(Size::new(80, 60)).unwrap();
    let mouth = anchors.mouth.unwrap();
    assert_eq!(mouth.origin, AnchorOrigin::Detected);
    assert!((mouth.ellipse.cx - 40.0).abs() < 1e-9);
    assert!((mouth.ellipse.cy - 42.0).abs() < 1e-9);
    assert!(anchors.eyes().is_none());

    // A manual mouth overrides the detection.
    session
        .confirm_region(
            RegionKind::Mouth,
            AnchorRegion::new(0.1, 0.1, 0.25, 0.25).unwrap(),
        )
        .unwrap();
    let anchors = session.resolve_anchors(Size::new(80, 60)).unwrap();
    assert_eq!(anchors.mouth.unwrap().origin, AnchorOrigin::Manual);
}

#[tokio::test]
async fn missing_detector_falls_back_to_heuristic() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("face.png");
    write_face(&image_path);

    let mut session = Session::new();
    session.load_image(&image_path, None).await.unwrap();
    let anchors = session.resolve_anchors(Size::new(80, 60)).unwrap();
    assert_eq!(anchors.mouth.unwrap().origin, AnchorOrigin::Heuristic);
}

#[tokio::test]
async fn loud_track_opens_the_mouth_during_playback() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("face.png");
    let audio_path = dir.path().join("voice.wav");
    write_face(&image_path);
    write_wav(&audio_path, 1.0, 0.8);

    let mut session = Session::new();
    session.load_image(&image_path, None).await.unwrap();
    session.load_audio(&audio_path).await.unwrap();
    assert!(session.is_ready());

    let mut openings = Vec::new();
    let mut sink = PreviewSink::new(|info: &FrameInfo, _: &RgbaImage| openings.push(info.opening));
    let summary = offline_clock().play(&mut session, &mut sink).await.unwrap();

    assert_eq!(summary.end, RunEnd::TrackEnded);
    assert_eq!(summary.frames, 24);
    assert_eq!(openings.len(), 24);
    assert!(summary.peak_opening > 0.5);
    assert!(openings.iter().all(|o| (0.0..=1.0).contains(o)));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn record_finalizes_plausible_output() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("face.png");
    let audio_path = dir.path().join("voice.wav");
    write_face(&image_path);
    write_wav(&audio_path, 1.0, 0.5);

    let mut session = Session::new();
    session.load_image(&image_path, None).await.unwrap();
    session.load_audio(&audio_path).await.unwrap();

    let output = dir.path().join("out.mp4");
    let mut request = RecordRequest::new(&output, ExportFormat::Mp4H264);
    request.finalize = fast_finalize();
    let mut encoder = CountingEncoder::default();

    let recording = offline_clock()
        .record(&mut session, &mut encoder, &request)
        .await
        .unwrap();
    assert_eq!(recording.summary.frames, 24);
    assert_eq!(recording.media.bytes, 24_000);
    assert_eq!(recording.media.path, output);
    assert!(!encoder.aborted);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn short_capture_is_reported_as_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("face.png");
    let audio_path = dir.path().join("short.wav");
    write_face(&image_path);
    write_wav(&audio_path, 0.2, 0.5);

    let mut session = Session::new();
    session.load_image(&image_path, None).await.unwrap();
    session.load_audio(&audio_path).await.unwrap();

    let mut request = RecordRequest::new(dir.path().join("out.mp4"), ExportFormat::Mp4H264);
    request.finalize = fast_finalize();
    let mut encoder = CountingEncoder::default();

    let err = offline_clock()
        .record(&mut session, &mut encoder, &request)
        .await
        .unwrap_err();
    match err {
        TalkpicError::CaptureFailure {
            bytes, attempts, ..
        } => {
            assert_eq!(bytes, Some(5_000));
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.state(), SessionState::Idle);
}
