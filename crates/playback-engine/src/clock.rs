//! The animation clock: one tick per output frame.
//!
//! ```text
//!  tick ──► elapsed ms ──► 256-bin snapshot ──► envelope ──► speech edge
//!                                                              │
//!  sink ◄── composite ◄── resolve anchors ◄── blink(dt) ◄──────┘
//! ```
//!
//! A run ends when the analyzer reports the track exhausted or the
//! [`StopHandle`] fires. Every exit path stops the audio output, releases
//! the analyzer, resets the blink schedule, and returns the session to idle.
//!
//! Frames bound for an encoder are timed by their index, since the encoder
//! stamps them at a fixed rate; preview frames follow the wall clock.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use talkpic_animation_core::{
    BlinkPhase, BlinkStateMachine, BlinkTiming, EnvelopeExtractor, SpeechEdge, SpeechTracker,
};
use talkpic_common::config::{AppConfig, ExportDefaults};
use talkpic_common::{frame_interval, frame_time_ms, SessionClock, TalkpicError, TalkpicResult};
use talkpic_face_model::Size;
use talkpic_render_engine::{
    finalize_capture, CaptureJob, EncodedMedia, ExportFormat, FinalizePolicy, FrameCompositor,
    FrameEncoder,
};
use tokio::time::MissedTickBehavior;

use crate::audio::{AudioAnalyzer, SpectrumAnalyzer};
use crate::output::{ActivePlayback, AudioOutput};
use crate::session::{Session, SessionState};

/// How ticks are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// One tick per frame interval of wall time. Late ticks are skipped for
    /// preview and caught up for index-timed sinks.
    #[default]
    Realtime,
    /// As fast as the sink accepts frames; frame time is `index / fps`.
    Offline,
}

/// Cancels a running loop. Cheap to clone and safe to fire from any task.
///
/// A stop fired before a run starts ends that run before its first frame.
/// The flag re-arms when the run finishes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn rearm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-frame animation values handed to a sink with the pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub index: u64,
    /// Playback position in milliseconds.
    pub time_ms: f64,
    pub opening: f64,
    pub closure: f64,
    pub blink_phase: BlinkPhase,
    pub speaking: bool,
    /// Position as a fraction of the track duration.
    pub progress: f64,
}

/// Where the clock delivers rendered frames.
pub trait FrameSink {
    fn deliver(&mut self, info: &FrameInfo, frame: &RgbaImage) -> TalkpicResult<()>;

    /// Whether frame `n` is presented at `n / fps` regardless of when it was
    /// delivered. Such sinks get every frame, timed by index.
    fn timed_by_index(&self) -> bool {
        false
    }
}

/// Feeds frames to an encoder during capture.
pub struct EncoderSink<'a> {
    encoder: &'a mut dyn FrameEncoder,
}

impl<'a> EncoderSink<'a> {
    pub fn new(encoder: &'a mut dyn FrameEncoder) -> Self {
        Self { encoder }
    }
}

impl FrameSink for EncoderSink<'_> {
    fn deliver(&mut self, _info: &FrameInfo, frame: &RgbaImage) -> TalkpicResult<()> {
        self.encoder.push_frame(frame)
    }

    fn timed_by_index(&self) -> bool {
        true
    }
}

/// Hands every frame to a callback; used for live preview.
pub struct PreviewSink<F> {
    callback: F,
}

impl<F> PreviewSink<F>
where
    F: FnMut(&FrameInfo, &RgbaImage),
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> FrameSink for PreviewSink<F>
where
    F: FnMut(&FrameInfo, &RgbaImage),
{
    fn deliver(&mut self, info: &FrameInfo, frame: &RgbaImage) -> TalkpicResult<()> {
        (self.callback)(info, frame);
        Ok(())
    }
}

/// Surface, rate, and pacing for a run.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub surface: Size,
    pub fps: u32,
    pub pacing: Pacing,
    pub blink: BlinkTiming,
    /// Fixed blink seed for reproducible runs.
    pub blink_seed: Option<u64>,
}

impl ClockConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            surface: Size::new(config.surface.width, config.surface.height),
            fps: config.surface.fps.max(1),
            ..Self::default()
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            surface: Size::new(720, 720),
            fps: 24,
            pacing: Pacing::default(),
            blink: BlinkTiming::default(),
            blink_seed: None,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    TrackEnded,
    Stopped,
}

/// Statistics of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: u64,
    /// Playback position of the last frame.
    pub duration_ms: f64,
    pub completed_blinks: u64,
    pub peak_opening: f64,
    pub end: RunEnd,
}

/// Output settings for [`AnimationClock::record`].
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub output_path: PathBuf,
    pub format: ExportFormat,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub finalize: FinalizePolicy,
}

impl RecordRequest {
    pub fn new(output_path: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self::from_defaults(output_path, format, &ExportDefaults::default())
    }

    pub fn from_defaults(
        output_path: impl Into<PathBuf>,
        format: ExportFormat,
        defaults: &ExportDefaults,
    ) -> Self {
        Self {
            output_path: output_path.into(),
            format,
            video_bitrate_kbps: defaults.video_bitrate_kbps,
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
            finalize: FinalizePolicy::from_defaults(defaults),
        }
    }
}

/// A finished capture and the run that produced it.
#[derive(Debug, Clone)]
pub struct Recording {
    pub summary: RunSummary,
    pub media: EncodedMedia,
}

/// Drives the per-frame loop for playback and capture.
pub struct AnimationClock {
    config: ClockConfig,
    stop: StopHandle,
    audio_output: Option<Arc<dyn AudioOutput>>,
}

impl AnimationClock {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            stop: StopHandle::default(),
            audio_output: None,
        }
    }

    /// Sound the track through `output` during real-time runs.
    pub fn with_audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Handle that stops the current or next run.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Play the session's track through `sink`.
    pub async fn play<S: FrameSink>(
        &self,
        session: &mut Session,
        sink: &mut S,
    ) -> TalkpicResult<RunSummary> {
        let mut analyzer = spectrum_for(session)?;
        self.play_with(session, &mut analyzer, sink).await
    }

    /// Play with an explicit analysis backend.
    pub async fn play_with<S: FrameSink>(
        &self,
        session: &mut Session,
        analyzer: &mut dyn AudioAnalyzer,
        sink: &mut S,
    ) -> TalkpicResult<RunSummary> {
        session.begin_run(SessionState::Playing)?;
        tracing::info!(
            fps = self.config.fps,
            pacing = ?self.config.pacing,
            "Playback started"
        );
        let result = self.run(session, analyzer, sink).await;
        session.end_run();
        log_outcome("Playback", &result);
        result
    }

    /// Capture the session to a video file.
    pub async fn record(
        &self,
        session: &mut Session,
        encoder: &mut dyn FrameEncoder,
        request: &RecordRequest,
    ) -> TalkpicResult<Recording> {
        let mut analyzer = spectrum_for(session)?;
        self.record_with(session, &mut analyzer, encoder, request)
            .await
    }

    /// Capture with an explicit analysis backend.
    ///
    /// The session's audio file is handed to the encoder at capture start.
    /// On any error after `begin`, the encoder is aborted.
    pub async fn record_with(
        &self,
        session: &mut Session,
        analyzer: &mut dyn AudioAnalyzer,
        encoder: &mut dyn FrameEncoder,
        request: &RecordRequest,
    ) -> TalkpicResult<Recording> {
        session.begin_run(SessionState::Recording)?;
        let result = self.capture(session, analyzer, encoder, request).await;
        analyzer.release();
        session.end_run();
        match &result {
            Ok(recording) => tracing::info!(
                path = %recording.media.path.display(),
                bytes = recording.media.bytes,
                frames = recording.summary.frames,
                "Recording complete"
            ),
            Err(err) => tracing::error!(error = %err, "Recording failed"),
        }
        result
    }

    async fn capture(
        &self,
        session: &Session,
        analyzer: &mut dyn AudioAnalyzer,
        encoder: &mut dyn FrameEncoder,
        request: &RecordRequest,
    ) -> TalkpicResult<Recording> {
        let track = session
            .audio()
            .ok_or_else(|| TalkpicError::input_unavailable("no audio track loaded"))?;
        let audio_path = track
            .path()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| TalkpicError::input_unavailable("audio track has no source file to mux"))?;

        if track.is_long() {
            tracing::warn!(
                minutes = track.duration_secs() / 60.0,
                "Long recording; capture may take a while and the encoder may truncate output"
            );
        }

        let job = CaptureJob::new(
            &request.output_path,
            audio_path,
            self.config.surface,
            self.config.fps,
            request.format,
        )
        .with_bitrates(request.video_bitrate_kbps, request.audio_bitrate_kbps);
        if self.stop.is_stopped() {
            self.stop.rearm();
            return Err(TalkpicError::illegal_state(
                "capture stopped before the encoder started",
            ));
        }
        encoder.begin(&job)?;
        tracing::info!(
            encoder = encoder.name(),
            format = %request.format,
            output = %request.output_path.display(),
            pacing = ?self.config.pacing,
            "Recording started"
        );

        let summary = {
            let mut sink = EncoderSink::new(encoder);
            self.run(session, analyzer, &mut sink).await
        };
        let summary = match summary {
            Ok(summary) => summary,
            Err(err) => {
                encoder.abort();
                return Err(err);
            }
        };

        match finalize_capture(encoder, request.format, &request.finalize).await {
            Ok(media) => Ok(Recording { summary, media }),
            Err(err) => {
                if encoder.is_active() {
                    encoder.abort();
                }
                Err(err)
            }
        }
    }

    async fn run<S: FrameSink>(
        &self,
        session: &Session,
        analyzer: &mut dyn AudioAnalyzer,
        sink: &mut S,
    ) -> TalkpicResult<RunSummary> {
        let mut blink = match self.config.blink_seed {
            Some(seed) => BlinkStateMachine::seeded(self.config.blink, 0.0, seed),
            None => BlinkStateMachine::new(self.config.blink, 0.0),
        };
        let mut playback = self.start_audio(session);

        let result = self.tick_loop(session, analyzer, sink, &mut blink).await;

        if let Some(playback) = playback.as_mut() {
            playback.stop();
        }
        analyzer.release();
        blink.reset(0.0);
        self.stop.rearm();
        result
    }

    /// Start the track on the audio output for a real-time run. A failure
    /// degrades to silent playback.
    fn start_audio(&self, session: &Session) -> Option<Box<dyn ActivePlayback>> {
        let output = self.audio_output.as_ref()?;
        if self.config.pacing != Pacing::Realtime || self.stop.is_stopped() {
            return None;
        }
        let track = session.audio()?;
        match output.start(track) {
            Ok(playback) => Some(playback),
            Err(err) => {
                tracing::warn!(
                    output = output.name(),
                    error = %err,
                    "Audio output unavailable; playing silently"
                );
                None
            }
        }
    }

    async fn tick_loop<S: FrameSink>(
        &self,
        session: &Session,
        analyzer: &mut dyn AudioAnalyzer,
        sink: &mut S,
        blink: &mut BlinkStateMachine<StdRng>,
    ) -> TalkpicResult<RunSummary> {
        let image = session
            .image()
            .ok_or_else(|| TalkpicError::input_unavailable("no image loaded"))?;
        let surface = self.config.surface;
        let fps = self.config.fps.max(1);
        let duration_ms = analyzer.duration_ms();

        let mut compositor = FrameCompositor::new(Arc::clone(&image.pixels));
        let extractor = EnvelopeExtractor::new(session.settings().sensitivity);
        let mut speech = SpeechTracker::new();
        let mut frame = RgbaImage::new(surface.width, surface.height);

        let clock = SessionClock::start();
        tracing::debug!(started_at = clock.epoch_wall(), fps, "Tick loop running");
        let index_timed = self.config.pacing == Pacing::Offline || sink.timed_by_index();
        let mut interval = tokio::time::interval(frame_interval(fps));
        interval.set_missed_tick_behavior(if index_timed {
            MissedTickBehavior::Burst
        } else {
            MissedTickBehavior::Skip
        });

        let progress_every = u64::from(fps) * 5;
        let mut index: u64 = 0;
        let mut last_ms = 0.0;
        let mut peak_opening: f64 = 0.0;
        let end = loop {
            if self.stop.is_stopped() {
                break RunEnd::Stopped;
            }
            match self.config.pacing {
                Pacing::Realtime => {
                    interval.tick().await;
                }
                Pacing::Offline => tokio::task::yield_now().await,
            }
            if self.stop.is_stopped() {
                break RunEnd::Stopped;
            }

            let now_ms = if index_timed {
                frame_time_ms(index, fps)
            } else {
                clock.elapsed_ms()
            };
            let Some(bins) = analyzer.frequency_data(now_ms) else {
                break RunEnd::TrackEnded;
            };

            let opening = extractor.extract(&bins);
            let anchors = session.resolve_anchors(surface)?;
            let eyes_present = anchors.eyes().is_some();

            let edge = speech.update(opening);
            if edge == SpeechEdge::Ended && blink.on_speech_end(now_ms, eyes_present) {
                tracing::trace!(next_blink_ms = blink.next_blink_ms(), "Post-speech blink scheduled");
            }
            let closure = blink.advance(now_ms, now_ms - last_ms, eyes_present);
            last_ms = now_ms;

            compositor.render(opening, closure, &anchors, &mut frame);

            let info = FrameInfo {
                index,
                time_ms: now_ms,
                opening,
                closure,
                blink_phase: blink.phase(),
                speaking: speech.is_active(),
                progress: if duration_ms > 0.0 {
                    (now_ms / duration_ms).clamp(0.0, 1.0)
                } else {
                    1.0
                },
            };
            tracing::trace!(index, time_ms = now_ms, opening, closure, "Tick");
            sink.deliver(&info, &frame)?;

            peak_opening = peak_opening.max(opening);
            index += 1;
            if self.config.pacing == Pacing::Offline && index % progress_every == 0 {
                tracing::info!(
                    percent = (info.progress * 100.0).round() as u32,
                    frames = index,
                    "Rendering"
                );
            }
        };

        Ok(RunSummary {
            frames: index,
            duration_ms: last_ms,
            completed_blinks: blink.completed_blinks(),
            peak_opening,
            end,
        })
    }
}

fn spectrum_for(session: &Session) -> TalkpicResult<SpectrumAnalyzer> {
    session
        .audio()
        .cloned()
        .map(SpectrumAnalyzer::new)
        .ok_or_else(|| TalkpicError::input_unavailable("no audio track loaded"))
}

fn log_outcome(what: &str, result: &TalkpicResult<RunSummary>) {
    match result {
        Ok(summary) => tracing::info!(
            frames = summary.frames,
            duration_ms = summary.duration_ms,
            blinks = summary.completed_blinks,
            end = ?summary.end,
            "{what} finished"
        ),
        Err(err) => tracing::error!(error = %err, "{what} failed"),
    }
}
