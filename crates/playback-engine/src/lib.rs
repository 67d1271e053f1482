//! talkpic Playback Engine
//!
//! Runs animation sessions: loads the photo and the voice track, resolves
//! the face anchors once detection has settled, and drives the frame loop
//! for live playback or video capture.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                   Session                     │
//! │  image ─► FaceDetector ─► DetectionState      │
//! │  audio ─► AudioTrack      AnchorSet, sliders  │
//! └───────────────────────┬───────────────────────┘
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │               AnimationClock                  │
//! │  SpectrumAnalyzer ─► envelope ─► blink ─►     │
//! │  FrameCompositor ─► FrameSink                 │
//! │       (PreviewSink │ EncoderSink ─► ffmpeg)   │
//! │  AudioOutput (real time only) ─► speakers     │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The `speaker` feature enables `SpeakerOutput` through rodio.

pub mod audio;
pub mod clock;
pub mod detector;
pub mod output;
pub mod session;

pub use audio::{AudioAnalyzer, AudioTrack, SpectrumAnalyzer};
pub use clock::*;
pub use detector::{detect_or_degrade, sidecar_path, FaceDetector, LandmarkFileDetector};
pub use output::{ActivePlayback, AudioOutput};
#[cfg(feature = "speaker")]
pub use output::SpeakerOutput;
pub use session::*;
