//! talkpic Render Engine
//!
//! Per-frame compositing of the animated face and export of the frame
//! stream to a video file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! image ──► Fit to surface ──┐
//!                            ├── Mouth (stretch or procedural)
//! anchors + opening ─────────┘         │
//!                                      ├── Eyes (blink squash)
//! closure ─────────────────────────────┘         │
//!                                                ▼
//!                                      raw RGBA frame ──► ffmpeg ──► output.mp4
//!                                                              ▲
//! audio.wav ───────────────────────────────────────────────────┘
//! ```

pub mod compositor;
pub mod export;

pub use compositor::{FrameCompositor, MouthShape};
pub use export::*;
