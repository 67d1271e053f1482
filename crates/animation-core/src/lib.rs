//! talkpic Animation Core
//!
//! Turns session inputs into per-frame animation parameters:
//! - **Anchor resolution:** Manual, detected, or heuristic mouth/eye ellipses
//! - **Audio envelope:** Frequency magnitudes to a mouth-opening scalar
//! - **Blink scheduling:** Timed blink automaton with speech coupling
//!
//! This crate is pure computation, with no I/O and no rendering.
//! All inputs are data; all outputs are data.

pub mod anchor;
pub mod blink;
pub mod envelope;

pub use anchor::{
    heuristic_mouth, resolve, resolve_all, select_source, AnchorOrigin, AnchorSource,
    ResolvedAnchor, ResolvedAnchors,
};
pub use blink::{BlinkPhase, BlinkStateMachine, BlinkTiming};
pub use envelope::{EnvelopeExtractor, SpeechEdge, SpeechTracker, FREQUENCY_BIN_COUNT};
