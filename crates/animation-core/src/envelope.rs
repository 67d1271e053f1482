//! Audio envelope: how far the mouth opens for one frame of audio.
//!
//! Only the mid band of the spectrum is averaged; sub-bass and high treble
//! track mouth aperture poorly for speech. The average is normalized,
//! scaled by the user's sensitivity, and compressed with a sub-linear
//! exponent so loud passages do not pin the mouth wide open.

/// Number of frequency bins delivered per analysis snapshot.
pub const FREQUENCY_BIN_COUNT: usize = 256;

/// Openings strictly above this count as active speech.
pub const SPEECH_THRESHOLD: f64 = 0.35;

const BAND_START: f64 = 0.1;
const BAND_END: f64 = 0.6;
const RESPONSE_EXPONENT: f64 = 0.7;
const MAX_MAGNITUDE: f64 = 255.0;

/// Maps frequency magnitudes to a mouth opening in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeExtractor {
    sensitivity: f64,
}

impl EnvelopeExtractor {
    pub fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity: sanitize_sensitivity(sensitivity),
        }
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = sanitize_sensitivity(sensitivity);
    }

    /// Mouth opening for one snapshot of magnitudes.
    pub fn extract(&self, magnitudes: &[u8]) -> f64 {
        opening_from_average(band_average(magnitudes), self.sensitivity)
    }
}

impl Default for EnvelopeExtractor {
    fn default() -> Self {
        Self::new(1.5)
    }
}

fn sanitize_sensitivity(sensitivity: f64) -> f64 {
    if sensitivity.is_finite() {
        sensitivity.max(0.0)
    } else {
        0.0
    }
}

/// Index range of the analyzed band for a snapshot of `len` bins.
pub fn band_range(len: usize) -> std::ops::Range<usize> {
    let start = (len as f64 * BAND_START).floor() as usize;
    let end = (len as f64 * BAND_END).floor() as usize;
    start..end.max(start)
}

/// Mean magnitude over the analyzed band (0 when the band is empty).
pub fn band_average(magnitudes: &[u8]) -> f64 {
    let band = &magnitudes[band_range(magnitudes.len())];
    if band.is_empty() {
        return 0.0;
    }
    band.iter().map(|&m| m as f64).sum::<f64>() / band.len() as f64
}

/// `min(1, (min(avg / 255, 1) * sensitivity) ^ 0.7)`.
pub fn opening_from_average(average: f64, sensitivity: f64) -> f64 {
    let normalized = (average / MAX_MAGNITUDE).clamp(0.0, 1.0);
    (normalized * sensitivity).powf(RESPONSE_EXPONENT).min(1.0)
}

/// Change in the speech-active flag between two ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEdge {
    Started,
    Ended,
    Unchanged,
}

/// Single-threshold speech detector, checked once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeechTracker {
    active: bool,
}

impl SpeechTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this tick's opening and report the edge, if any.
    pub fn update(&mut self, opening: f64) -> SpeechEdge {
        let was_active = self.active;
        self.active = opening > SPEECH_THRESHOLD;
        match (was_active, self.active) {
            (false, true) => SpeechEdge::Started,
            (true, false) => SpeechEdge::Ended,
            _ => SpeechEdge::Unchanged,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = false;
    }
}
