//! Audio tracks and the frequency analysis that drives the mouth.

use std::f64::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use talkpic_animation_core::FREQUENCY_BIN_COUNT;
use talkpic_common::{TalkpicError, TalkpicResult};

/// Samples per analysis window; yields [`FREQUENCY_BIN_COUNT`] bins.
pub const FFT_SIZE: usize = FREQUENCY_BIN_COUNT * 2;

/// Weight of the previous snapshot in each new one.
pub const SMOOTHING_TIME_CONSTANT: f64 = 0.8;

/// Magnitudes at or below this level map to 0.
pub const MIN_DECIBELS: f64 = -100.0;

/// Magnitudes at or above this level map to 255.
pub const MAX_DECIBELS: f64 = -30.0;

/// Tracks longer than this get a warning before capture.
pub const LONG_TRACK_SECS: f64 = 30.0 * 60.0;

/// A decoded audio track, mixed down to mono.
#[derive(Clone)]
pub struct AudioTrack {
    path: Option<PathBuf>,
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("path", &self.path)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("samples", &self.samples.len())
            .finish()
    }
}

impl AudioTrack {
    /// Decode a WAV file without blocking the runtime.
    pub async fn load(path: impl AsRef<Path>) -> TalkpicResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::decode(&path))
            .await
            .map_err(|e| TalkpicError::audio(format!("Audio decode task failed: {e}")))?
    }

    /// Decode a WAV file (integer or float PCM, any channel count).
    pub fn decode(path: &Path) -> TalkpicResult<Self> {
        if !path.exists() {
            return Err(TalkpicError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut reader = hound::WavReader::open(path).map_err(|e| {
            TalkpicError::audio(format!("Failed to open {}: {e}", path.display()))
        })?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(TalkpicError::audio(format!(
                "{} declares no channels or no sample rate",
                path.display()
            )));
        }

        let interleaved: Result<Vec<f32>, hound::Error> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect()
            }
        };
        let interleaved = interleaved.map_err(|e| {
            TalkpicError::audio(format!("Failed to decode {}: {e}", path.display()))
        })?;

        let track = Self {
            path: Some(path.to_path_buf()),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples: mix_to_mono(&interleaved, spec.channels).into(),
        };
        tracing::info!(
            path = %path.display(),
            sample_rate = track.sample_rate,
            channels = track.channels,
            duration_secs = track.duration_secs(),
            "Audio track decoded"
        );
        Ok(track)
    }

    /// An in-memory mono track.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            path: None,
            sample_rate: sample_rate.max(1),
            channels: 1,
            samples: samples.into(),
        }
    }

    /// Source file, when decoded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source before mixdown.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    pub fn is_long(&self) -> bool {
        self.duration_secs() > LONG_TRACK_SECS
    }
}

fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Trait for the per-tick frequency source.
pub trait AudioAnalyzer: Send {
    /// Magnitude snapshot for playback position `position_ms`, or `None`
    /// once the track is exhausted or the analyzer released.
    fn frequency_data(&mut self, position_ms: f64) -> Option<[u8; FREQUENCY_BIN_COUNT]>;

    fn duration_ms(&self) -> f64;

    /// Free analysis resources. Later snapshots return `None`.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// Windowed FFT analyzer with temporal smoothing and decibel scaling.
///
/// Each snapshot looks at the [`FFT_SIZE`] samples ending at the requested
/// position, applies a Blackman window, and maps smoothed magnitudes from
/// `[MIN_DECIBELS, MAX_DECIBELS]` onto `0..=255`.
pub struct SpectrumAnalyzer {
    track: AudioTrack,
    window: Vec<f64>,
    smoothed: Vec<f64>,
    re: Vec<f64>,
    im: Vec<f64>,
    released: bool,
}

impl SpectrumAnalyzer {
    pub fn new(track: AudioTrack) -> Self {
        Self {
            track,
            window: blackman_window(FFT_SIZE),
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
            re: vec![0.0; FFT_SIZE],
            im: vec![0.0; FFT_SIZE],
            released: false,
        }
    }

    pub fn track(&self) -> &AudioTrack {
        &self.track
    }

    fn analyze(&mut self, end_sample: usize) -> [u8; FREQUENCY_BIN_COUNT] {
        let samples = self.track.samples();
        let first = end_sample as i64 - FFT_SIZE as i64;
        for i in 0..FFT_SIZE {
            let idx = first + i as i64;
            let sample = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize] as f64
            } else {
                0.0
            };
            self.re[i] = sample * self.window[i];
            self.im[i] = 0.0;
        }

        fft_in_place(&mut self.re, &mut self.im);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        let mut out = [0u8; FREQUENCY_BIN_COUNT];
        for (k, byte) in out.iter_mut().enumerate() {
            let magnitude = (self.re[k] * self.re[k] + self.im[k] * self.im[k]).sqrt() / FFT_SIZE as f64;
            let smoothed = SMOOTHING_TIME_CONSTANT * self.smoothed[k]
                + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            self.smoothed[k] = smoothed;

            let db = 20.0 * smoothed.log10();
            let scaled = 255.0 * (db - MIN_DECIBELS) / range;
            *byte = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        out
    }
}

impl AudioAnalyzer for SpectrumAnalyzer {
    fn frequency_data(&mut self, position_ms: f64) -> Option<[u8; FREQUENCY_BIN_COUNT]> {
        if self.released || position_ms < 0.0 || position_ms >= self.track.duration_ms() {
            return None;
        }
        let end_sample = (position_ms / 1000.0 * self.track.sample_rate() as f64).round() as usize;
        Some(self.analyze(end_sample))
    }

    fn duration_ms(&self) -> f64 {
        self.track.duration_ms()
    }

    fn release(&mut self) {
        if !self.released {
            tracing::debug!("Releasing spectrum analyzer");
        }
        self.released = true;
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

fn blackman_window(n: usize) -> Vec<f64> {
    const A0: f64 = 0.42;
    const A1: f64 = 0.5;
    const A2: f64 = 0.08;
    (0..n)
        .map(|i| {
            let x = i as f64 / n as f64;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Iterative radix-2 FFT. Length must be a power of two.
fn fft_in_place(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());

    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        let half = len / 2;
        for start in (0..n).step_by(len) {
            let (mut c_re, mut c_im) = (1.0, 0.0);
            for k in 0..half {
                let a = start + k;
                let b = a + half;
                let t_re = re[b] * c_re - im[b] * c_im;
                let t_im = re[b] * c_im + im[b] * c_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next_re = c_re * w_re - c_im * w_im;
                c_im = c_re * w_im + c_im * w_re;
                c_re = next_re;
            }
        }
        len <<= 1;
    }
}
