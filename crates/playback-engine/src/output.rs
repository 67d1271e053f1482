//! Audio output for real-time runs.
//!
//! The clock starts the voice track on an [`AudioOutput`] when a real-time
//! run begins and stops it on every exit path. A missing device is not an
//! error for the run: playback continues without sound.

use talkpic_common::TalkpicResult;

use crate::audio::AudioTrack;

/// Somewhere a track can be heard.
pub trait AudioOutput: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start `track` from its first sample.
    fn start(&self, track: &AudioTrack) -> TalkpicResult<Box<dyn ActivePlayback>>;
}

/// A track that is currently sounding.
pub trait ActivePlayback: Send {
    /// Silence the track. Calling it twice is a no-op.
    fn stop(&mut self);
}

#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;

#[cfg(feature = "speaker")]
mod speaker {
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};

    use rodio::buffer::SamplesBuffer;
    use talkpic_common::{TalkpicError, TalkpicResult};

    use super::{ActivePlayback, AudioOutput};
    use crate::audio::AudioTrack;

    /// The default output device, driven through rodio.
    ///
    /// The output stream lives on its own thread for the length of the
    /// playback, so nothing device-bound crosses an await point.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SpeakerOutput;

    impl SpeakerOutput {
        pub fn new() -> Self {
            Self
        }
    }

    impl AudioOutput for SpeakerOutput {
        fn name(&self) -> &'static str {
            "speaker"
        }

        fn start(&self, track: &AudioTrack) -> TalkpicResult<Box<dyn ActivePlayback>> {
            if track.is_empty() {
                return Err(TalkpicError::audio("track has no samples to play"));
            }
            let samples = track.samples().to_vec();
            let sample_rate = track.sample_rate();
            let (ready_tx, ready_rx) = mpsc::channel::<TalkpicResult<()>>();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();

            let thread = thread::Builder::new()
                .name("talkpic-speaker".to_string())
                .spawn(move || {
                    let (_stream, handle) = match rodio::OutputStream::try_default() {
                        Ok(pair) => pair,
                        Err(e) => {
                            ready_tx
                                .send(Err(TalkpicError::audio(format!("no output device: {e}"))))
                                .ok();
                            return;
                        }
                    };
                    let sink = match rodio::Sink::try_new(&handle) {
                        Ok(sink) => sink,
                        Err(e) => {
                            ready_tx
                                .send(Err(TalkpicError::audio(format!("cannot open output: {e}"))))
                                .ok();
                            return;
                        }
                    };
                    sink.append(SamplesBuffer::new(1, sample_rate, samples));
                    ready_tx.send(Ok(())).ok();

                    // Returns on stop() or when the playback handle is dropped.
                    stop_rx.recv().ok();
                    sink.stop();
                })?;

            match ready_rx.recv() {
                Ok(Ok(())) => {
                    tracing::debug!(sample_rate, "Speaker output started");
                    Ok(Box::new(SpeakerPlayback {
                        stop_tx: Some(stop_tx),
                        thread: Some(thread),
                    }))
                }
                Ok(Err(err)) => {
                    thread.join().ok();
                    Err(err)
                }
                Err(_) => Err(TalkpicError::audio("speaker thread exited before starting")),
            }
        }
    }

    struct SpeakerPlayback {
        stop_tx: Option<mpsc::Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl ActivePlayback for SpeakerPlayback {
        fn stop(&mut self) {
            if let Some(tx) = self.stop_tx.take() {
                tx.send(()).ok();
            }
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    tracing::warn!("Speaker thread panicked");
                }
                tracing::debug!("Speaker output stopped");
            }
        }
    }

    impl Drop for SpeakerPlayback {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
