//! Incremental WAV framing of engine output.
//!
//! A [`StreamFramer`] turns a lazy chunk sequence into byte frames: first a
//! header for an empty mono 16-bit stream, then one PCM16 frame per chunk.
//! Frames cross from the blocking producer to the async consumer through a
//! bounded channel; when the consumer goes away the producer's next send
//! fails and it stops pulling from the engine.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tracing::warn;
use voxweave_domain::VoiceError;

use crate::Result;
use crate::audio::{empty_stream_header, pcm16_bytes};
use crate::engine::EngineChunk;

/// Async side of a streamed synthesis.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

pub struct StreamFramer<I> {
    chunks: I,
    header: Option<Bytes>,
    finished: bool,
}

impl<I> StreamFramer<I>
where
    I: Iterator<Item = Result<EngineChunk>>,
{
    pub fn new(chunks: I, sample_rate: u32) -> Self {
        Self {
            chunks,
            header: Some(Bytes::from(empty_stream_header(sample_rate))),
            finished: false,
        }
    }
}

impl<I> Iterator for StreamFramer<I>
where
    I: Iterator<Item = Result<EngineChunk>>,
{
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(header) = self.header.take() {
            return Some(Ok(header));
        }
        while !self.finished {
            match self.chunks.next() {
                None => self.finished = true,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(chunk)) => {
                    let samples = chunk.into_samples();
                    if !samples.is_empty() {
                        return Some(Ok(Bytes::from(pcm16_bytes(&samples))));
                    }
                }
            }
        }
        None
    }
}

impl<I> std::iter::FusedIterator for StreamFramer<I> where I: Iterator<Item = Result<EngineChunk>> {}

/// Push every frame into `tx`, stopping early if the receiver is gone.
/// Returns the number of frames delivered. Must run on a blocking thread.
pub fn pump_frames<I>(frames: I, tx: &mpsc::Sender<Result<Bytes>>) -> usize
where
    I: Iterator<Item = Result<Bytes>>,
{
    let mut sent = 0;
    for frame in frames {
        if tx.blocking_send(frame).is_err() {
            warn!(frames = sent, "stream consumer dropped; abandoning generation");
            break;
        }
        sent += 1;
    }
    sent
}

/// Receiver side, with a bound on the gap between consecutive frames.
pub fn receive_frames(mut rx: mpsc::Receiver<Result<Bytes>>, idle: Duration) -> FrameStream {
    Box::pin(async_stream::stream! {
        loop {
            match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(frame)) => {
                    let failed = frame.is_err();
                    yield frame;
                    if failed {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    yield Err(VoiceError::SynthesisTimeout { secs: idle.as_secs() });
                    break;
                }
            }
        }
    })
}
