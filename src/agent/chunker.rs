//! Turns normalized audio frames into fixed-cadence chunks.

use chrono::Utc;

use super::source::AudioFrame;
use crate::relay::{AudioChunk, ChunkId};

/// Accumulates normalized samples and cuts them into chunks on demand.
/// Chunk ids are minted here and are monotonic for the life of the assembler.
pub struct ChunkAssembler {
    target_sample_rate: u32,
    target_channels: u16,
    buffer: Vec<i16>,
    next_chunk: u64,
}

impl ChunkAssembler {
    pub fn new(target_sample_rate: u32, target_channels: u16) -> Self {
        Self {
            target_sample_rate,
            target_channels,
            buffer: Vec::new(),
            next_chunk: 0,
        }
    }

    /// Bring a frame to the target rate and channel count.
    pub fn normalize(&self, frame: AudioFrame) -> Vec<i16> {
        let mut frame = frame;
        if frame.sample_rate != self.target_sample_rate {
            frame = downsample(frame, self.target_sample_rate);
        }
        if frame.channels != self.target_channels && self.target_channels == 1 {
            frame = stereo_to_mono(frame);
        }
        frame.samples
    }

    pub fn extend(&mut self, samples: &[i16]) {
        self.buffer.extend_from_slice(samples);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the buffer into a chunk. Returns None when nothing accumulated.
    pub fn cut(&mut self) -> Option<AudioChunk> {
        if self.buffer.is_empty() {
            return None;
        }

        let samples = std::mem::take(&mut self.buffer);
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let chunk_id = ChunkId(self.next_chunk);
        self.next_chunk += 1;

        Some(AudioChunk {
            chunk_id,
            payload,
            captured_at: Utc::now(),
            sample_rate: self.target_sample_rate,
            channels: self.target_channels,
        })
    }
}

/// Downsample by decimation. Integer ratios only; upsampling is not done.
fn downsample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate {
        return frame;
    }

    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame;
    }

    let samples: Vec<i16> = frame.samples.iter().step_by(ratio as usize).copied().collect();

    AudioFrame {
        samples,
        sample_rate: target_rate,
        ..frame
    }
}

/// Sum left and right channels, clamped. Only stereo input is converted.
fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 2 {
        return frame;
    }

    let mut samples = Vec::with_capacity(frame.samples.len() / 2);
    for pair in frame.samples.chunks_exact(2) {
        let sum = pair[0] as i32 + pair[1] as i32;
        samples.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    AudioFrame {
        samples,
        channels: 1,
        ..frame
    }
}
