// The agent-side audio pipeline: normalization, chunk cutting, WAV export.

use tabcast::agent::export::write_wav;
use tabcast::{AudioFrame, ChunkAssembler, ChunkId};
use tempfile::TempDir;

fn frame(samples: Vec<i16>, sample_rate: u32, channels: u16) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: 0,
    }
}

#[test]
fn normalize_downsamples_by_decimation() {
    let assembler = ChunkAssembler::new(16_000, 1);
    // 32kHz mono, ratio 2: every other sample survives.
    let samples: Vec<i16> = (0..1000).map(|i| i as i16).collect();
    let normalized = assembler.normalize(frame(samples, 32_000, 1));

    assert_eq!(normalized.len(), 500);
    assert_eq!(normalized[0], 0);
    assert_eq!(normalized[1], 2);
}

#[test]
fn normalize_converts_stereo_to_mono_with_clamped_sum() {
    let assembler = ChunkAssembler::new(16_000, 1);
    let normalized = assembler.normalize(frame(
        vec![100, 200, i16::MAX, i16::MAX, -50, 25],
        16_000,
        2,
    ));

    assert_eq!(normalized, vec![300, i16::MAX, -25]);
}

#[test]
fn normalize_passes_through_matching_frames() {
    let assembler = ChunkAssembler::new(16_000, 1);
    let samples = vec![1, 2, 3, 4];
    let normalized = assembler.normalize(frame(samples.clone(), 16_000, 1));
    assert_eq!(normalized, samples);
}

#[test]
fn cut_on_empty_buffer_yields_nothing() {
    let mut assembler = ChunkAssembler::new(16_000, 1);
    assert!(assembler.cut().is_none());
}

#[test]
fn cut_drains_buffer_and_mints_monotonic_ids() {
    let mut assembler = ChunkAssembler::new(16_000, 1);

    assembler.extend(&[1, 2, 3]);
    let first = assembler.cut().unwrap();
    assert_eq!(first.chunk_id, ChunkId(0));
    assert_eq!(first.payload.len(), 6); // 3 samples, 2 bytes each
    assert_eq!(first.sample_count(), 3);
    assert_eq!(assembler.buffered(), 0);

    assembler.extend(&[4, 5]);
    let second = assembler.cut().unwrap();
    assert_eq!(second.chunk_id, ChunkId(1));
    assert_eq!(second.sample_count(), 2);
}

#[test]
fn chunk_payload_is_little_endian_pcm16() {
    let mut assembler = ChunkAssembler::new(16_000, 1);
    assembler.extend(&[0x0102, -2]);
    let chunk = assembler.cut().unwrap();
    assert_eq!(chunk.payload, vec![0x02, 0x01, 0xFE, 0xFF]);
}

#[test]
fn wav_export_round_trips_through_hound() {
    let dir = TempDir::new().unwrap();
    let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();

    let path = write_wav(dir.path(), "capture-test", &samples, 16_000, 1).unwrap();
    assert!(path.exists());
    assert!(path.to_string_lossy().ends_with("capture-test.wav"));

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read_back: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(read_back, samples);
}
