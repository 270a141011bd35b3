use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write the raw-sample accumulator as a mono 16-bit PCM WAV file.
/// Debug/validation artifact only; not part of the transcription path.
pub fn write_wav(
    dir: &Path,
    file_stem: &str,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).context("Failed to create export directory")?;
    let path = dir.join(format!("{file_stem}.wav"));

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)
        .with_context(|| format!("Failed to create WAV file: {path:?}"))?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    info!(
        path = %path.display(),
        samples = samples.len(),
        "local capture export written"
    );

    Ok(path)
}
