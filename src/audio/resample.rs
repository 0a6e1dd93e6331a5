use anyhow::{Context, Result};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::path::Path;

use crate::error::AnalysisError;

const MAX_FLUSHES: usize = 512;

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The output has `ceil(len * to_rate / from_rate)` samples; the resampler's
/// group delay is trimmed from the front so the signal stays aligned.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "cannot resample from {}Hz to {}Hz",
            from_rate, to_rate
        ))
        .into());
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        params,
        samples.len(),
        1, // mono
    )
    .context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let expected_len = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;

    let input = vec![samples.to_vec()];
    let mut output = resampler
        .process(&input, None)
        .context("Resampling failed")?
        .into_iter()
        .next()
        .unwrap_or_default();

    // Flush the filter tail with zero blocks so the end of the signal comes out.
    let silence = vec![vec![0.0f32; samples.len()]];
    let mut flushes = 0;
    while output.len() < delay + expected_len && flushes < MAX_FLUSHES {
        let tail = resampler
            .process(&silence, None)
            .context("Resampling failed")?
            .into_iter()
            .next()
            .unwrap_or_default();
        output.extend(tail);
        flushes += 1;
    }

    let resampled = trim_delay(output, delay, expected_len);

    log::info!(
        "Resampled {} samples @ {}Hz -> {} samples @ {}Hz",
        samples.len(),
        from_rate,
        resampled.len(),
        to_rate
    );

    Ok(resampled)
}

/// Drop the first `delay` samples and keep `expected_len`. A short tail is
/// padded with silence so frame counts downstream stay predictable.
fn trim_delay(output: Vec<f32>, delay: usize, expected_len: usize) -> Vec<f32> {
    let mut trimmed: Vec<f32> = output.into_iter().skip(delay).take(expected_len).collect();
    if trimmed.len() < expected_len {
        log::warn!(
            "Resampler produced {} of {} expected samples; padding {} with silence",
            trimmed.len(),
            expected_len,
            expected_len - trimmed.len()
        );
        trimmed.resize(expected_len, 0.0);
    }
    trimmed
}

/// Write mono samples as 16-bit PCM WAV, creating the parent directory.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output dir: {}", parent.display()))?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &s in samples {
        let pcm = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(pcm)
            .with_context(|| format!("Failed to write WAV data: {}", path.display()))?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize WAV file: {}", path.display()))?;

    log::info!("Wrote {} ({} samples @ {}Hz)", path.display(), samples.len(), sample_rate);
    Ok(())
}

/// `<output_dir>/output_downsample_<rate>.wav`
pub fn downsample_path(output_dir: &Path, rate: u32) -> std::path::PathBuf {
    output_dir.join(format!("output_downsample_{}.wav", rate))
}
