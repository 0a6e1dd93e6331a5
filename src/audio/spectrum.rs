use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::AnalysisError;

/// Added to linear magnitudes before taking the logarithm.
pub const MAGNITUDE_FLOOR: f32 = 1e-12;

/// How the frame that runs past the end of the signal is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrailingFramePolicy {
    /// Zero-pad the partial frame to `frame_size` and apply the Hann window.
    #[default]
    ZeroPadWindowed,
    /// Re-window the most recent full frame, cumulatively, once per trailing
    /// offset. Full frames must end strictly before the last sample. Kept for
    /// parity with plots produced by the older scripts.
    Legacy,
}

/// Frame size and hop derived from a sample rate and frame duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    pub frame_size: usize,
    pub hop: usize,
}

impl FrameLayout {
    pub fn new(sample_rate: u32, frame_length_ms: f64) -> Result<Self, AnalysisError> {
        if !frame_length_ms.is_finite() || frame_length_ms <= 0.0 {
            return Err(AnalysisError::InvalidFrameLength(format!(
                "frame length must be a positive number of milliseconds, got {}",
                frame_length_ms
            )));
        }
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput("sample rate must be positive".into()));
        }

        let frame_size = (sample_rate as f64 * frame_length_ms / 1000.0).round() as usize;
        let hop = frame_size / 2;
        if hop == 0 {
            return Err(AnalysisError::InvalidFrameLength(format!(
                "{}ms at {}Hz yields {} samples per frame, need at least 2",
                frame_length_ms, sample_rate, frame_size
            )));
        }

        Ok(Self { frame_size, hop })
    }

    /// Number of frame start offsets `0, hop, 2*hop, ...` below `len`.
    pub fn frame_count(&self, len: usize) -> usize {
        len.div_ceil(self.hop)
    }
}

/// Magnitude and phase of every bin of every frame.
///
/// Both matrices are bin-major: `magnitude_db[bin][frame]`.
#[derive(Clone, Debug)]
pub struct FrameSpectra {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop: usize,
    /// DFT bin frequencies in Hz, `fftfreq` ordering.
    pub frequencies: Vec<f32>,
    pub magnitude_db: Vec<Vec<f32>>,
    pub phase: Vec<Vec<f32>>,
}

/// The non-negative half of a single frame's spectrum.
#[derive(Clone, Debug)]
pub struct FrameSpectrum {
    pub index: usize,
    pub frequencies: Vec<f32>,
    pub magnitude_db: Vec<f32>,
    pub phase: Vec<f32>,
}

impl FrameSpectra {
    pub fn frame_count(&self) -> usize {
        self.magnitude_db.first().map_or(0, |bins| bins.len())
    }

    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.frame_size as f32
    }

    /// Bins `0 .. frame_size / 2` of frame `index`.
    pub fn frame(&self, index: usize) -> Result<FrameSpectrum, AnalysisError> {
        let available = self.frame_count();
        if index >= available {
            return Err(AnalysisError::InvalidFrameIndex {
                requested: index,
                available,
            });
        }

        let half = self.frame_size / 2;
        Ok(FrameSpectrum {
            index,
            frequencies: self.frequencies[..half].to_vec(),
            magnitude_db: self.magnitude_db[..half].iter().map(|bin| bin[index]).collect(),
            phase: self.phase[..half].iter().map(|bin| bin[index]).collect(),
        })
    }
}

/// Split `samples` into 50%-overlapping frames and transform each one.
///
/// The default policy only reads `samples`. Under
/// [`TrailingFramePolicy::Legacy`] the last full frame is windowed in place,
/// once per trailing offset, so later consumers of the signal (resampling,
/// WAV output) see the same data the older scripts passed on.
pub fn analyze(
    samples: &mut [f32],
    sample_rate: u32,
    frame_length_ms: f64,
    policy: TrailingFramePolicy,
) -> Result<FrameSpectra, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal);
    }

    let layout = FrameLayout::new(sample_rate, frame_length_ms)?;
    let FrameLayout { frame_size, hop } = layout;
    let hann = hann_window(frame_size);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);

    let mut magnitude_frames: Vec<Vec<f32>> = Vec::with_capacity(layout.frame_count(samples.len()));
    let mut phase_frames: Vec<Vec<f32>> = Vec::with_capacity(layout.frame_count(samples.len()));
    let mut last_full_start: Option<usize> = None;
    let len = samples.len();

    for start in (0..len).step_by(hop) {
        let end = start + frame_size;
        let frame: Vec<f32> = match policy {
            TrailingFramePolicy::ZeroPadWindowed if end <= len => samples[start..end].to_vec(),
            TrailingFramePolicy::ZeroPadWindowed => {
                let mut padded = vec![0.0f32; frame_size];
                let tail = &samples[start..];
                padded[..tail.len()].copy_from_slice(tail);
                apply_window(&mut padded, &hann);
                padded
            }
            TrailingFramePolicy::Legacy if end < len => {
                last_full_start = Some(start);
                samples[start..end].to_vec()
            }
            TrailingFramePolicy::Legacy => {
                let previous = last_full_start.ok_or_else(|| {
                    AnalysisError::InvalidInput(format!(
                        "legacy windowing needs at least one full frame, signal has {} samples for a {}-sample frame",
                        len, frame_size
                    ))
                })?;
                let view = &mut samples[previous..previous + frame_size];
                apply_window(view, &hann);
                view.to_vec()
            }
        };

        let mut buffer: Vec<Complex<f32>> =
            frame.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fft.process(&mut buffer);

        magnitude_frames.push(buffer.iter().map(|c| magnitude_db(*c)).collect());
        phase_frames.push(buffer.iter().map(|c| phase(*c)).collect());
    }

    log::debug!(
        "Analyzed {} frames of {} samples (hop {}) at {}Hz",
        magnitude_frames.len(),
        frame_size,
        hop,
        sample_rate
    );

    Ok(FrameSpectra {
        sample_rate,
        frame_size,
        hop,
        frequencies: fft_frequencies(frame_size, sample_rate),
        magnitude_db: transpose(&magnitude_frames, frame_size),
        phase: transpose(&phase_frames, frame_size),
    })
}

/// Symmetric Hann window, `0.5 - 0.5 cos(2πn / (N - 1))`.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Bin centre frequencies of an `n`-point DFT: `0, 1, ..., ceil(n/2)-1`, then
/// `-floor(n/2), ..., -1`, scaled by `sample_rate / n`.
pub fn fft_frequencies(n: usize, sample_rate: u32) -> Vec<f32> {
    let step = sample_rate as f32 / n as f32;
    let positive = n.div_ceil(2);
    (0..n)
        .map(|k| {
            if k < positive {
                k as f32 * step
            } else {
                -((n - k) as f32) * step
            }
        })
        .collect()
}

fn apply_window(frame: &mut [f32], window: &[f32]) {
    for (s, w) in frame.iter_mut().zip(window.iter()) {
        *s *= w;
    }
}

fn magnitude_db(c: Complex<f32>) -> f32 {
    20.0 * (c.norm() + MAGNITUDE_FLOOR).log10()
}

fn phase(c: Complex<f32>) -> f32 {
    // atan2 on signed zeros can return ±π
    if c.re == 0.0 && c.im == 0.0 {
        0.0
    } else {
        c.arg()
    }
}

fn transpose(frames: &[Vec<f32>], bins: usize) -> Vec<Vec<f32>> {
    (0..bins)
        .map(|bin| frames.iter().map(|frame| frame[bin]).collect())
        .collect()
}
