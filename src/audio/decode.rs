use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Bit depth reported by the container, if any (PCM WAV always has one).
    pub bits_per_sample: Option<u32>,
}

impl AudioData {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Interleaved f32 scratch space, grown only when a packet outgrows it.
struct Scratch {
    buffer: SampleBuffer<f32>,
    frames: u64,
    spec: SignalSpec,
}

/// Decode the first audio track of `path` to a mono f32 signal.
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .with_context(|| format!("No audio tracks found in {}", path.display()))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    let bits_per_sample = track.codec_params.bits_per_sample;
    let expected_frames = track.codec_params.n_frames.unwrap_or(0) as usize;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples: Vec<f32> = Vec::with_capacity(expected_frames);
    let mut scratch: Option<Scratch> = None;
    let mut channels = 1;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                log::warn!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let frames = decoded.capacity() as u64;
        if !matches!(&scratch, Some(s) if s.spec == spec && s.frames >= frames) {
            scratch = None;
        }
        let buf = scratch.get_or_insert_with(|| Scratch {
            buffer: SampleBuffer::new(frames, spec),
            frames,
            spec,
        });
        buf.buffer.copy_interleaved_ref(decoded);

        channels = spec.channels.count().max(1);
        downmix_into(&mut samples, buf.buffer.samples(), channels);
    }

    if channels > 1 {
        log::info!("Down-mixed {} channels to mono", channels);
    }
    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.2}s",
        path.display(),
        samples.len(),
        sample_rate,
        samples.len() as f64 / sample_rate as f64
    );

    Ok(AudioData {
        samples,
        sample_rate,
        bits_per_sample,
    })
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio format: {}", path.display()))?;
    Ok(probed.format)
}

/// Append the per-frame channel mean of `interleaved` to `out`.
fn downmix_into(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
