use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use crate::audio::decode::{decode_audio, AudioData};
use crate::audio::info::InfoReport;
use crate::audio::resample::{downsample_path, resample, write_wav};
use crate::audio::spectrum::{analyze, FrameSpectrum, TrailingFramePolicy};
use crate::cli::Cli;
use crate::config::Config;
use crate::error::AnalysisError;
use crate::export::{export_path, write_json, SpectrumExport};
use crate::render::plot::{LinePlot, PlotRenderer};
use crate::render::text::TextOverlay;

const DEFAULT_BIT_DEPTH: u32 = 16;
/// Largest accepted plot width or height, in pixels.
pub const MAX_PLOT_DIMENSION: u32 = 16384;

/// Fully resolved run parameters: CLI over config over defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub frame_length_ms: f64,
    pub frame_index: usize,
    pub rates: Vec<u32>,
    pub load_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub prefix: Option<String>,
    pub title: Option<String>,
    pub policy: TrailingFramePolicy,
    pub width: u32,
    pub height: u32,
    pub font: Option<PathBuf>,
    pub font_url: Option<String>,
    pub export_json: Option<PathBuf>,
    pub plots: bool,
}

impl Settings {
    pub fn resolve(cli: Cli, config: Config) -> Result<Self> {
        let rates = cli.parsed_rates()?.unwrap_or(config.resample.rates);
        let legacy = cli.legacy_windowing || config.analysis.legacy_windowing;
        let width = cli.width.unwrap_or(config.output.width);
        let height = cli.height.unwrap_or(config.output.height);
        for (name, value) in [("width", width), ("height", height)] {
            if value == 0 || value > MAX_PLOT_DIMENSION {
                anyhow::bail!(
                    "Plot {} must be between 1 and {} pixels, got {}",
                    name,
                    MAX_PLOT_DIMENSION,
                    value
                );
            }
        }

        Ok(Self {
            input: cli.input,
            output_dir: cli.output_dir.unwrap_or(config.output.dir),
            frame_length_ms: cli.frame_length_ms.unwrap_or(config.analysis.frame_length_ms),
            frame_index: cli.frame_index.unwrap_or(config.analysis.frame_index),
            rates,
            load_rate: cli.load_rate.or(config.resample.load_rate),
            bit_depth: cli.bit_depth.or(config.analysis.bit_depth),
            prefix: cli.prefix,
            title: cli.title,
            policy: if legacy {
                TrailingFramePolicy::Legacy
            } else {
                TrailingFramePolicy::ZeroPadWindowed
            },
            width,
            height,
            font: cli.font.or(config.output.font),
            font_url: cli.font_url.or(config.output.font_url),
            export_json: cli.export_json,
            plots: !cli.no_plots,
        })
    }
}

/// What one sample rate's pass produced.
#[derive(Debug)]
pub struct StageOutcome {
    pub source: PathBuf,
    pub sample_rate: u32,
    pub report: InfoReport,
    pub plots: Vec<PathBuf>,
    pub export: Option<PathBuf>,
    /// Set when the spectrum step was reported and skipped.
    pub skipped: Option<AnalysisError>,
}

/// Report, analyze and plot the input, then each down-sampled rate in turn.
pub fn run(settings: &Settings, text: Option<TextOverlay>) -> Result<Vec<StageOutcome>> {
    let mut audio = decode_audio(&settings.input)?;
    let mut source = settings.input.clone();

    if let Some(rate) = settings.load_rate.filter(|&r| r != audio.sample_rate) {
        log::info!("Resampling input from {}Hz to load rate {}Hz", audio.sample_rate, rate);
        audio.samples = resample(&audio.samples, audio.sample_rate, rate)?;
        audio.sample_rate = rate;
    }

    let renderer = PlotRenderer::new(settings.width, settings.height, text);
    let stage_count = settings.rates.len() + 1;
    let pb = ProgressBar::new(stage_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} stages {msg}")?
            .progress_chars("=>-"),
    );

    let mut outcomes = Vec::with_capacity(stage_count);
    for stage in 0..stage_count {
        pb.set_message(format!("{}Hz", audio.sample_rate));
        outcomes.push(run_stage(settings, &renderer, &mut audio, &source, &pb)?);

        // Legacy windowing may have rewritten `audio.samples`; the next rate
        // is derived from that signal, as the older scripts did.
        if let Some(&next_rate) = settings.rates.get(stage) {
            let resampled = resample(&audio.samples, audio.sample_rate, next_rate)?;
            let path = downsample_path(&settings.output_dir, next_rate);
            write_wav(&path, &resampled, next_rate)?;
            audio = decode_audio(&path)?;
            source = path;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(outcomes)
}

fn run_stage(
    settings: &Settings,
    renderer: &PlotRenderer,
    audio: &mut AudioData,
    source: &Path,
    pb: &ProgressBar,
) -> Result<StageOutcome> {
    let bit_depth = settings
        .bit_depth
        .or(audio.bits_per_sample)
        .unwrap_or(DEFAULT_BIT_DEPTH);
    log::info!(
        "Stage {}Hz: {:.2}s from {}",
        audio.sample_rate,
        audio.duration(),
        source.display()
    );
    let report = InfoReport::for_file(source, audio.samples.len(), audio.sample_rate, bit_depth)?;
    pb.suspend(|| report.print());

    let mut outcome = StageOutcome {
        source: source.to_path_buf(),
        sample_rate: audio.sample_rate,
        report,
        plots: Vec::new(),
        export: None,
        skipped: None,
    };

    let sample_rate = audio.sample_rate;
    let analyzed = analyze(&mut audio.samples, sample_rate, settings.frame_length_ms, settings.policy)
        .and_then(|spectra| spectra.frame(settings.frame_index).map(|frame| (spectra, frame)));

    let (spectra, frame) = match analyzed {
        Ok(result) => result,
        Err(err) => {
            pb.suspend(|| match &err {
                AnalysisError::InvalidFrameIndex { requested, available } => println!(
                    "Requested frame number exceeds the total number of frames \
                     (requested frame {}, {} available).",
                    requested + 1,
                    available
                ),
                other => println!("Spectrum analysis skipped: {}", other),
            });
            log::warn!("Skipping spectrum plots at {}Hz: {}", audio.sample_rate, err);
            outcome.skipped = Some(err);
            return Ok(outcome);
        }
    };

    log::info!(
        "Frame {} of {} ({} samples, hop {}, {:.2}Hz per bin)",
        frame.index + 1,
        spectra.frame_count(),
        spectra.frame_size,
        spectra.hop,
        spectra.bin_width()
    );

    let rate_label = audio.sample_rate.to_string();
    let prefix = settings.prefix.as_deref().unwrap_or(&rate_label);

    if settings.plots {
        let title = settings.title.as_deref().unwrap_or(&rate_label);
        outcome.plots = save_plots(renderer, &settings.output_dir, prefix, title, &frame)?;
    }

    if let Some(dir) = &settings.export_json {
        let path = export_path(dir, prefix, frame.index);
        write_json(&path, &SpectrumExport::new(&spectra, &frame, &outcome.report))?;
        outcome.export = Some(path);
    }

    Ok(outcome)
}

/// `<prefix>_frame<N>_magnitude_spectrum.png` and `..._phase_spectrum.png`.
pub fn plot_paths(output_dir: &Path, prefix: &str, frame_index: usize) -> (PathBuf, PathBuf) {
    let n = frame_index + 1;
    (
        output_dir.join(format!("{}_frame{}_magnitude_spectrum.png", prefix, n)),
        output_dir.join(format!("{}_frame{}_phase_spectrum.png", prefix, n)),
    )
}

fn save_plots(
    renderer: &PlotRenderer,
    output_dir: &Path,
    prefix: &str,
    title: &str,
    frame: &FrameSpectrum,
) -> Result<Vec<PathBuf>> {
    let n = frame.index + 1;
    let (magnitude_path, phase_path) = plot_paths(output_dir, prefix, frame.index);

    renderer.save(
        &LinePlot {
            title: &format!("{} - Magnitude Spectrum (Frame {})", title, n),
            x_label: "Frequency (Hz)",
            y_label: "Magnitude (dB)",
            xs: &frame.frequencies,
            ys: &frame.magnitude_db,
        },
        &magnitude_path,
    )?;
    renderer.save(
        &LinePlot {
            title: &format!("{} - Phase Spectrum (Frame {})", title, n),
            x_label: "Frequency (Hz)",
            y_label: "Phase (Radians)",
            xs: &frame.frequencies,
            ys: &frame.phase,
        },
        &phase_path,
    )?;

    Ok(vec![magnitude_path, phase_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::info::SizeComparison;
    use clap::Parser;
    use std::f32::consts::PI;

    fn write_tone(path: &Path, rate: u32, seconds: f32) {
        let samples: Vec<f32> = (0..(rate as f32 * seconds) as usize)
            .map(|n| 0.5 * (2.0 * PI * 440.0 * n as f32 / rate as f32).sin())
            .collect();
        write_wav(path, &samples, rate).unwrap();
    }

    fn settings(input: &Path, output_dir: &Path, extra: &[&str]) -> Settings {
        let mut args = vec![
            "specframe".to_string(),
            input.display().to_string(),
            "-o".to_string(),
            output_dir.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Settings::resolve(Cli::parse_from(args), Config::default()).unwrap()
    }

    #[test]
    fn cli_overrides_config() {
        let config: Config = toml::from_str(
            "[analysis]\nframe_length_ms = 40.0\nframe_index = 5\n[output]\nwidth = 640\n",
        )
        .unwrap();
        let cli = Cli::parse_from(["specframe", "in.wav", "--frame-length-ms", "25", "--rates", "none"]);
        let settings = Settings::resolve(cli, config).unwrap();

        assert_eq!(settings.frame_length_ms, 25.0);
        assert_eq!(settings.frame_index, 5);
        assert_eq!(settings.width, 640);
        assert_eq!(settings.height, 400);
        assert!(settings.rates.is_empty());
        assert_eq!(settings.policy, TrailingFramePolicy::ZeroPadWindowed);
        assert!(settings.plots);
    }

    #[test]
    fn plot_names_use_one_based_frame_numbers() {
        let (mag, phase) = plot_paths(Path::new("out"), "48000", 1);
        assert_eq!(mag, Path::new("out/48000_frame2_magnitude_spectrum.png"));
        assert_eq!(phase, Path::new("out/48000_frame2_phase_spectrum.png"));
    }

    #[test]
    fn full_chain_writes_plots_and_downsampled_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_tone(&input, 48000, 0.5);
        let out = dir.path().join("out");
        let settings = settings(&input, &out, &["--width", "300", "--height", "150"]);

        let outcomes = run(&settings, None).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().map(|o| o.sample_rate).collect::<Vec<_>>(),
            vec![48000, 16000, 8000]
        );

        for outcome in &outcomes {
            assert!(outcome.skipped.is_none());
            assert_eq!(outcome.plots.len(), 2);
            assert!(outcome.report.is_plain_wav_header());
            let (mag, phase) = plot_paths(&out, &outcome.sample_rate.to_string(), 1);
            assert!(mag.exists());
            assert!(phase.exists());
        }

        assert!(out.join("output_downsample_16000.wav").exists());
        assert!(out.join("output_downsample_8000.wav").exists());
        assert_eq!(outcomes[2].source, out.join("output_downsample_8000.wav"));
    }

    #[test]
    fn invalid_frame_index_skips_plots_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("short.wav");
        write_tone(&input, 8000, 0.1);
        let out = dir.path().join("out");
        let settings = settings(&input, &out, &["-f", "1000", "--rates", "none"]);

        let outcomes = run(&settings, None).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].skipped,
            Some(AnalysisError::InvalidFrameIndex {
                requested: 1000,
                available: 10
            })
        );
        assert!(outcomes[0].plots.is_empty());

        let pngs = std::fs::read_dir(&out)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
                    .count()
            })
            .unwrap_or(0);
        assert_eq!(pngs, 0);
    }

    #[test]
    fn json_export_and_custom_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_tone(&input, 16000, 0.2);
        let out = dir.path().join("out");
        let json_dir = dir.path().join("json");
        let settings = settings(
            &input,
            &out,
            &[
                "--rates",
                "none",
                "--prefix",
                "take1",
                "--no-plots",
                "--export-json",
                json_dir.to_str().unwrap(),
            ],
        );

        let outcomes = run(&settings, None).unwrap();
        assert!(outcomes[0].plots.is_empty());
        assert_eq!(outcomes[0].export, Some(json_dir.join("take1_frame2_spectrum.json")));
        assert!(json_dir.join("take1_frame2_spectrum.json").exists());
    }

    #[test]
    fn config_enables_legacy_windowing_and_bit_depth() {
        let config = || -> Config {
            toml::from_str("[analysis]\nlegacy_windowing = true\nbit_depth = 24\n").unwrap()
        };

        let settings = Settings::resolve(Cli::parse_from(["specframe", "in.wav"]), config()).unwrap();
        assert_eq!(settings.policy, TrailingFramePolicy::Legacy);
        assert_eq!(settings.bit_depth, Some(24));

        let cli = Cli::parse_from(["specframe", "in.wav", "--bit-depth", "8"]);
        let settings = Settings::resolve(cli, config()).unwrap();
        assert_eq!(settings.bit_depth, Some(8));
        assert_eq!(settings.policy, TrailingFramePolicy::Legacy);
    }

    #[test]
    fn rejects_unusable_plot_dimensions() {
        let oversized = Cli::parse_from(["specframe", "in.wav", "--width", "40000", "--height", "30000"]);
        let err = Settings::resolve(oversized, Config::default()).unwrap_err();
        assert!(err.to_string().contains("width"));

        let zero = Cli::parse_from(["specframe", "in.wav", "--width", "0"]);
        assert!(Settings::resolve(zero, Config::default()).is_err());

        let config: Config = toml::from_str("[output]\nheight = 20000\n").unwrap();
        let err = Settings::resolve(Cli::parse_from(["specframe", "in.wav"]), config).unwrap_err();
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn load_rate_resamples_before_the_first_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_tone(&input, 48000, 0.5);
        let input_size = std::fs::metadata(&input).unwrap().len();
        let out = dir.path().join("out");
        let settings = settings(&input, &out, &["--load-rate", "16000", "--rates", "none", "--no-plots"]);

        let outcomes = run(&settings, None).unwrap();
        assert_eq!(outcomes.len(), 1);
        let stage = &outcomes[0];
        assert_eq!(stage.source, input);
        assert_eq!(stage.sample_rate, 16000);
        assert!(stage.skipped.is_none());

        // 8000 samples at 16 bits, compared against the untouched 48kHz file
        assert_eq!(stage.report.sample_rate, 16000);
        assert_eq!(stage.report.computed_bytes, 16000);
        assert_eq!(stage.report.file_size_bytes, input_size);
        assert_eq!(stage.report.comparison, SizeComparison::FileLarger);
        assert!(!stage.report.is_plain_wav_header());
    }

    #[test]
    fn bit_depth_override_drives_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_tone(&input, 16000, 0.2);
        let out = dir.path().join("out");
        let settings = settings(&input, &out, &["--bit-depth", "24", "--rates", "none", "--no-plots"]);

        let outcomes = run(&settings, None).unwrap();
        let report = &outcomes[0].report;
        assert_eq!(report.bit_depth, 24);
        assert_eq!(report.computed_bytes, 9600);
        assert_eq!(report.file_size_bytes, 6444);
        assert_eq!(report.comparison, SizeComparison::ComputedLarger);
    }

    #[test]
    fn legacy_windowing_carries_into_downsampled_signal() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        // 960-sample frames, hop 480: offsets 480 and 960 both re-window samples[0..960]
        let samples: Vec<f32> = (0..1010)
            .map(|n| 0.5 * (2.0 * PI * 440.0 * n as f32 / 48000.0).sin())
            .collect();
        write_wav(&input, &samples, 48000).unwrap();

        let default_out = dir.path().join("default");
        let legacy_out = dir.path().join("legacy");
        let default = settings(&input, &default_out, &["--rates", "16000", "--no-plots"]);
        let legacy = settings(
            &input,
            &legacy_out,
            &["--rates", "16000", "--no-plots", "--legacy-windowing"],
        );

        let default_outcomes = run(&default, None).unwrap();
        let legacy_outcomes = run(&legacy, None).unwrap();
        assert!(default_outcomes.iter().all(|o| o.skipped.is_none()));
        assert!(legacy_outcomes.iter().all(|o| o.skipped.is_none()));

        let default_wav = std::fs::read(default_out.join("output_downsample_16000.wav")).unwrap();
        let legacy_wav = std::fs::read(legacy_out.join("output_downsample_16000.wav")).unwrap();
        assert_eq!(default_wav.len(), legacy_wav.len());
        assert_ne!(default_wav, legacy_wav);

        // the windowed region is attenuated, so the legacy signal carries less energy
        let energy = |path: &Path| -> f32 { decode_audio(path).unwrap().samples.iter().map(|s| s * s).sum() };
        assert!(
            energy(&legacy_out.join("output_downsample_16000.wav"))
                < energy(&default_out.join("output_downsample_16000.wav"))
        );
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir.path().join("absent.wav"), dir.path(), &[]);
        assert!(run(&settings, None).is_err());
    }
}
