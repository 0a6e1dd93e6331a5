use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::audio::info::InfoReport;
use crate::audio::spectrum::{FrameSpectra, FrameSpectrum};

/// JSON document for one analyzed frame.
#[derive(Debug, Serialize)]
pub struct SpectrumExport<'a> {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop: usize,
    pub frame_index: usize,
    pub frame_count: usize,
    pub frequencies: &'a [f32],
    pub magnitude_db: &'a [f32],
    pub phase: &'a [f32],
    pub info: &'a InfoReport,
}

impl<'a> SpectrumExport<'a> {
    pub fn new(spectra: &FrameSpectra, frame: &'a FrameSpectrum, info: &'a InfoReport) -> Self {
        Self {
            sample_rate: spectra.sample_rate,
            frame_size: spectra.frame_size,
            hop: spectra.hop,
            frame_index: frame.index,
            frame_count: spectra.frame_count(),
            frequencies: &frame.frequencies,
            magnitude_db: &frame.magnitude_db,
            phase: &frame.phase,
            info,
        }
    }
}

/// `<dir>/<prefix>_frame<N>_spectrum.json`, `N` 1-based.
pub fn export_path(dir: &Path, prefix: &str, frame_index: usize) -> PathBuf {
    dir.join(format!("{}_frame{}_spectrum.json", prefix, frame_index + 1))
}

pub fn write_json(path: &Path, export: &SpectrumExport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export dir: {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), export)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Exported spectrum to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::spectrum::{analyze, TrailingFramePolicy};

    #[test]
    fn writes_selected_frame() {
        let samples = vec![0.0f32; 1600];
        let spectra = analyze(&mut samples.clone(), 8000, 20.0, TrailingFramePolicy::default()).unwrap();
        let frame = spectra.frame(1).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = export_path(dir.path(), "8000", frame.index);
        assert!(path.ends_with("8000_frame2_spectrum.json"));
        let info = InfoReport::compute(samples.len(), 8000, 16, 3244);
        write_json(&path, &SpectrumExport::new(&spectra, &frame, &info)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frame_size"], 160);
        assert_eq!(value["hop"], 80);
        assert_eq!(value["frame_index"], 1);
        assert_eq!(value["frame_count"], 20);
        assert_eq!(value["frequencies"].as_array().unwrap().len(), 80);
        assert_eq!(value["magnitude_db"].as_array().unwrap().len(), 80);
        assert_eq!(value["info"]["computed_bytes"], 3200);
        assert_eq!(value["info"]["comparison"], "file_larger");
    }
}
