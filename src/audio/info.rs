use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Size of the canonical RIFF/WAVE header for PCM data.
pub const WAV_HEADER_BYTES: u64 = 44;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeComparison {
    ComputedLarger,
    FileLarger,
    Equal,
}

/// Raw sample payload size versus the size of the file on disk.
#[derive(Clone, Debug, Serialize)]
pub struct InfoReport {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub computed_bytes: u64,
    pub file_size_bytes: u64,
    pub comparison: SizeComparison,
}

impl InfoReport {
    pub fn compute(sample_count: usize, sample_rate: u32, bit_depth: u32, file_size_bytes: u64) -> Self {
        let duration_seconds = sample_count as f64 / sample_rate as f64;
        // duration * sample_rate is the sample count; stay in integers
        let total_bits = sample_count as u64 * bit_depth as u64;
        let computed_bytes = total_bits / 8;

        let comparison = match computed_bytes.cmp(&file_size_bytes) {
            std::cmp::Ordering::Greater => SizeComparison::ComputedLarger,
            std::cmp::Ordering::Less => SizeComparison::FileLarger,
            std::cmp::Ordering::Equal => SizeComparison::Equal,
        };

        Self {
            duration_seconds,
            sample_rate,
            bit_depth,
            computed_bytes,
            file_size_bytes,
            comparison,
        }
    }

    /// Same as [`InfoReport::compute`] with the size read from `path`.
    pub fn for_file(path: &Path, sample_count: usize, sample_rate: u32, bit_depth: u32) -> Result<Self> {
        let file_size = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        Ok(Self::compute(sample_count, sample_rate, bit_depth, file_size))
    }

    /// Bytes on disk beyond the raw sample payload, if any.
    pub fn overhead_bytes(&self) -> Option<u64> {
        self.file_size_bytes.checked_sub(self.computed_bytes)
    }

    pub fn is_plain_wav_header(&self) -> bool {
        self.overhead_bytes() == Some(WAV_HEADER_BYTES)
    }

    pub fn message(&self) -> String {
        match self.comparison {
            SizeComparison::ComputedLarger => "The calculated information is larger than the file size. \
                 This might be an error in calculation or assumptions about bit depth."
                .to_string(),
            SizeComparison::FileLarger if self.is_plain_wav_header() => {
                "The file size is larger due to the file header in WAV format. \
                 Adding the file header size of 44 bytes in WAV format results in the same value."
                    .to_string()
            }
            SizeComparison::FileLarger => format!(
                "The file size is larger by {} bytes, possibly due to metadata, encoding overhead, \
                 or because the actual bit depth/sample format is different.",
                self.overhead_bytes().unwrap_or_default()
            ),
            SizeComparison::Equal => "The calculated information and file size are equal.".to_string(),
        }
    }

    pub fn print(&self) {
        println!("Total time: {:.2} seconds", self.duration_seconds);
        println!("Sampling rate: {} Hz", self.sample_rate);
        println!("Total information: {} bytes", self.computed_bytes);
        println!("File size: {} bytes", self.file_size_bytes);
        println!("{}", self.message());
    }
}
