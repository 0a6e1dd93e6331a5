use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "specframe",
    about = "Frame-level magnitude/phase spectrum plots and size accounting for WAV files"
)]
pub struct Cli {
    /// Input audio file (WAV, FLAC, MP3, OGG)
    pub input: PathBuf,

    /// Directory for plots and down-sampled WAV files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Analysis frame length in milliseconds
    #[arg(long)]
    pub frame_length_ms: Option<f64>,

    /// Frame to plot (0-based; file names use 1-based numbering)
    #[arg(short, long)]
    pub frame_index: Option<usize>,

    /// Down-sampling chain (comma-separated Hz, or "none")
    #[arg(long, value_delimiter = ',')]
    pub rates: Vec<String>,

    /// Resample the input to this rate right after decoding
    #[arg(long)]
    pub load_rate: Option<u32>,

    /// Bits per sample assumed by the size report (default: from file, else 16)
    #[arg(long)]
    pub bit_depth: Option<u32>,

    /// File name prefix for plots (default: the sample rate)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Plot title prefix (default: the sample rate)
    #[arg(long)]
    pub title: Option<String>,

    /// Re-window the last full frame instead of zero-padding the trailing frame
    #[arg(long)]
    pub legacy_windowing: bool,

    /// Plot width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Plot height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// TTF/OTF font for plot labels
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Download the label font from a URL
    #[arg(long)]
    pub font_url: Option<String>,

    /// Also write the plotted frame's spectrum as JSON into this directory
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Skip PNG rendering
    #[arg(long)]
    pub no_plots: bool,

    /// Config file (default: ./specframe.toml, then ~/.config/specframe/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parsed `--rates`; `Ok(None)` when the flag was not given.
    pub fn parsed_rates(&self) -> anyhow::Result<Option<Vec<u32>>> {
        if self.rates.is_empty() {
            return Ok(None);
        }
        if self.rates.iter().any(|r| r.eq_ignore_ascii_case("none")) {
            return Ok(Some(Vec::new()));
        }
        self.rates
            .iter()
            .map(|r| {
                r.trim()
                    .parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("Invalid rate '{}': {}", r, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Some)
    }
}
