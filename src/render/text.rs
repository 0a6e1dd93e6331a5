use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;

/// Fonts tried, in order, when no font was configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// An 8-bit coverage mask of rendered text.
pub struct TextMask {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<u8>,
}

pub struct TextOverlay {
    font: Font,
    font_size: f32,
}

impl TextOverlay {
    /// Load a font from raw bytes, an explicit path, or the system font list,
    /// in that order. Returns `None` when nothing usable is found.
    pub fn load(font_size: f32, font_path: Option<&Path>, font_bytes: Option<&[u8]>) -> Option<Self> {
        if let Some(bytes) = font_bytes {
            match Font::from_bytes(bytes, FontSettings::default()) {
                Ok(font) => return Some(Self { font, font_size }),
                Err(err) => log::warn!("Failed to parse downloaded font: {}", err),
            }
        }

        if let Some(path) = font_path {
            match load_font_file(path) {
                Ok(font) => return Some(Self { font, font_size }),
                Err(err) => log::warn!("{:#}", err),
            }
        }

        for candidate in SYSTEM_FONTS {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            if let Ok(font) = load_font_file(path) {
                log::debug!("Using system font {}", path.display());
                return Some(Self { font, font_size });
            }
        }

        None
    }

    pub fn with_size(&self, font_size: f32) -> Self {
        Self {
            font: self.font.clone(),
            font_size,
        }
    }

    pub fn line_height(&self) -> u32 {
        self.font
            .horizontal_line_metrics(self.font_size)
            .map_or(self.font_size * 1.2, |m| m.new_line_size)
            .ceil() as u32
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str) -> u32 {
        let mut width = 0.0f32;
        for ch in text.chars() {
            let metrics = self.font.metrics(ch, self.font_size);
            width += metrics.advance_width;
        }
        width.ceil() as u32
    }

    /// Rasterize a single line of text into a coverage mask.
    pub fn render_mask(&self, text: &str) -> TextMask {
        let width = self.measure_width(text).max(1);
        let height = self.line_height().max(1);
        let ascent = self
            .font
            .horizontal_line_metrics(self.font_size)
            .map_or(self.font_size, |m| m.ascent);
        let mut alpha = vec![0u8; width as usize * height as usize];

        let mut cursor_x = 0.0f32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_x = (cursor_x + metrics.xmin as f32).round() as i32;
            let glyph_y = (ascent - metrics.height as f32 - metrics.ymin as f32).round() as i32;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    let px = glyph_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if coverage == 0 || px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }
                    let idx = py as usize * width as usize + px as usize;
                    alpha[idx] = alpha[idx].max(coverage);
                }
            }

            cursor_x += metrics.advance_width;
        }

        TextMask { width, height, alpha }
    }

    /// Composite text onto an RGBA pixel buffer with its top-left at `(x, y)`.
    #[allow(clippy::too_many_arguments)]
    pub fn composite(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        text: &str,
        x: i32,
        y: i32,
        color: [u8; 4],
    ) {
        let mask = self.render_mask(text);
        for my in 0..mask.height {
            for mx in 0..mask.width {
                let coverage = mask.alpha[my as usize * mask.width as usize + mx as usize];
                blend(pixels, width, height, x + mx as i32, y + my as i32, coverage, color);
            }
        }
    }

    /// Composite text rotated 90° counter-clockwise, reading bottom to top.
    /// `(x, y)` is the top-left of the rotated bounding box.
    #[allow(clippy::too_many_arguments)]
    pub fn composite_vertical(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        text: &str,
        x: i32,
        y: i32,
        color: [u8; 4],
    ) {
        let mask = self.render_mask(text);
        for my in 0..mask.height {
            for mx in 0..mask.width {
                let coverage = mask.alpha[my as usize * mask.width as usize + mx as usize];
                let px = x + my as i32;
                let py = y + (mask.width - 1 - mx) as i32;
                blend(pixels, width, height, px, py, coverage, color);
            }
        }
    }
}

fn blend(pixels: &mut [u8], width: u32, height: u32, px: i32, py: i32, coverage: u8, color: [u8; 4]) {
    if coverage == 0 || px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
        return;
    }
    let idx = (py as usize * width as usize + px as usize) * 4;
    if idx + 3 >= pixels.len() {
        return;
    }

    let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
    let inv_a = 1.0 - a;
    pixels[idx] = (color[0] as f32 * a + pixels[idx] as f32 * inv_a) as u8;
    pixels[idx + 1] = (color[1] as f32 * a + pixels[idx + 1] as f32 * inv_a) as u8;
    pixels[idx + 2] = (color[2] as f32 * a + pixels[idx + 2] as f32 * inv_a) as u8;
    pixels[idx + 3] = 255;
}

fn load_font_file(path: &Path) -> Result<Font> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read font file: {}", path.display()))?;
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| anyhow::anyhow!("Failed to parse font {}: {}", path.display(), e))
}

/// Download a TTF/OTF font.
pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading font from {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch font from {}", url))?
        .error_for_status()
        .with_context(|| format!("Font download failed: {}", url))?;
    let bytes = response.bytes().context("Failed to read font response body")?;
    Ok(bytes.to_vec())
}
