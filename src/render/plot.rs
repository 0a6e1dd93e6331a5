use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::path::Path;

use super::text::TextOverlay;

const BACKGROUND: [u8; 4] = [255, 255, 255, 255];
const GRID: [u8; 4] = [225, 225, 225, 255];
const AXIS: [u8; 4] = [0, 0, 0, 255];
const LINE: [u8; 4] = [31, 119, 180, 255];
const LABEL: [u8; 4] = [0, 0, 0, 255];

const TICK_LEN: i32 = 5;
const TARGET_TICKS: f32 = 6.0;

/// A single 2-D line series with its labels.
pub struct LinePlot<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub xs: &'a [f32],
    pub ys: &'a [f32],
}

/// Software rasterizer for line plots.
pub struct PlotRenderer {
    pub width: u32,
    pub height: u32,
    text: Option<TextOverlay>,
}

#[derive(Clone, Copy, Debug)]
struct Margins {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Range {
    min: f32,
    max: f32,
}

impl Range {
    fn of(values: &[f32]) -> Self {
        let (min, max) = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if !min.is_finite() {
            return Self { min: -1.0, max: 1.0 };
        }
        if max - min <= f32::EPSILON * max.abs().max(1.0) {
            return Self { min: min - 1.0, max: max + 1.0 };
        }
        Self { min, max }
    }

    fn padded(self, fraction: f32) -> Self {
        let pad = (self.max - self.min) * fraction;
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    fn span(&self) -> f32 {
        self.max - self.min
    }
}

impl PlotRenderer {
    pub fn new(width: u32, height: u32, text: Option<TextOverlay>) -> Self {
        Self { width, height, text }
    }

    fn margins(&self) -> Margins {
        let line = self.text.as_ref().map_or(0, |t| t.line_height());
        Margins {
            left: (line * 2 + 56).min(self.width / 4),
            right: 20.min(self.width / 10),
            top: (line * 2).max(10).min(self.height / 4),
            bottom: (line * 2 + 16).min(self.height / 4),
        }
    }

    /// Render to an RGBA buffer of `width * height * 4` bytes.
    pub fn render(&self, plot: &LinePlot) -> Vec<u8> {
        let (w, h) = (self.width, self.height);
        let mut pixels: Vec<u8> = BACKGROUND.iter().copied().cycle().take(w as usize * h as usize * 4).collect();

        let m = self.margins();
        let left = m.left as i32;
        let right = w as i32 - m.right as i32 - 1;
        let top = m.top as i32;
        let bottom = h as i32 - m.bottom as i32 - 1;
        if right <= left || bottom <= top {
            log::warn!("Plot area {}x{} is too small to draw into", w, h);
            return pixels;
        }

        let x_range = Range::of(plot.xs);
        let y_range = Range::of(plot.ys).padded(0.05);

        let to_px = |x: f32| left as f32 + (x - x_range.min) / x_range.span() * (right - left) as f32;
        let to_py = |y: f32| bottom as f32 - (y - y_range.min) / y_range.span() * (bottom - top) as f32;

        let x_ticks = nice_ticks(x_range.min, x_range.max);
        let y_ticks = nice_ticks(y_range.min, y_range.max);

        for &t in &x_ticks {
            let px = to_px(t).round() as i32;
            draw_line(&mut pixels, w, h, (px, top), (px, bottom), GRID);
            draw_line(&mut pixels, w, h, (px, bottom), (px, bottom + TICK_LEN), AXIS);
        }
        for &t in &y_ticks {
            let py = to_py(t).round() as i32;
            draw_line(&mut pixels, w, h, (left, py), (right, py), GRID);
            draw_line(&mut pixels, w, h, (left - TICK_LEN, py), (left, py), AXIS);
        }

        // frame
        draw_line(&mut pixels, w, h, (left, top), (right, top), AXIS);
        draw_line(&mut pixels, w, h, (left, bottom), (right, bottom), AXIS);
        draw_line(&mut pixels, w, h, (left, top), (left, bottom), AXIS);
        draw_line(&mut pixels, w, h, (right, top), (right, bottom), AXIS);

        let mut previous: Option<(i32, i32)> = None;
        for (&x, &y) in plot.xs.iter().zip(plot.ys.iter()) {
            if !x.is_finite() || !y.is_finite() {
                previous = None;
                continue;
            }
            let point = (to_px(x).round() as i32, to_py(y).round() as i32);
            match previous {
                Some(from) => draw_line(&mut pixels, w, h, from, point, LINE),
                None => put_pixel(&mut pixels, w, h, point.0, point.1, LINE),
            }
            previous = Some(point);
        }

        if let Some(text) = &self.text {
            let line = text.line_height() as i32;

            let x_step = x_ticks.get(1).zip(x_ticks.first()).map_or(1.0, |(b, a)| b - a);
            for &t in &x_ticks {
                let label = format_tick(t, x_step);
                let px = to_px(t).round() as i32 - text.measure_width(&label) as i32 / 2;
                text.composite(&mut pixels, w, h, &label, px, bottom + TICK_LEN + 2, LABEL);
            }

            let y_step = y_ticks.get(1).zip(y_ticks.first()).map_or(1.0, |(b, a)| b - a);
            for &t in &y_ticks {
                let label = format_tick(t, y_step);
                let px = left - TICK_LEN - 3 - text.measure_width(&label) as i32;
                let py = to_py(t).round() as i32 - line / 2;
                text.composite(&mut pixels, w, h, &label, px, py, LABEL);
            }

            let x_label_w = text.measure_width(plot.x_label) as i32;
            let x_label_y = bottom + TICK_LEN + 2 + line;
            text.composite(&mut pixels, w, h, plot.x_label, (left + right - x_label_w) / 2, x_label_y, LABEL);

            let y_label_h = text.measure_width(plot.y_label) as i32;
            text.composite_vertical(&mut pixels, w, h, plot.y_label, 4, (top + bottom - y_label_h) / 2, LABEL);

            let title_font = text.with_size(text.line_height() as f32);
            let title_w = title_font.measure_width(plot.title) as i32;
            let title_y = (top - title_font.line_height() as i32) / 2;
            title_font.composite(&mut pixels, w, h, plot.title, (w as i32 - title_w) / 2, title_y.max(0), LABEL);
        }

        pixels
    }

    /// Render and write a PNG to `path`, creating the parent directory.
    pub fn save(&self, plot: &LinePlot, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output dir: {}", parent.display()))?;
        }

        let pixels = self.render(plot);
        let image = RgbaImage::from_raw(self.width, self.height, pixels)
            .context("Plot buffer does not match image dimensions")?;
        image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("Failed to write plot: {}", path.display()))?;

        log::info!("Saved plot {}", path.display());
        Ok(())
    }
}

/// Round tick positions covering `[min, max]` with a 1/2/5 × 10^k step.
fn nice_ticks(min: f32, max: f32) -> Vec<f32> {
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return vec![min];
    }

    let raw_step = span / TARGET_TICKS;
    let magnitude = 10f32.powf(raw_step.log10().floor());
    let residual = raw_step / magnitude;
    let step = magnitude
        * if residual < 1.5 {
            1.0
        } else if residual < 3.5 {
            2.0
        } else if residual < 7.5 {
            5.0
        } else {
            10.0
        };

    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last).map(|k| k as f32 * step).collect()
}

fn format_tick(value: f32, step: f32) -> String {
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10()).ceil().max(0.0) as usize
    };
    // avoid "-0"
    let value = if value.abs() < step * 1e-3 { 0.0 } else { value };
    format!("{:.*}", decimals, value)
}

fn put_pixel(pixels: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return;
    }
    let idx = (y as usize * width as usize + x as usize) * 4;
    pixels[idx..idx + 4].copy_from_slice(&color);
}

/// Bresenham line, clipped per pixel.
fn draw_line(pixels: &mut [u8], width: u32, height: u32, from: (i32, i32), to: (i32, i32), color: [u8; 4]) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(pixels, width, height, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_color(pixels: &[u8], color: [u8; 4]) -> usize {
        pixels.chunks_exact(4).filter(|p| *p == color).count()
    }

    #[test]
    fn put_pixel_addresses_rows_by_width() {
        let mut pixels = vec![0u8; 3 * 2 * 4];
        put_pixel(&mut pixels, 3, 2, 2, 1, [1, 2, 3, 4]);
        assert_eq!(&pixels[20..24], &[1, 2, 3, 4]);
        put_pixel(&mut pixels, 3, 2, 3, 0, [9, 9, 9, 9]);
        put_pixel(&mut pixels, 3, 2, 0, -1, [9, 9, 9, 9]);
        assert_eq!(count_color(&pixels, [9, 9, 9, 9]), 0);
    }

    #[test]
    fn nice_ticks_use_round_steps() {
        assert_eq!(nice_ticks(0.0, 24000.0), vec![0.0, 5000.0, 10000.0, 15000.0, 20000.0]);
        let ticks = nice_ticks(-3.3, 3.3);
        assert_eq!(ticks.first().copied(), Some(-3.0));
        assert_eq!(ticks.last().copied(), Some(3.0));
    }

    #[test]
    fn tick_labels_match_step_precision() {
        assert_eq!(format_tick(5000.0, 5000.0), "5000");
        assert_eq!(format_tick(0.5, 0.5), "0.5");
        assert_eq!(format_tick(-1e-9, 0.5), "0.0");
    }

    #[test]
    fn flat_series_gets_a_nonzero_range() {
        let range = Range::of(&[-240.0; 16]);
        assert_eq!(range, Range { min: -241.0, max: -239.0 });
        let empty = Range::of(&[]);
        assert!(empty.span() > 0.0);
    }

    #[test]
    fn render_draws_series_inside_canvas() {
        let xs: Vec<f32> = (0..100).map(|i| i as f32 * 10.0).collect();
        let ys: Vec<f32> = xs.iter().map(|x| (x / 100.0).sin()).collect();
        let renderer = PlotRenderer::new(400, 200, None);
        let pixels = renderer.render(&LinePlot {
            title: "t",
            x_label: "x",
            y_label: "y",
            xs: &xs,
            ys: &ys,
        });

        assert_eq!(pixels.len(), 400 * 200 * 4);
        assert!(count_color(&pixels, LINE) > 100);
        assert!(count_color(&pixels, AXIS) > 0);
    }

    #[test]
    fn save_writes_png_with_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots").join("spectrum.png");
        let xs = [0.0f32, 1.0, 2.0];
        let ys = [-240.0f32, -240.0, -240.0];
        let renderer = PlotRenderer::new(320, 160, None);
        renderer
            .save(
                &LinePlot {
                    title: "silence",
                    x_label: "Frequency (Hz)",
                    y_label: "Magnitude (dB)",
                    xs: &xs,
                    ys: &ys,
                },
                &path,
            )
            .unwrap();

        assert_eq!(image::image_dimensions(&path).unwrap(), (320, 160));
    }

    #[test]
    fn tiny_canvas_does_not_panic() {
        let renderer = PlotRenderer::new(3, 3, None);
        let pixels = renderer.render(&LinePlot {
            title: "",
            x_label: "",
            y_label: "",
            xs: &[0.0, 1.0],
            ys: &[0.0, 1.0],
        });
        assert_eq!(pixels.len(), 36);
    }
}
