use std::path::PathBuf;

use chrono::Utc;
use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;

use crate::capture::frame::Frame;
use crate::error::CaptureError;

/// Seam between the capture worker and whatever produces pixels. A live
/// device adapter implements this trait outside the core.
pub trait FrameProducer: Send {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    fn describe(&self) -> String;

    /// Called once when capture stops so device-backed sources can release
    /// their handle.
    fn release(&mut self) {}
}

/// Generates surgical-field-like frames without any device: dark background,
/// a pulsing bright disc and a moving instrument streak, plus sensor noise.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    next_id: u64,
    tick: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 0,
            tick: 0,
        }
    }
}

impl FrameProducer for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.next_id += 1;
        self.tick += 1;

        let mut rng = rand::rng();
        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb([60, 20, 30]));

        let cx = (self.width / 2) as i64;
        let cy = (self.height / 2) as i64;
        let phase = self.tick as f64 * 0.2;

        // Pulsing disc, roughly mid-gray so banded thresholds pick it up.
        let radius = (100.0 + 20.0 * phase.sin()) as i64;
        fill_disc(&mut image, cx, cy, radius, Rgb([120, 50, 50]));

        // Bright instrument streak sweeping vertically.
        let tip_y = cy + (50.0 * (self.tick as f64 * 0.08).sin()) as i64;
        draw_streak(&mut image, cx - 200, tip_y, cx - 50, cy, Rgb([210, 210, 220]));

        for pixel in image.pixels_mut() {
            let noise: i16 = rng.random_range(-6..=6);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as i16 + noise).clamp(0, 255) as u8;
            }
        }

        Ok(Frame::new(
            self.next_id,
            DynamicImage::ImageRgb8(image),
            Utc::now(),
        ))
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

fn fill_disc(image: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let r2 = radius * radius;
    for y in (cy - radius).max(0)..(cy + radius).min(height as i64) {
        for x in (cx - radius).max(0)..(cx + radius).min(width as i64) {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= r2 {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn draw_streak(image: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
    for step in 0..=steps {
        let x = x0 + (x1 - x0) * step / steps;
        let y = y0 + (y1 - y0) * step / steps;
        for dy in -2..=2i64 {
            let yy = y + dy;
            if x >= 0 && yy >= 0 && (x as u32) < width && (yy as u32) < height {
                image.put_pixel(x as u32, yy as u32, color);
            }
        }
    }
}

/// Replays an ordered set of image files and wraps back to the first one at
/// end of stream instead of erroring, for looped-file testing.
pub struct FileLoopSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    next_id: u64,
}

impl FileLoopSource {
    pub fn new(mut paths: Vec<PathBuf>) -> Result<Self, CaptureError> {
        if paths.is_empty() {
            return Err(CaptureError::SourceOpen(
                "<file loop>".to_string(),
                "no image files supplied".to_string(),
            ));
        }
        paths.sort();
        Ok(Self {
            paths,
            cursor: 0,
            next_id: 0,
        })
    }

    pub fn from_directory(dir: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let dir = dir.into();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| CaptureError::SourceOpen(dir.display().to_string(), e.to_string()))?;
        let paths = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("png" | "jpg" | "jpeg" | "bmp")
                )
            })
            .collect();
        Self::new(paths)
    }
}

impl FrameProducer for FileLoopSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.cursor >= self.paths.len() {
            // Loop instead of reporting end-of-stream.
            self.cursor = 0;
        }
        let path = &self.paths[self.cursor];
        self.cursor += 1;
        self.next_id += 1;

        let image = image::open(path)
            .map_err(|e| CaptureError::FrameRead(format!("{}: {e}", path.display())))?;
        Ok(Frame::new(self.next_id, image, Utc::now()))
    }

    fn describe(&self) -> String {
        format!("file loop ({} images)", self.paths.len())
    }
}
