use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use indexmap::IndexMap;
use tracing::debug;

use crate::capture::Frame;
use crate::error::SegmentationError;
use crate::pipeline::detection::RegionInstance;
use crate::pipeline::segmentation::ops;
use crate::pipeline::segmentation::thresholds::{structure_color, Modality, ThresholdTable};

const ROI_BACKGROUND_CUTOFF: u8 = 15;
const ROI_CLOSE_KERNEL: u32 = 10;
const ROI_CLOSE_ITERATIONS: u32 = 3;
const MASK_KERNEL: u32 = 5;
const MASK_CLOSE_ITERATIONS: u32 = 2;
const MASK_OPEN_ITERATIONS: u32 = 1;
pub const DEFAULT_MIN_AREA: u32 = 300;
pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.45;

/// Stateless-per-call structure segmentation over intensity thresholds.
///
/// The threshold table is loaded once per instance; every `segment_all` call
/// works on its own buffers, so two calls on the same frame produce
/// bit-identical masks.
pub struct SegmentationEngine {
    modality: Modality,
    table: ThresholdTable,
    min_area: u32,
}

impl SegmentationEngine {
    pub fn new(modality: Modality) -> Self {
        Self {
            modality,
            table: ThresholdTable::for_modality(modality),
            min_area: DEFAULT_MIN_AREA,
        }
    }

    pub fn with_min_area(mut self, min_area: u32) -> Self {
        self.min_area = min_area;
        self
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Luma conversion plus the fixed 5x5 smoothing pass.
    fn preprocess(&self, image: &DynamicImage) -> GrayImage {
        let gray = image.to_luma8();
        ops::gaussian_blur_5x5(&gray)
    }

    /// Binary threshold at the background cutoff, closed to bridge gaps.
    /// Excludes near-black borders and vignetting from all structure masks.
    fn roi_mask(&self, smoothed: &GrayImage) -> GrayImage {
        let roi = ops::threshold_binary(smoothed, ROI_BACKGROUND_CUTOFF);
        ops::morph_close(&roi, ROI_CLOSE_KERNEL, ROI_CLOSE_ITERATIONS)
    }

    /// Segments every structure of the active modality. Masks always share
    /// the frame's dimensions; structures with no surviving component come
    /// back all-zero.
    pub fn segment_all(&self, frame: &Frame) -> IndexMap<String, GrayImage> {
        let smoothed = self.preprocess(frame.image());
        let roi = self.roi_mask(&smoothed);

        let mut masks = IndexMap::with_capacity(self.table.len());
        for structure in self.table.structures() {
            let mask = self.segment_prepared(&smoothed, &roi, structure);
            masks.insert(structure.to_string(), mask);
        }
        masks
    }

    /// Segments a single structure by name. An unknown name yields an
    /// all-zero mask, never an error.
    pub fn segment_structure(&self, frame: &Frame, structure: &str) -> GrayImage {
        let smoothed = self.preprocess(frame.image());
        let roi = self.roi_mask(&smoothed);
        self.segment_prepared(&smoothed, &roi, structure)
    }

    fn segment_prepared(&self, smoothed: &GrayImage, roi: &GrayImage, structure: &str) -> GrayImage {
        let Some(band) = self.table.get(structure) else {
            return GrayImage::new(smoothed.width(), smoothed.height());
        };

        let thresholded = if band.is_inverse() {
            ops::threshold_binary_inv(smoothed, band.high)
        } else {
            ops::threshold_band(smoothed, band.low, band.high)
        };

        let masked = ops::intersect(&thresholded, roi);
        let closed = ops::morph_close(&masked, MASK_KERNEL, MASK_CLOSE_ITERATIONS);
        let opened = ops::morph_open(&closed, MASK_KERNEL, MASK_OPEN_ITERATIONS);

        let (filtered, survivors) = ops::filter_components(&opened, self.min_area);
        debug!(
            structure,
            regions = survivors.len(),
            "Structure segmented"
        );
        filtered
    }

    /// Per-structure region statistics for every surviving connected
    /// component. Structures whose mask is empty are omitted.
    pub fn regions(
        &self,
        masks: &IndexMap<String, GrayImage>,
    ) -> IndexMap<String, Vec<RegionInstance>> {
        let mut results = IndexMap::new();
        for (structure, mask) in masks {
            let (_, components) = ops::connected_components(mask);
            if components.is_empty() {
                continue;
            }
            let instances = components
                .into_iter()
                .map(|c| RegionInstance {
                    centroid: c.centroid,
                    bounding_box: c.bounding_box,
                    area: c.area,
                    perimeter: c.perimeter,
                })
                .collect();
            results.insert(structure.clone(), instances);
        }
        results
    }

    /// Composites the fixed structure colors over the frame, restricted to
    /// mask pixels, alpha-blended against the original at the given opacity
    /// (`DEFAULT_OVERLAY_ALPHA` is the conventional choice). Pure function.
    ///
    /// Masks with mismatched dimensions are a per-frame error; the caller
    /// decides whether to drop the overlay or the whole frame analysis.
    pub fn create_overlay(
        &self,
        frame: &Frame,
        masks: &IndexMap<String, GrayImage>,
        alpha: f32,
    ) -> Result<RgbImage, SegmentationError> {
        let base = frame.image().to_rgb8();
        let (width, height) = base.dimensions();

        for mask in masks.values() {
            if mask.dimensions() != (width, height) {
                return Err(SegmentationError::DimensionMismatch {
                    frame_w: width,
                    frame_h: height,
                    mask_w: mask.width(),
                    mask_h: mask.height(),
                });
            }
        }

        let alpha = alpha.clamp(0.0, 1.0);
        let mut overlay = base.clone();
        for (structure, mask) in masks {
            let Some(color) = structure_color(structure) else {
                continue;
            };
            for (x, y, pixel) in mask.enumerate_pixels() {
                if pixel.0[0] == ops::FOREGROUND {
                    overlay.put_pixel(x, y, Rgb(color));
                }
            }
        }

        let mut blended = RgbImage::new(width, height);
        for ((dst, over), orig) in blended
            .pixels_mut()
            .zip(overlay.pixels())
            .zip(base.pixels())
        {
            for c in 0..3 {
                dst.0[c] = (over.0[c] as f32 * alpha + orig.0[c] as f32 * (1.0 - alpha))
                    .round()
                    .clamp(0.0, 255.0) as u8;
            }
        }
        Ok(blended)
    }
}
