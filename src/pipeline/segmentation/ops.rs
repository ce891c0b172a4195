//! Deterministic per-pixel primitives for the segmentation pipeline.
//!
//! Masks are `GrayImage`s holding only 0 or 255. Every operation returns a
//! buffer with the same dimensions as its input.

use image::{GrayImage, Luma};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// 5x5 Gaussian smoothing with the separable binomial kernel
/// [1, 4, 6, 4, 1] / 16, clamped at the borders.
pub fn gaussian_blur_5x5(image: &GrayImage) -> GrayImage {
    const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let mut horizontal = vec![0u16; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            let mut acc: u32 = 0;
            for (k, weight) in KERNEL.iter().enumerate() {
                let sx = (x as i64 + k as i64 - 2).clamp(0, width as i64 - 1) as u32;
                acc += *weight * image.get_pixel(sx, y).0[0] as u32;
            }
            horizontal[(y * width + x) as usize] = (acc / 16) as u16;
        }
    }

    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc: u32 = 0;
            for (k, weight) in KERNEL.iter().enumerate() {
                let sy = (y as i64 + k as i64 - 2).clamp(0, height as i64 - 1) as u32;
                acc += *weight * horizontal[(sy * width + x) as usize] as u32;
            }
            output.put_pixel(x, y, Luma([(acc / 16).min(255) as u8]));
        }
    }
    output
}

/// Pixels strictly above `threshold` become foreground.
pub fn threshold_binary(image: &GrayImage, threshold: u8) -> GrayImage {
    map_pixels(image, |v| v > threshold)
}

/// Pixels at or below `threshold` become foreground.
pub fn threshold_binary_inv(image: &GrayImage, threshold: u8) -> GrayImage {
    map_pixels(image, |v| v <= threshold)
}

/// Pixels inside the inclusive band become foreground.
pub fn threshold_band(image: &GrayImage, low: u8, high: u8) -> GrayImage {
    map_pixels(image, |v| v >= low && v <= high)
}

fn map_pixels(image: &GrayImage, keep: impl Fn(u8) -> bool) -> GrayImage {
    let mut output = GrayImage::new(image.width(), image.height());
    for (dst, src) in output.pixels_mut().zip(image.pixels()) {
        dst.0[0] = if keep(src.0[0]) { FOREGROUND } else { BACKGROUND };
    }
    output
}

pub fn intersect(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut output = GrayImage::new(a.width(), a.height());
    for ((dst, pa), pb) in output.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        dst.0[0] = if pa.0[0] == FOREGROUND && pb.0[0] == FOREGROUND {
            FOREGROUND
        } else {
            BACKGROUND
        };
    }
    output
}

/// Morphological closing with a square kernel: fills gaps and small holes.
pub fn morph_close(mask: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let mut current = mask.clone();
    for _ in 0..iterations {
        current = dilate(&current, kernel);
    }
    for _ in 0..iterations {
        current = erode(&current, kernel);
    }
    current
}

/// Morphological opening with a square kernel: removes small specks.
pub fn morph_open(mask: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let mut current = mask.clone();
    for _ in 0..iterations {
        current = erode(&current, kernel);
    }
    for _ in 0..iterations {
        current = dilate(&current, kernel);
    }
    current
}

/// Square-kernel dilation, separable into a horizontal and a vertical max
/// pass. The window spans [-(k-1)/2, k/2] so even kernel sizes keep the
/// conventional center anchor.
pub fn dilate(mask: &GrayImage, kernel: u32) -> GrayImage {
    rect_filter(mask, kernel, true)
}

pub fn erode(mask: &GrayImage, kernel: u32) -> GrayImage {
    rect_filter(mask, kernel, false)
}

fn rect_filter(mask: &GrayImage, kernel: u32, take_max: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    let kernel = kernel.max(1) as i64;
    let before = (kernel - 1) / 2;
    let after = kernel / 2;

    let pass = |src: &GrayImage, horizontal: bool| -> GrayImage {
        let mut out = GrayImage::new(width, height);
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                let mut value = if take_max { BACKGROUND } else { FOREGROUND };
                for offset in -before..=after {
                    let (sx, sy) = if horizontal { (x + offset, y) } else { (x, y + offset) };
                    let sample = if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                        // Outside the image is neutral for either operation,
                        // so masks touching the border keep their extent.
                        if take_max {
                            BACKGROUND
                        } else {
                            FOREGROUND
                        }
                    } else {
                        src.get_pixel(sx as u32, sy as u32).0[0]
                    };
                    if take_max {
                        value = value.max(sample);
                    } else {
                        value = value.min(sample);
                    }
                }
                out.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
        out
    };

    let horizontal = pass(mask, true);
    pass(&horizontal, false)
}

/// One connected foreground region with its pixel statistics.
#[derive(Debug, Clone)]
pub struct Component {
    pub label: u32,
    pub area: u32,
    /// Boundary pixel count: foreground pixels with at least one
    /// 4-neighbor outside the region.
    pub perimeter: u32,
    pub centroid: (u32, u32),
    pub bounding_box: (u32, u32, u32, u32),
}

/// 8-connected component labelling. Returns the label map (0 = background,
/// labels start at 1) together with per-component statistics.
pub fn connected_components(mask: &GrayImage) -> (Vec<u32>, Vec<Component>) {
    let (width, height) = mask.dimensions();
    let size = (width * height) as usize;
    let mut labels = vec![0u32; size];
    let mut components = Vec::new();

    let index = |x: u32, y: u32| (y * width + x) as usize;
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut next_label: u32 = 0;

    for start_y in 0..height {
        for start_x in 0..width {
            if mask.get_pixel(start_x, start_y).0[0] != FOREGROUND
                || labels[index(start_x, start_y)] != 0
            {
                continue;
            }

            next_label += 1;
            let label = next_label;
            stack.push((start_x, start_y));
            labels[index(start_x, start_y)] = label;

            let mut area: u32 = 0;
            let mut perimeter: u32 = 0;
            let mut sum_x: u64 = 0;
            let mut sum_y: u64 = 0;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (start_x, start_y, start_x, start_y);

            while let Some((x, y)) = stack.pop() {
                area += 1;
                sum_x += x as u64;
                sum_y += y as u64;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let mut on_boundary = false;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        let inside =
                            nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64;
                        let neighbor_fg = inside
                            && mask.get_pixel(nx as u32, ny as u32).0[0] == FOREGROUND;

                        if dx.abs() + dy.abs() == 1 && !neighbor_fg {
                            on_boundary = true;
                        }
                        if neighbor_fg {
                            let ni = index(nx as u32, ny as u32);
                            if labels[ni] == 0 {
                                labels[ni] = label;
                                stack.push((nx as u32, ny as u32));
                            }
                        }
                    }
                }
                if on_boundary {
                    perimeter += 1;
                }
            }

            components.push(Component {
                label,
                area,
                perimeter,
                centroid: ((sum_x / area as u64) as u32, (sum_y / area as u64) as u32),
                bounding_box: (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
            });
        }
    }

    (labels, components)
}

/// Keeps only the pixels belonging to components at or above `min_area` and
/// returns the redrawn mask plus the surviving components.
pub fn filter_components(mask: &GrayImage, min_area: u32) -> (GrayImage, Vec<Component>) {
    let (labels, components) = connected_components(mask);
    let survivors: Vec<Component> = components
        .into_iter()
        .filter(|c| c.area >= min_area)
        .collect();

    let mut keep = vec![false; survivors.iter().map(|c| c.label).max().unwrap_or(0) as usize + 1];
    for component in &survivors {
        keep[component.label as usize] = true;
    }

    let (width, height) = mask.dimensions();
    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let label = labels[(y * width + x) as usize] as usize;
            if label != 0 && label < keep.len() && keep[label] {
                output.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    (output, survivors)
}

pub fn count_foreground(mask: &GrayImage) -> u32 {
    mask.pixels().filter(|p| p.0[0] == FOREGROUND).count() as u32
}
