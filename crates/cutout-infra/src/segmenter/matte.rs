//! Border-color matting.
//!
//! Estimates the background color from the image border, then flood-fills
//! inward through pixels close to that color. Reached pixels get an alpha
//! that ramps from 0 (within `tolerance`) to 255 (beyond
//! `tolerance + softness`); everything the fill cannot reach stays opaque,
//! so background-colored detail inside the subject is kept. The alpha mask
//! is Gaussian-blurred with sigma `feather` to soften the cut edge.
//!
//! Works well for product shots and portraits on plain backdrops, and needs
//! no model weights.

use std::collections::VecDeque;

use cutout_core::segmenter::Segmenter;
use cutout_types::config::SegmenterConfig;
use cutout_types::error::CutoutError;
use image::{GrayImage, Luma, Rgb, RgbImage, RgbaImage, imageops};

#[derive(Debug, Clone)]
pub struct MatteSegmenter {
    tolerance: f32,
    softness: f32,
    feather: u32,
}

impl MatteSegmenter {
    pub fn new(tolerance: f32, softness: f32, feather: u32) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            softness: softness.max(0.0),
            feather,
        }
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self::new(config.matte_tolerance, config.matte_softness, config.matte_feather)
    }

    fn alpha_for(&self, distance: f32) -> u8 {
        if distance <= self.tolerance {
            0
        } else if distance >= self.tolerance + self.softness {
            255
        } else {
            (((distance - self.tolerance) / self.softness) * 255.0).round() as u8
        }
    }

    fn mask(&self, image: &RgbImage) -> GrayImage {
        let (w, h) = image.dimensions();
        let background = border_color(image);
        let mut mask = GrayImage::from_pixel(w, h, Luma([255]));
        let mut visited = vec![false; w as usize * h as usize];
        let mut queue = VecDeque::new();

        let index = |x: u32, y: u32| y as usize * w as usize + x as usize;

        for x in 0..w {
            queue.push_back((x, 0));
            queue.push_back((x, h - 1));
        }
        for y in 0..h {
            queue.push_back((0, y));
            queue.push_back((w - 1, y));
        }

        while let Some((x, y)) = queue.pop_front() {
            let i = index(x, y);
            if visited[i] {
                continue;
            }
            visited[i] = true;

            let alpha = self.alpha_for(color_distance(image.get_pixel(x, y), &background));
            if alpha == 255 {
                // Subject boundary; the fill stops here.
                continue;
            }
            mask.put_pixel(x, y, Luma([alpha]));

            if x > 0 {
                queue.push_back((x - 1, y));
            }
            if x + 1 < w {
                queue.push_back((x + 1, y));
            }
            if y > 0 {
                queue.push_back((x, y - 1));
            }
            if y + 1 < h {
                queue.push_back((x, y + 1));
            }
        }

        mask
    }
}

impl Segmenter for MatteSegmenter {
    fn name(&self) -> &str {
        "matte"
    }

    fn segment(&self, image: &RgbImage) -> Result<RgbaImage, CutoutError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(CutoutError::Segmentation("empty image".to_string()));
        }

        let mut mask = self.mask(image);
        if self.feather > 0 {
            mask = feather(&mask, self.feather);
        }

        Ok(RgbaImage::from_fn(w, h, |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            image::Rgba([r, g, b, mask.get_pixel(x, y)[0]])
        }))
    }
}

/// Per-channel median of the one-pixel border.
fn border_color(image: &RgbImage) -> [f32; 3] {
    let (w, h) = image.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();

    let mut push = |p: &Rgb<u8>| {
        for (c, values) in channels.iter_mut().enumerate() {
            values.push(p[c]);
        }
    };
    for x in 0..w {
        push(image.get_pixel(x, 0));
        push(image.get_pixel(x, h - 1));
    }
    for y in 1..h.saturating_sub(1) {
        push(image.get_pixel(0, y));
        push(image.get_pixel(w - 1, y));
    }

    channels.map(|mut values| {
        values.sort_unstable();
        values[values.len() / 2] as f32
    })
}

/// Euclidean RGB distance scaled to 0..=255.
fn color_distance(p: &Rgb<u8>, background: &[f32; 3]) -> f32 {
    let sum: f32 = (0..3)
        .map(|c| {
            let d = p[c] as f32 - background[c];
            d * d
        })
        .sum();
    (sum / 3.0).sqrt()
}

/// Gaussian-blur the mask edge by `sigma` pixels.
///
/// Flat regions come out of the float kernel a step off their original
/// value, so near-empty and near-full alpha snaps back to 0 and 255.
fn feather(mask: &GrayImage, sigma: u32) -> GrayImage {
    let mut blurred = imageops::blur(mask, sigma as f32);
    for pixel in blurred.pixels_mut() {
        pixel[0] = match pixel[0] {
            0..=2 => 0,
            253..=255 => 255,
            alpha => alpha,
        };
    }
    blurred
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([245, 245, 245]);
    const DARK: Rgb<u8> = Rgb([30, 40, 60]);

    fn sharp() -> MatteSegmenter {
        MatteSegmenter::new(28.0, 24.0, 0)
    }

    /// White canvas with a dark square from `lo` to `hi` (exclusive).
    fn square(size: u32, lo: u32, hi: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                DARK
            } else {
                WHITE
            }
        })
    }

    #[test]
    fn background_becomes_transparent_and_subject_stays_opaque() {
        let out = sharp().segment(&square(64, 16, 48)).unwrap();
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(8, 40)[3], 0);
        assert_eq!(out.get_pixel(32, 32)[3], 255);
        // color is preserved
        assert_eq!(&out.get_pixel(32, 32).0[..3], &DARK.0);
    }

    #[test]
    fn enclosed_background_colored_detail_is_kept() {
        // A white hole inside the dark square is not reachable from the border.
        let mut img = square(64, 16, 48);
        for y in 28..36 {
            for x in 28..36 {
                img.put_pixel(x, y, WHITE);
            }
        }
        let out = sharp().segment(&img).unwrap();
        assert_eq!(out.get_pixel(31, 31)[3], 255);
        assert_eq!(out.get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn near_background_pixels_get_partial_alpha() {
        let mut img = RgbImage::from_pixel(16, 16, WHITE);
        // distance 40 from the background: inside the 28..52 ramp
        img.put_pixel(8, 8, Rgb([205, 205, 205]));
        let out = sharp().segment(&img).unwrap();
        let alpha = out.get_pixel(8, 8)[3];
        assert!(alpha > 0 && alpha < 255, "alpha {alpha}");
    }

    #[test]
    fn feathering_softens_the_edge_only() {
        let segmenter = MatteSegmenter::new(28.0, 24.0, 2);
        let out = segmenter.segment(&square(64, 16, 48)).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(32, 32)[3], 255);
        let edge = out.get_pixel(16, 32)[3];
        assert!(edge > 0 && edge < 255, "edge alpha {edge}");
    }

    #[test]
    fn feather_keeps_flat_regions_exact() {
        let mut mask = GrayImage::from_pixel(40, 40, Luma([0]));
        for y in 10..30 {
            for x in 10..30 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let soft = feather(&mask, 2);
        assert_eq!(soft.get_pixel(0, 0)[0], 0);
        assert_eq!(soft.get_pixel(20, 20)[0], 255);
        let ramp = [soft.get_pixel(8, 20)[0], soft.get_pixel(10, 20)[0], soft.get_pixel(12, 20)[0]];
        assert!(ramp[0] < ramp[1] && ramp[1] < ramp[2], "ramp {ramp:?}");
    }

    #[test]
    fn border_color_uses_median() {
        let mut img = RgbImage::from_pixel(10, 10, WHITE);
        // a few dark border pixels do not shift the estimate
        img.put_pixel(0, 0, DARK);
        img.put_pixel(9, 9, DARK);
        assert_eq!(border_color(&img), [245.0, 245.0, 245.0]);
    }

    #[test]
    fn single_pixel_image_is_handled() {
        let out = sharp().segment(&RgbImage::from_pixel(1, 1, WHITE)).unwrap();
        assert_eq!(out.dimensions(), (1, 1));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }
}
