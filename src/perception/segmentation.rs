use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

use crate::config::HsvRange;

/// Convert an RGB pixel to HSV on the 0-180 / 0-255 / 0-255 scale that the
/// colour thresholds are tuned against.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [(h / 2.0).round() as u8, s.round() as u8, max as u8]
}

/// Binary mask (0 / 255) of pixels whose colour falls inside `range`.
pub fn hsv_mask(image: &RgbImage, range: &HsvRange) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if range.contains(rgb_to_hsv(image.get_pixel(x, y).0)) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Erode then dilate with a square element to drop speckle smaller than the
/// element while keeping larger blobs at their original size.
pub fn open_mask(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    dilate(&erode(mask, Norm::LInf, radius), Norm::LInf, radius)
}
