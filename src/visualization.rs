use image::{Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::detected_points::FeatureSet;

pub fn id_to_color(id: usize) -> (u8, u8, u8, u8) {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    (
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
        255,
    )
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Copy of `img` with every keypoint drawn as a circle of its scale plus an
/// orientation tick, coloured by keypoint index.
pub fn draw_keypoints(img: &RgbImage, features: &FeatureSet) -> RgbImage {
    let mut out = img.clone();
    for (i, kp) in features.keypoints.iter().enumerate() {
        let (r, g, b, _) = id_to_color(i);
        let color = Rgb([r, g, b]);
        let radius = (kp.size * 0.5).max(2.0);
        let steps = (radius * 8.0).ceil() as usize;
        for s in 0..steps {
            let t = s as f32 / steps as f32 * std::f32::consts::TAU;
            put(
                &mut out,
                (kp.p2d.x + radius * t.cos()).round() as i64,
                (kp.p2d.y + radius * t.sin()).round() as i64,
                color,
            );
        }
        for s in 0..radius.ceil() as usize {
            put(
                &mut out,
                (kp.p2d.x + s as f32 * kp.angle.cos()).round() as i64,
                (kp.p2d.y + s as f32 * kp.angle.sin()).round() as i64,
                color,
            );
        }
    }
    out
}
