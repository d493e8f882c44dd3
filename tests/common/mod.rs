#![allow(dead_code)]

pub mod stubs;

use nalgebra as na;
use rand::prelude::*;
use image::{Rgb, RgbImage};
use rand_chacha::ChaCha8Rng;
use surround_view::detected_points::{DESCRIPTOR_LEN, Descriptor, FeatureSet, Keypoint};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const FOCAL: f64 = 400.0;

/// Camera-to-world rotation of a camera yawed about the vertical axis and
/// pitched about its own x axis.
pub fn rig_rotation(yaw_deg: f64, pitch_deg: f64) -> na::Matrix3<f64> {
    let yaw = na::Rotation3::from_axis_angle(&na::Vector3::y_axis(), yaw_deg.to_radians());
    let pitch = na::Rotation3::from_axis_angle(&na::Vector3::x_axis(), pitch_deg.to_radians());
    (yaw * pitch).into_inner()
}

/// Rotation-only rig observing a cloud of distinctive directions.
pub struct SyntheticRig {
    pub rotations: Vec<na::Matrix3<f64>>,
    pub features: Vec<FeatureSet>,
}

fn random_descriptor(rng: &mut ChaCha8Rng) -> Descriptor {
    let mut d = [0f32; DESCRIPTOR_LEN];
    d.iter_mut().for_each(|v| *v = rng.random_range(0.0..1.0));
    let n = d.iter().map(|v| v * v).sum::<f32>().sqrt();
    d.iter_mut().for_each(|v| *v /= n);
    d
}

fn project(rotation: &na::Matrix3<f64>, dir: &na::Vector3<f64>) -> Option<glam::Vec2> {
    let c = rotation.transpose() * dir;
    if c.z < 0.1 {
        return None;
    }
    let u = FOCAL * c.x / c.z + WIDTH as f64 * 0.5;
    let v = FOCAL * c.y / c.z + HEIGHT as f64 * 0.5;
    let margin = 10.0;
    if u < margin || v < margin || u > WIDTH as f64 - margin || v > HEIGHT as f64 - margin {
        return None;
    }
    Some(glam::Vec2::new(u as f32, v as f32))
}

/// Every camera sees the subset of `point_count` random unit directions that
/// projects into its image; a direction carries the same descriptor in all
/// cameras.
pub fn synthetic_rig(yaws_deg: &[f64], pitch_deg: f64, point_count: usize, seed: u64) -> SyntheticRig {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rotations: Vec<_> = yaws_deg.iter().map(|y| rig_rotation(*y, pitch_deg)).collect();
    let points: Vec<(na::Vector3<f64>, Descriptor)> = (0..point_count)
        .map(|_| {
            let z: f64 = rng.random_range(-1.0..1.0);
            let phi: f64 = rng.random_range(0.0..std::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            (
                na::Vector3::new(r * phi.cos(), r * phi.sin(), z),
                random_descriptor(&mut rng),
            )
        })
        .collect();

    let features = rotations
        .iter()
        .map(|rot| {
            let mut f = FeatureSet::empty((WIDTH, HEIGHT));
            for (dir, desc) in &points {
                if let Some(p2d) = project(rot, dir) {
                    f.keypoints.push(Keypoint {
                        p2d,
                        size: 4.0,
                        angle: 0.0,
                        response: 1.0,
                        octave: 0,
                    });
                    f.descriptors.push(*desc);
                }
            }
            f
        })
        .collect();
    SyntheticRig {
        rotations,
        features,
    }
}

/// Gaussian spot painted on the viewing sphere; it keeps the same pixel
/// size in every camera that sees it.
struct SkyBlob {
    dir: na::Vector3<f64>,
    sigma: f64,
    amplitude: f64,
}

/// One rendered frame per camera of a rotation-only rig looking at
/// `blob_count` random spots spread over the sphere.
pub fn render_rig_views(yaws_deg: &[f64], pitch_deg: f64, blob_count: usize, seed: u64) -> (Vec<na::Matrix3<f64>>, Vec<RgbImage>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let blobs: Vec<SkyBlob> = (0..blob_count)
        .map(|_| {
            let z: f64 = rng.random_range(-1.0..1.0);
            let phi: f64 = rng.random_range(0.0..std::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            SkyBlob {
                dir: na::Vector3::new(r * phi.cos(), r * phi.sin(), z),
                sigma: rng.random_range(2.0..6.0),
                amplitude: rng.random_range(60.0..200.0),
            }
        })
        .collect();

    let rotations: Vec<_> = yaws_deg.iter().map(|y| rig_rotation(*y, pitch_deg)).collect();
    let images = rotations
        .iter()
        .map(|rot| {
            let (w, h) = (WIDTH as usize, HEIGHT as usize);
            let mut canvas = vec![20.0f64; w * h];
            for blob in &blobs {
                let c = rot.transpose() * blob.dir;
                if c.z < 0.1 {
                    continue;
                }
                let u = FOCAL * c.x / c.z + WIDTH as f64 * 0.5;
                let v = FOCAL * c.y / c.z + HEIGHT as f64 * 0.5;
                let reach = 3.0 * blob.sigma;
                let x0 = (u - reach).floor().max(0.0) as usize;
                let y0 = (v - reach).floor().max(0.0) as usize;
                let x1 = ((u + reach).ceil() as i64).clamp(0, w as i64 - 1) as usize;
                let y1 = ((v + reach).ceil() as i64).clamp(0, h as i64 - 1) as usize;
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let d2 = (x as f64 - u).powi(2) + (y as f64 - v).powi(2);
                        canvas[y * w + x] += blob.amplitude * (-d2 / (2.0 * blob.sigma * blob.sigma)).exp();
                    }
                }
            }
            RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
                let g = canvas[y as usize * w + x as usize].min(255.0) as u8;
                Rgb([g, g, g])
            })
        })
        .collect();
    (rotations, images)
}

/// Feature set of an unrelated scene.
pub fn unrelated_features(count: usize, seed: u64) -> FeatureSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut f = FeatureSet::empty((WIDTH, HEIGHT));
    for _ in 0..count {
        f.keypoints.push(Keypoint {
            p2d: glam::Vec2::new(
                rng.random_range(10.0..WIDTH as f32 - 10.0),
                rng.random_range(10.0..HEIGHT as f32 - 10.0),
            ),
            size: 4.0,
            angle: 0.0,
            response: 1.0,
            octave: 0,
        });
        f.descriptors.push(random_descriptor(&mut rng));
    }
    f
}

/// Angle of `a^T b`, in radians.
pub fn rotation_angle_between(a: &na::Matrix3<f64>, b: &na::Matrix3<f64>) -> f64 {
    na::Rotation3::from_matrix(&(a.transpose() * b)).angle()
}
