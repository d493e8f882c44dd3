use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::{RenderAssets, RenderConfig};

/// Bowl-shaped projection surface: a flat disk around the car blending into
/// a parabolic wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BowlConfig {
    pub disk_radius: f32,
    pub parab_radius: f32,
    pub hole_radius: f32,
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub vertices_num: u32,
    pub y_start: f32,
}

impl Default for BowlConfig {
    fn default() -> Self {
        Self {
            disk_radius: 0.4,
            parab_radius: 0.55,
            hole_radius: 0.08,
            a: 0.4,
            b: 0.4,
            c: 0.2,
            vertices_num: 750,
            y_start: 1.0,
        }
    }
}

/// Model matrix placing the car mesh on top of the bowl.
pub fn car_transform() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 1.01, 0.0))
        * Mat4::from_rotation_x((-90f32).to_radians())
        * Mat4::from_rotation_y(0f32.to_radians())
        * Mat4::from_rotation_z(180f32.to_radians())
        * Mat4::from_scale(Vec3::splat(0.002))
}

/// Everything the renderer needs once the stitcher is initialized.
#[derive(Debug, Clone)]
pub struct RenderSetup {
    pub width: u32,
    pub height: u32,
    pub bowl: BowlConfig,
    pub bowl_transform: Mat4,
    pub car_transform: Mat4,
    pub assets: RenderAssets,
}

impl RenderSetup {
    pub fn from_config(config: &RenderConfig) -> RenderSetup {
        RenderSetup {
            width: config.width,
            height: config.height,
            bowl: config.bowl.clone(),
            bowl_transform: Mat4::IDENTITY,
            car_transform: car_transform(),
            assets: config.assets.clone(),
        }
    }
}
