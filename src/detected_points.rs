use nalgebra as na;

pub const DESCRIPTOR_LEN: usize = 128;
pub type Descriptor = [f32; DESCRIPTOR_LEN];

#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    /// Position in full-resolution pixels.
    pub p2d: glam::Vec2,
    pub size: f32,
    /// Dominant gradient orientation in radians.
    pub angle: f32,
    pub response: f32,
    /// Detector octave, -1 for the upsampled base image.
    pub octave: i32,
}

/// Keypoints and descriptors of one camera image; `descriptors[i]` belongs
/// to `keypoints[i]`.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub img_w_h: (u32, u32),
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn empty(img_w_h: (u32, u32)) -> FeatureSet {
        FeatureSet {
            img_w_h,
            keypoints: Vec::new(),
            descriptors: Vec::new(),
        }
    }
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
    /// Keypoint position relative to the image centre.
    pub fn centred(&self, idx: usize) -> na::Vector2<f64> {
        let p = self.keypoints[idx].p2d;
        na::Vector2::new(
            p.x as f64 - self.img_w_h.0 as f64 * 0.5,
            p.y as f64 - self.img_w_h.1 as f64 * 0.5,
        )
    }
}

/// Correspondences from camera `src` to camera `dst`.
///
/// `homography` maps centred `src` pixels onto centred `dst` pixels and is
/// only present when geometric verification succeeded.
#[derive(Debug, Clone)]
pub struct PairwiseMatch {
    pub src: usize,
    pub dst: usize,
    /// `(src keypoint, dst keypoint)` index pairs.
    pub matches: Vec<(usize, usize)>,
    pub inliers_mask: Vec<bool>,
    pub num_inliers: usize,
    pub homography: Option<na::Matrix3<f64>>,
    pub confidence: f64,
}

impl PairwiseMatch {
    pub fn empty(src: usize, dst: usize) -> PairwiseMatch {
        PairwiseMatch {
            src,
            dst,
            matches: Vec::new(),
            inliers_mask: Vec::new(),
            num_inliers: 0,
            homography: None,
            confidence: 0.0,
        }
    }

    /// The same correspondences seen from `dst` to `src`.
    pub fn reversed(&self) -> PairwiseMatch {
        PairwiseMatch {
            src: self.dst,
            dst: self.src,
            matches: self.matches.iter().map(|&(a, b)| (b, a)).collect(),
            inliers_mask: self.inliers_mask.clone(),
            num_inliers: self.num_inliers,
            homography: self.homography.and_then(|h| h.try_inverse()),
            confidence: self.confidence,
        }
    }

    pub fn inlier_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.matches
            .iter()
            .zip(&self.inliers_mask)
            .filter(|(_, inlier)| **inlier)
            .map(|(m, _)| *m)
    }
}

/// Dense `N x N` table of ordered pair matches, `(i, j)` at `i * N + j`.
#[derive(Debug, Clone)]
pub struct MatchTable {
    pub camera_count: usize,
    pub pairs: Vec<PairwiseMatch>,
}

impl MatchTable {
    pub fn get(&self, src: usize, dst: usize) -> &PairwiseMatch {
        &self.pairs[src * self.camera_count + dst]
    }
    pub fn is_complete(&self, camera_count: usize) -> bool {
        self.camera_count == camera_count && self.pairs.len() == camera_count * camera_count
    }
    /// Unordered pairs `i < j` whose confidence exceeds `threshold`.
    pub fn confident_pairs(&self, threshold: f64) -> usize {
        (0..self.camera_count)
            .flat_map(|i| (i + 1..self.camera_count).map(move |j| (i, j)))
            .filter(|&(i, j)| self.get(i, j).confidence > threshold)
            .count()
    }
}
