use log::trace;
use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Options of the 4-point homography consensus search.
#[derive(Debug, Clone)]
pub struct HomographyRansac {
    /// Maximum transfer error, in pixels, for a correspondence to count as inlier.
    pub threshold: f64,
    pub iterations: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct HomographyFit {
    pub homography: na::Matrix3<f64>,
    pub inliers_mask: Vec<bool>,
    pub num_inliers: usize,
}

/// Similarity that moves the centroid to the origin with mean distance sqrt(2).
fn normalizing_transform(pts: &[na::Vector2<f64>]) -> na::Matrix3<f64> {
    let n = pts.len() as f64;
    let c = pts.iter().fold(na::Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_dist = pts.iter().map(|p| (p - c).norm()).sum::<f64>() / n;
    let s = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    na::Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0)
}

fn transform(t: &na::Matrix3<f64>, p: &na::Vector2<f64>) -> na::Vector2<f64> {
    let q = t * na::Vector3::new(p.x, p.y, 1.0);
    na::Vector2::new(q.x / q.z, q.y / q.z)
}

/// Normalised direct linear transform for `dst ~ H * src`.
///
/// Returns `None` for fewer than four correspondences or a degenerate
/// configuration.
pub fn dlt_homography(
    src: &[na::Vector2<f64>],
    dst: &[na::Vector2<f64>],
) -> Option<na::Matrix3<f64>> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }
    let t_src = normalizing_transform(src);
    let t_dst = normalizing_transform(dst);

    // at least 9 rows so the thin SVD still exposes the null vector
    let mut a = na::DMatrix::<f64>::zeros((2 * n).max(9), 9);
    for (i, (ps, pd)) in src.iter().zip(dst).enumerate() {
        let p = transform(&t_src, ps);
        let q = transform(&t_dst, pd);
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = v_t.row(min_idx);
    let h_norm = na::Matrix3::from_fn(|r, c| h[3 * r + c]);

    let h_mat = t_dst.try_inverse()? * h_norm * t_src;
    let scale = h_mat[(2, 2)];
    if scale.abs() <= f64::EPSILON || !h_mat.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h_mat / scale)
}

/// Forward transfer error `|H * src - dst|` in pixels.
pub fn transfer_error(h: &na::Matrix3<f64>, src: &na::Vector2<f64>, dst: &na::Vector2<f64>) -> f64 {
    let q = h * na::Vector3::new(src.x, src.y, 1.0);
    if q.z.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    (na::Vector2::new(q.x / q.z, q.y / q.z) - dst).norm()
}

/// Robust homography from putative correspondences, refitted on the final
/// inlier set.
pub fn ransac_homography(
    src: &[na::Vector2<f64>],
    dst: &[na::Vector2<f64>],
    options: &HomographyRansac,
) -> Option<HomographyFit> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let mut best: Option<(na::Matrix3<f64>, usize)> = None;

    for _ in 0..options.iterations.max(1) {
        let sample = rand::seq::index::sample(&mut rng, n, 4).into_vec();
        let s: Vec<_> = sample.iter().map(|&i| src[i]).collect();
        let d: Vec<_> = sample.iter().map(|&i| dst[i]).collect();
        let Some(h) = dlt_homography(&s, &d) else {
            continue;
        };
        let count = src
            .iter()
            .zip(dst)
            .filter(|(p, q)| transfer_error(&h, p, q) < options.threshold)
            .count();
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((h, count));
            if count == n {
                break;
            }
        }
    }

    let (mut h, _) = best?;
    // refit on the consensus set, keep it only if it does not lose support
    for _ in 0..2 {
        let mask: Vec<bool> = src
            .iter()
            .zip(dst)
            .map(|(p, q)| transfer_error(&h, p, q) < options.threshold)
            .collect();
        let (s, d): (Vec<_>, Vec<_>) = src
            .iter()
            .zip(dst)
            .zip(&mask)
            .filter(|(_, m)| **m)
            .map(|((p, q), _)| (*p, *q))
            .unzip();
        let Some(refit) = dlt_homography(&s, &d) else {
            break;
        };
        let refit_count = src
            .iter()
            .zip(dst)
            .filter(|(p, q)| transfer_error(&refit, p, q) < options.threshold)
            .count();
        if refit_count < s.len() {
            break;
        }
        h = refit;
    }

    let inliers_mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(p, q)| transfer_error(&h, p, q) < options.threshold)
        .collect();
    let num_inliers = inliers_mask.iter().filter(|m| **m).count();
    trace!("homography consensus {}/{}", num_inliers, n);
    Some(HomographyFit {
        homography: h,
        inliers_mask,
        num_inliers,
    })
}

/// Picks the admissible square root among the two closed-form candidates.
fn focal_candidate(v1: f64, v2: f64, d1: f64, d2: f64) -> Option<f64> {
    let ok = |v: f64| v.is_finite() && v > 0.0;
    match (ok(v1), ok(v2)) {
        (true, true) => {
            if d1.abs() > d2.abs() {
                Some(v1.sqrt())
            } else {
                Some(v2.sqrt())
            }
        }
        (true, false) => Some(v1.sqrt()),
        (false, true) => Some(v2.sqrt()),
        _ => None,
    }
}

/// Focal lengths `(f_src, f_dst)` implied by a rotation-only homography
/// between centred pixel coordinates.
///
/// Either side is `None` when the homography does not constrain it, e.g.
/// `h20 * h21 == 0` for a pure rotation about the vertical axis.
pub fn homography_to_focals(h_mat: &na::Matrix3<f64>) -> (Option<f64>, Option<f64>) {
    let h0 = h_mat[(0, 0)];
    let h1 = h_mat[(0, 1)];
    let h2 = h_mat[(0, 2)];
    let h3 = h_mat[(1, 0)];
    let h4 = h_mat[(1, 1)];
    let h5 = h_mat[(1, 2)];
    let h6 = h_mat[(2, 0)];
    let h7 = h_mat[(2, 1)];

    let d1 = h6 * h7;
    let d2 = (h7 - h6) * (h7 + h6);
    let v1 = -(h0 * h1 + h3 * h4) / d1;
    let v2 = (h0 * h0 + h3 * h3 - h1 * h1 - h4 * h4) / d2;
    let f_dst = focal_candidate(v1, v2, d1, d2);

    let d1 = h0 * h3 + h1 * h4;
    let d2 = h0 * h0 + h1 * h1 - h3 * h3 - h4 * h4;
    let v1 = -h2 * h5 / d1;
    let v2 = (h5 * h5 - h2 * h2) / d2;
    let f_src = focal_candidate(v1, v2, d1, d2);

    (f_src, f_dst)
}

/// Single focal estimate from a homography: the geometric mean of both sides
/// when both are constrained.
pub fn homography_to_focal(h_mat: &na::Matrix3<f64>) -> Option<f64> {
    match homography_to_focals(h_mat) {
        (Some(f0), Some(f1)) => Some((f0 * f1).sqrt()),
        (Some(f), None) | (None, Some(f)) => Some(f),
        _ => None,
    }
}
