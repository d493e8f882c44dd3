//! Pairwise descriptor matching with homography verification.
//!
//! Every unordered camera pair is matched once; the reverse direction is
//! derived from it, so `(j, i)` always carries the inverse homography of
//! `(i, j)` and the same confidence.

use log::{debug, trace, warn};
use nalgebra as na;
use opencv::core::{DMatch, Mat, NORM_L2, Vector};
use opencv::features2d::BFMatcher;
use opencv::prelude::*;
use rayon::prelude::*;

use crate::config::MatcherConfig;
use crate::detected_points::{DESCRIPTOR_LEN, Descriptor, FeatureSet, MatchTable, PairwiseMatch};
use crate::optimization::homography::{HomographyRansac, ransac_homography};

/// Raw matches below this count are not worth a geometric check.
const MIN_PUTATIVE_MATCHES: usize = 6;

/// One `CV_32F` row per descriptor.
fn descriptor_mat(descriptors: &[Descriptor]) -> opencv::Result<Mat> {
    Mat::from_slice_rows_cols(descriptors.as_flattened(), descriptors.len(), DESCRIPTOR_LEN)?.try_clone()
}

/// Two nearest neighbours from `query` into `train`, kept when
/// `d1 < (1 - match_conf) * d2`.
fn ratio_matches(query: &Mat, train: &Mat, match_conf: f32) -> opencv::Result<Vec<(usize, usize)>> {
    let matcher = BFMatcher::new(NORM_L2, false)?;
    let mut knn = Vector::<Vector<DMatch>>::new();
    matcher.knn_train_match(query, train, &mut knn, 2, &Mat::default(), false)?;
    let ratio = 1.0 - match_conf;
    let mut matches = Vec::with_capacity(knn.len());
    for candidates in knn.iter() {
        if candidates.len() < 2 {
            continue;
        }
        let (best, second) = (candidates.get(0)?, candidates.get(1)?);
        if best.distance < ratio * second.distance {
            matches.push((best.query_idx as usize, best.train_idx as usize));
        }
    }
    Ok(matches)
}

/// Union of forward and backward ratio-test matches, without duplicates.
pub fn match_descriptors(a: &FeatureSet, b: &FeatureSet, match_conf: f32) -> opencv::Result<Vec<(usize, usize)>> {
    if a.len() < 2 || b.len() < 2 {
        return Ok(Vec::new());
    }
    let (da, db) = (descriptor_mat(&a.descriptors)?, descriptor_mat(&b.descriptors)?);
    let mut matches = ratio_matches(&da, &db, match_conf)?;
    let mut seen: std::collections::HashSet<(usize, usize)> = matches.iter().cloned().collect();
    for (bi, ai) in ratio_matches(&db, &da, match_conf)? {
        if seen.insert((ai, bi)) {
            matches.push((ai, bi));
        }
    }
    Ok(matches)
}

/// Matches `src` against `dst` and verifies the result with a homography
/// between centred pixel coordinates.
pub fn match_pair(
    src_idx: usize,
    dst_idx: usize,
    src: &FeatureSet,
    dst: &FeatureSet,
    config: &MatcherConfig,
) -> PairwiseMatch {
    let mut pair = PairwiseMatch::empty(src_idx, dst_idx);
    pair.matches = match match_descriptors(src, dst, config.match_conf) {
        Ok(matches) => matches,
        Err(e) => {
            warn!("pair {}-{}: descriptor matching failed: {}", src_idx, dst_idx, e);
            return pair;
        }
    };
    pair.inliers_mask = vec![false; pair.matches.len()];
    if pair.matches.len() < MIN_PUTATIVE_MATCHES {
        trace!("pair {}-{}: {} raw matches", src_idx, dst_idx, pair.matches.len());
        return pair;
    }

    let (p_src, p_dst): (Vec<na::Vector2<f64>>, Vec<na::Vector2<f64>>) = pair
        .matches
        .iter()
        .map(|&(a, b)| (src.centred(a), dst.centred(b)))
        .unzip();
    let options = HomographyRansac {
        threshold: config.ransac_threshold,
        iterations: config.ransac_iterations,
        seed: config.seed,
    };
    let Some(fit) = ransac_homography(&p_src, &p_dst, &options) else {
        return pair;
    };
    pair.inliers_mask = fit.inliers_mask;
    pair.num_inliers = fit.num_inliers;
    if fit.num_inliers < config.min_inliers {
        debug!(
            "pair {}-{}: {} inliers of {} matches, rejected",
            src_idx,
            dst_idx,
            fit.num_inliers,
            pair.matches.len()
        );
        return pair;
    }

    pair.homography = Some(fit.homography);
    let confidence = fit.num_inliers as f64 / (8.0 + 0.3 * pair.matches.len() as f64);
    // near-identical images are not useful for stitching
    pair.confidence = if confidence > 3.0 { 0.0 } else { confidence };
    debug!(
        "pair {}-{}: {} matches, {} inliers, confidence {:.3}",
        src_idx,
        dst_idx,
        pair.matches.len(),
        fit.num_inliers,
        pair.confidence
    );
    pair
}

/// Builds the complete `N x N` table for `features.len()` cameras.
pub fn match_pairs(features: &[FeatureSet], config: &MatcherConfig) -> MatchTable {
    let n = features.len();
    let upper: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();
    let matched: Vec<PairwiseMatch> = upper
        .par_iter()
        .map(|&(i, j)| match_pair(i, j, &features[i], &features[j], config))
        .collect();

    let mut pairs: Vec<PairwiseMatch> = (0..n * n)
        .map(|k| PairwiseMatch::empty(k / n, k % n))
        .collect();
    for m in matched {
        let (i, j) = (m.src, m.dst);
        pairs[j * n + i] = m.reversed();
        pairs[i * n + j] = m;
    }
    MatchTable {
        camera_count: n,
        pairs,
    }
}
