//! Closed-form rig initialisation from the pairwise homographies.
//!
//! Focal lengths come from the rotation-only homography constraint, rotations
//! are chained along the maximum spanning tree of the match graph starting at
//! the tree centre.

use std::collections::VecDeque;

use log::{debug, warn};
use nalgebra as na;

use super::CameraEstimate;
use super::homography::homography_to_focal;
use crate::detected_points::MatchTable;
use crate::error::{CalibrationError, CalibrationResult};

/// Median of `values`, sorted in place. Even counts average the two central
/// values.
pub fn median_scale(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) * 0.5)
    }
}

/// One shared focal estimate for every camera.
///
/// Uses the median over all pair estimates when at least `N - 1` pairs
/// constrain the focal, otherwise falls back to the mean image `w + h`.
pub fn estimate_focals(table: &MatchTable, img_sizes: &[(u32, u32)]) -> Vec<f64> {
    let n = table.camera_count;
    let mut all_focals: Vec<f64> = table
        .pairs
        .iter()
        .filter(|p| p.src != p.dst)
        .filter_map(|p| p.homography.as_ref().and_then(homography_to_focal))
        .collect();
    debug!("{} pairwise focal estimates", all_focals.len());

    if n > 0 && all_focals.len() + 1 >= n {
        if let Some(f) = median_scale(&mut all_focals) {
            return vec![f; n];
        }
    }
    let fallback = img_sizes
        .iter()
        .map(|(w, h)| (*w + *h) as f64)
        .sum::<f64>()
        / img_sizes.len().max(1) as f64;
    warn!(
        "only {} pairwise focal estimates for {} cameras, using {:.1}",
        all_focals.len(),
        n,
        fallback
    );
    vec![fallback; n]
}

/// Maximum spanning tree of the verified match graph.
#[derive(Debug, Clone)]
pub struct SpanningTree {
    pub centre: usize,
    /// `(from, to)` edges in breadth-first order from `centre`.
    pub edges: Vec<(usize, usize)>,
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn bfs(adjacency: &[Vec<usize>], start: usize) -> (Vec<usize>, Vec<(usize, usize)>) {
    let mut dist = vec![usize::MAX; adjacency.len()];
    let mut order = Vec::new();
    let mut queue = VecDeque::from([start]);
    dist[start] = 0;
    while let Some(from) = queue.pop_front() {
        for &to in &adjacency[from] {
            if dist[to] == usize::MAX {
                dist[to] = dist[from] + 1;
                order.push((from, to));
                queue.push_back(to);
            }
        }
    }
    (dist, order)
}

/// Kruskal over pairs with a verified homography, weighted by inlier count.
/// A graph that does not connect every camera is a `Convergence` failure.
pub fn max_spanning_tree(table: &MatchTable) -> CalibrationResult<SpanningTree> {
    let n = table.camera_count;
    if n == 0 {
        return Err(CalibrationError::Convergence("empty rig".to_string()));
    }
    let mut candidates: Vec<(usize, usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .filter_map(|(i, j)| {
            let m = table.get(i, j);
            m.homography.map(|_| (i, j, m.num_inliers))
        })
        .collect();
    candidates.sort_by(|a, b| b.2.cmp(&a.2));

    let mut parent: Vec<usize> = (0..n).collect();
    let mut adjacency = vec![Vec::new(); n];
    let mut edge_count = 0;
    for (i, j, _) in candidates {
        let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
        if ri != rj {
            parent[ri] = rj;
            adjacency[i].push(j);
            adjacency[j].push(i);
            edge_count += 1;
        }
    }
    if edge_count + 1 != n {
        return Err(CalibrationError::Convergence(format!(
            "match graph is disconnected, spanning tree covers {} of {} cameras",
            edge_count + 1,
            n
        )));
    }

    // centre = camera with the smallest eccentricity, lowest index on ties
    let centre = (0..n)
        .min_by_key(|&c| {
            let (dist, _) = bfs(&adjacency, c);
            (dist.into_iter().max().unwrap_or(0), c)
        })
        .unwrap_or(0);
    let (_, edges) = bfs(&adjacency, centre);
    Ok(SpanningTree { centre, edges })
}

/// Chains `R_to = R_from * K_from^-1 * H(from, to)^-1 * K_to` along the tree.
pub fn estimate_rotations(
    table: &MatchTable,
    focals: &[f64],
    tree: &SpanningTree,
) -> CalibrationResult<Vec<na::Matrix3<f64>>> {
    let k = |f: f64| na::Matrix3::new(f, 0.0, 0.0, 0.0, f, 0.0, 0.0, 0.0, 1.0);
    let mut rotations = vec![na::Matrix3::identity(); table.camera_count];
    for &(from, to) in &tree.edges {
        let h = table.get(from, to).homography.ok_or_else(|| {
            CalibrationError::Convergence(format!("tree edge {}-{} has no homography", from, to))
        })?;
        let h_inv = h.try_inverse().ok_or_else(|| {
            CalibrationError::Convergence(format!("homography {}-{} is singular", from, to))
        })?;
        let k_from_inv = k(1.0 / focals[from]);
        let relative = k_from_inv * h_inv * k(focals[to]);
        rotations[to] = rotations[from] * relative;
    }
    Ok(rotations)
}

/// Closed-form estimate of every camera plus the tree used to obtain it.
pub fn initial_cameras(
    table: &MatchTable,
    img_sizes: &[(u32, u32)],
) -> CalibrationResult<(Vec<CameraEstimate>, SpanningTree)> {
    let focals = estimate_focals(table, img_sizes);
    let tree = max_spanning_tree(table)?;
    let rotations = estimate_rotations(table, &focals, &tree)?;
    let cameras = focals
        .into_iter()
        .zip(rotations)
        .map(|(focal, rotation)| CameraEstimate { focal, rotation })
        .collect();
    Ok((cameras, tree))
}
