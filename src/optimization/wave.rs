use log::debug;
use nalgebra as na;

/// Horizontal wave correction.
///
/// Finds the common "up" direction as the normal of the plane best fitting
/// every camera's x axis and rotates the rig so that it becomes the world y
/// axis. The rig's mean viewing direction fixes the remaining degree of
/// freedom. No-op for fewer than two cameras.
pub fn wave_correct_horizontal(rotations: &mut [na::Matrix3<f64>]) {
    if rotations.len() <= 1 {
        return;
    }
    let moment = rotations.iter().fold(na::Matrix3::zeros(), |acc, r| {
        let c = r.column(0);
        acc + c * c.transpose()
    });
    let eigen = na::SymmetricEigen::new(moment);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, v)| {
            if *v < best.1 { (i, *v) } else { best }
        });
    let mut rg1: na::Vector3<f64> = eigen.eigenvectors.column(min_idx).into_owned();

    let img_k = rotations
        .iter()
        .fold(na::Vector3::zeros(), |acc, r| acc + r.column(2));
    let mut rg0 = rg1.cross(&img_k);
    let norm = rg0.norm();
    if norm <= f64::MIN_POSITIVE {
        debug!("wave correction skipped, degenerate viewing directions");
        return;
    }
    rg0 /= norm;

    let conf: f64 = rotations.iter().map(|r| rg0.dot(&r.column(0))).sum();
    if conf < 0.0 {
        rg0 = -rg0;
        rg1 = -rg1;
    }
    let rg2 = rg0.cross(&rg1);

    let correction = na::Matrix3::from_rows(&[rg0.transpose(), rg1.transpose(), rg2.transpose()]);
    for r in rotations.iter_mut() {
        *r = correction * *r;
    }
}
