use nalgebra as na;
use tiny_solver::factors::Factor;

/// Rotation matrix of an axis-angle vector, first order near the identity.
pub fn rodrigues<T: na::RealField>(rx: T, ry: T, rz: T) -> na::Matrix3<T> {
    let theta2 = rx.clone() * rx.clone() + ry.clone() * ry.clone() + rz.clone() * rz.clone();
    let one = T::one();
    let zero = T::zero();
    let eps = T::from_f64(1e-12).unwrap();
    if theta2 < eps {
        return na::Matrix3::new(
            one.clone(),
            -rz.clone(),
            ry.clone(),
            rz,
            one.clone(),
            -rx.clone(),
            -ry,
            rx,
            one,
        );
    }
    let theta = theta2.sqrt();
    let (kx, ky, kz) = (
        rx / theta.clone(),
        ry / theta.clone(),
        rz / theta.clone(),
    );
    let (s, c) = (theta.clone().sin(), theta.cos());
    let v = one - c.clone();
    let k = na::Matrix3::new(
        zero.clone(),
        -kz.clone(),
        ky.clone(),
        kz.clone(),
        zero.clone(),
        -kx.clone(),
        -ky.clone(),
        kx.clone(),
        zero,
    );
    let kv = na::Vector3::new(kx, ky, kz);
    na::Matrix3::identity() * c + kv.clone() * kv.transpose() * v + k * s
}

/// Unit viewing ray of a centred pixel for focal `f` and rotation `r`.
fn unit_ray<T: na::RealField>(f: &T, r: &na::Matrix3<T>, p: &na::Vector2<f64>) -> na::Vector3<T> {
    let x = T::from_f64(p.x).unwrap() / f.clone();
    let y = T::from_f64(p.y).unwrap() / f.clone();
    let ray = r * na::Vector3::new(x, y, T::one());
    let norm = ray.norm();
    ray / norm
}

/// Ray alignment between two cameras of a rotation-only rig.
///
/// Parameter blocks are `[f, rx, ry, rz]` for the source and destination
/// camera. Each correspondence contributes the difference of the two unit
/// rays, scaled by `sqrt(f_src * f_dst)` so residuals read in pixels.
#[derive(Debug, Clone)]
pub struct RayFactor {
    /// Centred `(src, dst)` pixel pairs.
    pub correspondences: Vec<(na::Vector2<f64>, na::Vector2<f64>)>,
}

impl RayFactor {
    pub fn residual_num(&self) -> usize {
        self.correspondences.len() * 3
    }
}

impl<T: na::RealField> Factor<T> for RayFactor {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        let (a, b) = (&params[0], &params[1]);
        let r_a = rodrigues(a[1].clone(), a[2].clone(), a[3].clone());
        let r_b = rodrigues(b[1].clone(), b[2].clone(), b[3].clone());
        let scale = (a[0].clone() * b[0].clone()).sqrt();
        let mut residual = na::DVector::zeros(self.residual_num());
        for (k, (pa, pb)) in self.correspondences.iter().enumerate() {
            let d = (unit_ray(&a[0], &r_a, pa) - unit_ray(&b[0], &r_b, pb)) * scale.clone();
            residual[3 * k] = d[0].clone();
            residual[3 * k + 1] = d[1].clone();
            residual[3 * k + 2] = d[2].clone();
        }
        residual
    }
}
