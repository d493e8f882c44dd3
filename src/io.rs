use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra as na;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{CalibrationError, CalibrationResult};
use crate::types::{CameraParameters, RigCalibration};

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> CalibrationResult<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> CalibrationResult<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Persisted parameters of one camera, matrices stored row by row.
///
/// The rig's warped scale is duplicated in every record as `focal_length`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub focal_length: f64,
    pub intrinsic: [[f64; 3]; 3],
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

fn rows(m: &na::Matrix3<f64>) -> [[f64; 3]; 3] {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

fn from_rows(rows: &[[f64; 3]; 3]) -> na::Matrix3<f64> {
    na::Matrix3::from_fn(|r, c| rows[r][c])
}

impl CalibrationRecord {
    pub fn new(warped_scale: f64, camera: &CameraParameters) -> CalibrationRecord {
        CalibrationRecord {
            focal_length: warped_scale,
            intrinsic: rows(&camera.intrinsic),
            rotation: rows(&camera.rotation),
            translation: [
                camera.translation.x,
                camera.translation.y,
                camera.translation.z,
            ],
        }
    }

    pub fn camera(&self) -> CameraParameters {
        CameraParameters {
            intrinsic: from_rows(&self.intrinsic),
            rotation: from_rows(&self.rotation),
            translation: na::Vector3::from(self.translation),
        }
    }
}

pub fn record_path<P: AsRef<Path>>(folder: P, camera: usize) -> PathBuf {
    folder.as_ref().join(format!("camparam{}.json", camera))
}

/// Writes one record per camera into `folder`, creating it when missing.
pub fn save_rig_calibration<P: AsRef<Path>>(folder: P, rig: &RigCalibration) -> CalibrationResult<()> {
    std::fs::create_dir_all(folder.as_ref())?;
    for (i, camera) in rig.cameras().iter().enumerate() {
        let record = CalibrationRecord::new(rig.warped_scale(), camera);
        object_to_json(record_path(folder.as_ref(), i), &record)?;
    }
    log::info!(
        "saved {} calibration records to {}",
        rig.camera_count(),
        folder.as_ref().display()
    );
    Ok(())
}

/// Reads the records of `camera_count` cameras back into a rig calibration.
///
/// Every record must carry the same warped scale.
pub fn load_rig_calibration<P: AsRef<Path>>(folder: P, camera_count: usize) -> CalibrationResult<RigCalibration> {
    let records: Vec<CalibrationRecord> = (0..camera_count)
        .map(|i| object_from_json(record_path(folder.as_ref(), i)))
        .collect::<CalibrationResult<_>>()?;
    let Some(first) = records.first() else {
        return Err(CalibrationError::InputCount {
            got: 0,
            expected: camera_count,
        });
    };
    let scale = first.focal_length;
    if let Some(i) = records.iter().position(|r| (r.focal_length - scale).abs() > 1e-9 * scale.abs().max(1.0)) {
        return Err(CalibrationError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "camparam{} has scale {} but camparam0 has {}",
                i, records[i].focal_length, scale
            ),
        )));
    }
    Ok(RigCalibration::new(
        scale,
        records.iter().map(CalibrationRecord::camera).collect(),
    ))
}

/// Writes a human-readable summary of a committed calibration.
pub fn write_report<P: AsRef<Path>>(output_path: P, rig: &RigCalibration) -> CalibrationResult<()> {
    let format = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let mut s = String::new();
    s += format!(
        "Surround view calibration, {}\n",
        now.format(format).unwrap_or_default()
    )
    .as_str();
    s += format!("warped scale: {:.4}\n\n", rig.warped_scale()).as_str();
    for (cam_idx, camera) in rig.cameras().iter().enumerate() {
        let (ppx, ppy) = camera.principal_point();
        let rvec = camera.rvec();
        s += format!("cam{}:\n", cam_idx).as_str();
        s += format!("    focal: {:.4} px\n", camera.focal()).as_str();
        s += format!("    principal point: ({:.2}, {:.2})\n", ppx, ppy).as_str();
        s += format!(
            "    rotation vector: ({:.6}, {:.6}, {:.6})\n\n",
            rvec.x, rvec.y, rvec.z
        )
        .as_str();
    }
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(s.as_bytes())?;
    Ok(())
}
