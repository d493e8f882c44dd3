use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use surround_view::calibration::CalibrationEstimator;
use surround_view::config::SurroundViewConfig;
use surround_view::data_loader::load_rig_images;
use surround_view::features::extract_features;
use surround_view::io::{load_rig_calibration, object_to_json, write_report};
use surround_view::visualization::draw_keypoints;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration JSON, defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate the rig from one image per camera folder `cam{i}`
    Calibrate {
        /// Folder holding cam0, cam1, ... subfolders
        path: String,

        /// Which image of every folder to use
        #[arg(short, long, default_value = "0")]
        frame: usize,

        /// Output folder for the calibration records, overrides the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Text report path
        #[arg(long, default_value = "calibration_report.txt")]
        report: PathBuf,

        /// Write keypoint overlays into this folder
        #[arg(long)]
        debug_keypoints: Option<PathBuf>,
    },
    /// Print persisted calibration records
    Inspect {
        /// Folder with camparam{i}.json, overrides the config
        folder: Option<PathBuf>,
    },
    /// Write the default configuration as JSON
    DefaultConfig {
        #[arg(default_value = "surround_view.json")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SurroundViewConfig::from_json_file(path)?,
        None => SurroundViewConfig::default(),
    };

    match args.command {
        Commands::Calibrate {
            path,
            frame,
            output,
            report,
            debug_keypoints,
        } => {
            let loaded = load_rig_images(&path, config.camera_count, frame)?;
            let images: Vec<&image::RgbImage> = loaded.iter().collect();
            if let Some(dir) = debug_keypoints {
                std::fs::create_dir_all(&dir)?;
                let features = extract_features(&images, &config.calibration)?;
                for (i, (img, f)) in images.iter().zip(&features).enumerate() {
                    draw_keypoints(img, f).save(dir.join(format!("keypoints_cam{}.png", i)))?;
                }
            }
            let folder = output.unwrap_or_else(|| config.calib_folder.clone());
            let mut estimator =
                CalibrationEstimator::new(config.camera_count, config.calibration.clone(), folder);
            let now = Instant::now();
            let rig = estimator.calibrate(&images, true)?;
            println!("calibration took {:.3} sec", now.elapsed().as_secs_f64());
            write_report(&report, &rig)?;
            println!("report written to {}", report.display());
        }
        Commands::Inspect { folder } => {
            let folder = folder.unwrap_or_else(|| config.calib_folder.clone());
            let rig = load_rig_calibration(&folder, config.camera_count)?;
            println!("warped scale: {:.4}", rig.warped_scale());
            for (i, camera) in rig.cameras().iter().enumerate() {
                println!(
                    "cam{}:\nK: {}R: {}t: {}",
                    i, camera.intrinsic, camera.rotation, camera.translation
                );
            }
        }
        Commands::DefaultConfig { output } => {
            object_to_json(&output, &config)?;
            println!("config written to {}", output.display());
        }
    }
    Ok(())
}
