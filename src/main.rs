use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use snap_solve::analysis::{AnalysisClient, GeminiClient};
use snap_solve::capture::{CaptureProvider, StillImageProvider, TestCardCamera};
use snap_solve::config;
use snap_solve::runner::Controller;
use snap_solve::shell;

/// Snap Solve - photograph an exercise, get the answers
#[derive(Parser, Debug)]
#[command(
    name = "snap-solve",
    about = "Photograph a homework exercise and get the final answers from a multimodal model",
    after_help = "ENVIRONMENT VARIABLES:\n\
        SNAP_SOLVE_API_KEY          Service credential (also GEMINI_API_KEY, API_KEY)\n\
        SNAP_SOLVE_ENDPOINT         API base URL\n\
        SNAP_SOLVE_MODEL            Model name\n\
        SNAP_SOLVE_TIMEOUT          Request timeout in seconds\n\
        SNAP_SOLVE_CAMERA           V4L2 device index\n\
        SNAP_SOLVE_RESOLUTION       Capture size: vga, hd, fhd or WxH\n\
        SNAP_SOLVE_JPEG_QUALITY     JPEG quality (1-100)\n\
        SNAP_SOLVE_LOG_FILE         Log file used by the interactive UI\n\
        RUST_LOG                    Log filter (default: warn)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive terminal UI
    Tui {
        /// Use a photo from disk instead of a camera
        #[arg(short, long, conflicts_with_all = ["mock", "device"])]
        image: Option<PathBuf>,

        /// Use the synthetic test card instead of a camera
        #[arg(long, conflicts_with = "device")]
        mock: bool,

        /// Camera index (overrides SNAP_SOLVE_CAMERA)
        #[arg(short, long)]
        device: Option<u32>,

        /// Write logs to this file (the UI owns the terminal)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Solve a photo from disk and print the answer
    Solve {
        /// Photo of the exercise
        #[arg(short, long)]
        image: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available cameras
    Devices,
}

fn init_logging(interactive: bool, log_file: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file.or_else(|| config::get().logging.log_file.clone()) {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        // Anything printed would land on the alternate screen
        None if interactive => builder.with_writer(std::io::sink).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn analyzer() -> Result<Arc<dyn AnalysisClient>, Box<dyn Error>> {
    Ok(Arc::new(GeminiClient::from_env()?))
}

#[cfg(feature = "v4l")]
fn camera(device: Option<u32>) -> Result<Box<dyn CaptureProvider>, Box<dyn Error>> {
    use snap_solve::capture::V4lCamera;

    let camera = match device {
        Some(index) => V4lCamera::new(index, config::get().camera.clone()),
        None => V4lCamera::from_config(),
    };
    Ok(Box::new(camera))
}

#[cfg(not(feature = "v4l"))]
fn camera(device: Option<u32>) -> Result<Box<dyn CaptureProvider>, Box<dyn Error>> {
    let requested = match device {
        Some(index) => format!("camera {}", index),
        None => "a camera".to_string(),
    };
    Err(format!(
        "{} requested but snap-solve was built without the `v4l` feature; use --image <PATH> or --mock",
        requested
    )
    .into())
}

fn provider(
    image: Option<PathBuf>,
    mock: bool,
    device: Option<u32>,
) -> Result<Box<dyn CaptureProvider>, Box<dyn Error>> {
    if let Some(path) = image {
        return Ok(Box::new(StillImageProvider::new(path)));
    }
    if mock {
        return Ok(Box::new(TestCardCamera::default()));
    }
    camera(device)
}

#[cfg(feature = "v4l")]
fn print_devices() {
    let devices = snap_solve::capture::list_devices();
    if devices.is_empty() {
        println!("No V4L2 cameras found");
        return;
    }
    for device in devices {
        println!("  [{}] {} ({})", device.index, device.name, device.path);
    }
}

#[cfg(not(feature = "v4l"))]
fn print_devices() {
    println!("Camera support is disabled in this build.");
    println!("Rebuild with `--features v4l`, or use --image / --mock.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command {
        Some(Commands::Tui {
            image,
            mock,
            device,
            log_file,
        }) => {
            init_logging(true, log_file)?;
            let controller = Controller::new(provider(image, mock, device)?, analyzer()?);
            shell::run(controller).await?;
        }

        Some(Commands::Solve { image, json }) => {
            init_logging(false, None)?;
            let mut controller = Controller::new(provider(Some(image), false, None)?, analyzer()?);
            let report = controller.scan().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(answer) = &report.answer {
                println!("{}", answer);
            } else if let Some(error) = &report.error {
                eprintln!("{}", error);
            }

            if !report.success {
                std::process::exit(1);
            }
        }

        Some(Commands::Devices) => {
            init_logging(false, None)?;
            print_devices();
        }

        None => {
            init_logging(true, None)?;
            let controller = Controller::new(camera(None)?, analyzer()?);
            shell::run(controller).await?;
        }
    }

    Ok(())
}
