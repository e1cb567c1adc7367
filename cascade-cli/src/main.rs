//! Command-line reduction tool for Cascade TOF measurements.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::too_many_lines
)]

use clap::{Args, Parser, Subcommand, ValueEnum};

use cascade_analysis::{fit_sinusoid, AnalysisMethod, BlockOptions, ContrastEngine, FitSettings};
use cascade_core::{Compression, PadConfig, PadImage, Roi, TofConfig, TofCube};
use cascade_io::{guess_pad_geometry, guess_tof_geometry, load_pad, load_roi, load_tof, save_pad, save_tof};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file error: {0}")]
    CascadeIo(#[from] cascade_io::Error),

    #[error("core error: {0}")]
    Core(#[from] cascade_core::Error),

    #[error("analysis error: {0}")]
    Analysis(#[from] cascade_analysis::Error),
}

/// Analysis method selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Weighted sinusoid fit (with uncertainties)
    Fit,
    /// Single-bin Fourier extraction
    Fourier,
}

impl From<Method> for AnalysisMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Fit => AnalysisMethod::SinusoidFit,
            Method::Fourier => AnalysisMethod::Fourier,
        }
    }
}

/// Detector geometry of the input files.
#[derive(Debug, Args, Clone)]
struct GeometryArgs {
    /// Image width in pixels
    #[arg(long, default_value = "128")]
    width: usize,

    /// Image height in pixels
    #[arg(long, default_value = "128")]
    height: usize,

    /// Number of foils
    #[arg(long, default_value = "6")]
    foils: usize,

    /// Time channels per foil
    #[arg(long, default_value = "16")]
    channels: usize,

    /// Raw frame count of a TOF acquisition
    #[arg(long, default_value = "128")]
    images: usize,

    /// Full oscillations over one foil cycle
    #[arg(long, default_value = "2.0")]
    oscillations: f64,

    /// Contiguous (pseudo-compressed) TOF layout
    #[arg(long)]
    pseudo_compression: bool,

    /// Sum the first and last time channel (wrap-around acquisition)
    #[arg(long)]
    sum_first_last: bool,
}

impl GeometryArgs {
    fn pad_config(&self) -> PadConfig {
        PadConfig::new(self.width, self.height)
    }

    fn tof_config(&self) -> TofConfig {
        let compression = if self.pseudo_compression {
            Compression::Pseudo
        } else {
            Compression::None
        };
        TofConfig::new(self.pad_config(), self.foils, self.channels, self.images)
            .with_oscillations(self.oscillations)
            .with_compression(compression)
            .with_sum_first_last(self.sum_first_last)
    }
}

/// Reduction tool for Cascade TOF detector data.
#[derive(Parser)]
#[command(name = "cascade")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a raw file and report (or guess) its geometry
    Info {
        /// Input file
        input: PathBuf,

        /// Treat the file as a TOF cube instead of a PAD frame
        #[arg(short, long)]
        tof: bool,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Total counts of a PAD frame or TOF cube
    Counts {
        /// Input file
        input: PathBuf,

        /// Treat the file as a TOF cube instead of a PAD frame
        #[arg(short, long)]
        tof: bool,

        /// ROI definition file to weight the counts with
        #[arg(long)]
        roi: Option<PathBuf>,

        /// Subtract the background estimated outside the ROI
        #[arg(long)]
        subtract_background: bool,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Per-foil contrast and phase of a TOF cube
    Contrast {
        /// Input TOF file
        input: PathBuf,

        /// Analysis method
        #[arg(short, long, value_enum, default_value = "fit")]
        method: Method,

        /// Minimum counts required to analyze a graph
        #[arg(long, default_value = "50")]
        min_counts: u64,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Phase-aligned sum of all foils of a TOF cube
    TotalGraph {
        /// Input TOF file
        input: PathBuf,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Write a synthetic PAD frame or TOF cube
    Simulate {
        /// Output file
        output: PathBuf,

        /// Generate a TOF cube instead of a PAD frame
        #[arg(short, long)]
        tof: bool,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Convert a raw PAD frame to a text matrix
    Convert {
        /// Input raw PAD file
        input: PathBuf,

        /// Output text file
        output: PathBuf,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Contrast of every file in a measurement series
    Scan {
        /// Input TOF files, in series order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Analysis method
        #[arg(short, long, value_enum, default_value = "fit")]
        method: Method,

        /// Optional ROI definition to restrict the region
        #[arg(long)]
        roi: Option<PathBuf>,

        #[command(flatten)]
        geometry: GeometryArgs,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info {
            input,
            tof,
            geometry,
        } => info(&input, tof, &geometry),
        Commands::Counts {
            input,
            tof,
            roi,
            subtract_background,
            geometry,
        } => counts(&input, tof, roi.as_deref(), subtract_background, &geometry),
        Commands::Contrast {
            input,
            method,
            min_counts,
            geometry,
        } => contrast(&input, method, min_counts, &geometry),
        Commands::TotalGraph { input, geometry } => total_graph(&input, &geometry),
        Commands::Simulate {
            output,
            tof,
            seed,
            geometry,
        } => simulate(&output, tof, seed, &geometry),
        Commands::Convert {
            input,
            output,
            geometry,
        } => convert(&input, &output, &geometry),
        Commands::Scan {
            inputs,
            method,
            roi,
            geometry,
        } => scan(&inputs, method, roi.as_deref(), &geometry),
    }
}

fn info(input: &Path, tof: bool, geometry: &GeometryArgs) -> Result<()> {
    let bytes = std::fs::metadata(input)?.len() as usize;
    let words = bytes / 4;
    println!("file:  {}", input.display());
    println!("size:  {bytes} bytes ({words} counts)");

    if tof {
        let config = geometry.tof_config();
        if config.byte_len() == bytes {
            println!("matches the configured TOF geometry exactly");
        } else if let Some(guessed) = guess_tof_geometry(words, &config) {
            println!(
                "guess: {}x{} pixels, {} frames",
                guessed.width(),
                guessed.height(),
                guessed.image_count()
            );
        } else {
            println!("no TOF geometry found for this size");
        }
    } else if geometry.pad_config().byte_len() == bytes {
        println!("matches the configured PAD geometry exactly");
    } else if let Some(guessed) = guess_pad_geometry(words) {
        println!("guess: {}x{} pixels", guessed.width(), guessed.height());
    } else {
        println!("no PAD geometry found for this size");
    }
    Ok(())
}

fn load_roi_or_empty(path: &Path) -> Roi {
    // A broken ROI file disables filtering instead of aborting the run.
    match load_roi(path) {
        Ok(roi) => roi,
        Err(e) => {
            log::error!("ROI disabled: {e}");
            Roi::new()
        }
    }
}

fn counts(
    input: &Path,
    tof: bool,
    roi_path: Option<&Path>,
    subtract_background: bool,
    geometry: &GeometryArgs,
) -> Result<()> {
    let roi = roi_path.map(load_roi_or_empty).unwrap_or_default();

    if tof {
        let mut cube = load_tof(input, &geometry.tof_config())?.cube;
        cube.set_roi(roi);
        cube.use_roi(!cube.roi().is_empty());
        let total = if subtract_background {
            cube.counts_subtract_background()?
        } else {
            cube.counts()?
        };
        println!("{total}");
    } else {
        let mut image = load_pad(input, &geometry.pad_config())?.image;
        image.set_roi(roi);
        image.use_roi(!image.roi().is_empty());
        let total = if subtract_background {
            image.counts_subtract_background()
        } else {
            image.counts()
        };
        println!("{total}");
    }
    Ok(())
}

fn contrast(input: &Path, method: Method, min_counts: u64, geometry: &GeometryArgs) -> Result<()> {
    let cube = load_tof(input, &geometry.tof_config())?.cube;
    let engine = ContrastEngine {
        method: method.into(),
        settings: FitSettings {
            min_counts_to_fit: min_counts,
            ..FitSettings::default()
        },
        ..ContrastEngine::new()
    };

    println!("foil  contrast  +/-        phase     +/-");
    for foil in 0..cube.config().foil_count() {
        let graph = cube.foil_graph(foil as i64)?;
        match engine.contrast_of_graph(&graph) {
            Ok(result) => println!(
                "{foil:>4}  {:.6}  {:.6}  {:.6}  {:.6}",
                result.contrast, result.contrast_err, result.phase, result.phase_err
            ),
            Err(e) => println!("{foil:>4}  invalid ({e})"),
        }
    }
    Ok(())
}

fn total_graph(input: &Path, geometry: &GeometryArgs) -> Result<()> {
    let cube = load_tof(input, &geometry.tof_config())?.cube;
    let engine = ContrastEngine::new();
    let width = cube.width() as i64;
    let height = cube.height() as i64;
    let graph = engine.total_graph(&cube, 0, width, 0, height)?;

    for (channel, &value) in graph.values().iter().enumerate() {
        println!("{channel:>3} {value}");
    }
    if let Ok(fit) = fit_sinusoid(&graph, &engine.settings) {
        println!(
            "# amp {:.2}  offset {:.2}  phase {:.4}",
            fit.amp, fit.offset, fit.phase
        );
    }
    Ok(())
}

fn simulate(output: &Path, tof: bool, seed: u64, geometry: &GeometryArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    if tof {
        let mut cube = TofCube::zeroed(&geometry.tof_config())?;
        cube.generate_random(&mut rng);
        save_tof(output, &cube)?;
    } else {
        let mut image = PadImage::zeroed(&geometry.pad_config())?;
        image.generate_random(&mut rng);
        save_pad(output, &image)?;
    }
    println!("wrote {}", output.display());
    Ok(())
}

fn convert(input: &Path, output: &Path, geometry: &GeometryArgs) -> Result<()> {
    let image = load_pad(input, &geometry.pad_config())?.image;
    cascade_io::text::save_pad_text(output, &image)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn scan(
    inputs: &[PathBuf],
    method: Method,
    roi_path: Option<&Path>,
    geometry: &GeometryArgs,
) -> Result<()> {
    let config = geometry.tof_config();
    let roi = roi_path.map(load_roi_or_empty);
    let engine = ContrastEngine {
        method: method.into(),
        blocks: BlockOptions::default(),
        ..ContrastEngine::new()
    };

    println!("index  counts      contrast  phase     file");
    for (index, path) in inputs.iter().enumerate() {
        // Progress between files; a caller watching the log can abort
        // the series here without losing completed entries.
        log::info!("processing file {}/{}: {}", index + 1, inputs.len(), path.display());

        let mut cube = match load_tof(path, &config) {
            Ok(loaded) => loaded.cube,
            Err(e) => {
                println!("{index:>5}  skipped ({e})");
                continue;
            }
        };
        if let Some(roi) = &roi {
            cube.set_roi(roi.clone());
            cube.use_roi(!roi.is_empty());
        }

        let counts = cube.counts()?;
        let width = cube.width() as i64;
        let height = cube.height() as i64;
        let graph = engine.total_graph(&cube, 0, width, 0, height);
        match graph.and_then(|g| engine.contrast_of_graph(&g)) {
            Ok(result) => println!(
                "{index:>5}  {counts:>10}  {:.6}  {:.6}  {}",
                result.contrast,
                result.phase,
                path.display()
            ),
            Err(e) => println!("{index:>5}  {counts:>10}  invalid ({e})  {}", path.display()),
        }
    }
    Ok(())
}
