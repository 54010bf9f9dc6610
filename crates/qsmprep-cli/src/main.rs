use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use qsmprep_core::{InterpolationPolicy, TransformKind};

mod commands;

#[derive(Parser)]
#[command(name = "qsmprep")]
#[command(about = "Reorientation, bias correction, registration and transform propagation for QSM studies")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a moving volume to a fixed volume and save the transform
    Register {
        #[arg(long)]
        fixed: PathBuf,

        #[arg(long)]
        moving: PathBuf,

        /// Where the moving-to-fixed transform is written
        #[arg(long)]
        output_transform: PathBuf,

        /// Also write the moving volume resampled onto the fixed grid
        #[arg(long)]
        resampled: Option<PathBuf>,

        /// rigid or affine
        #[arg(long, default_value = "affine")]
        kind: TransformKind,

        /// Registration settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Resample a volume onto a reference grid through a saved transform
    Apply {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        reference: PathBuf,

        #[arg(long)]
        transform: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Requested interpolation; label data always uses nearest
        #[arg(long)]
        interpolation: Option<InterpolationPolicy>,

        /// Treat the input as a label map regardless of its header
        #[arg(long)]
        categorical: bool,

        #[arg(long, default_value_t = 0.0)]
        fill: f64,
    },

    /// Run one case: register the primary and propagate to its dependents
    Run {
        /// Folder holding the case images
        #[arg(long)]
        case_dir: PathBuf,

        /// Pipeline settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Case layout (JSON) naming the file of each key
        #[arg(long)]
        layout: Option<PathBuf>,

        /// Extra inputs as key=path
        #[arg(long = "input", value_name = "KEY=PATH")]
        inputs: Vec<String>,

        /// Apply the transform already saved for this case instead of registering
        #[arg(long)]
        reuse_transform: bool,
    },

    /// Discover and run every case under one or more study roots
    Batch {
        #[arg(long = "root", required = true)]
        roots: Vec<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        layout: Option<PathBuf>,

        /// JSON-lines file receiving one report per case
        #[arg(long, default_value = "qsmprep_manifest.jsonl")]
        manifest: PathBuf,

        #[arg(long)]
        reuse_transform: bool,

        /// Worker threads (defaults to the number of cores)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Remove a smooth intensity bias field
    BiasCorrect {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Foreground mask; Otsu thresholding when absent
        #[arg(long)]
        mask: Option<PathBuf>,

        /// Also write the estimated log bias field
        #[arg(long)]
        field: Option<PathBuf>,

        /// Smoothing sigma in mm
        #[arg(long, default_value_t = 15.0)]
        sigma: f64,

        #[arg(long, default_value_t = 4)]
        shrink: usize,
    },

    /// Reorder voxels to the closest RAS+ orientation
    Reorient {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },

    /// Compare shapes, spacings and affines of volumes that should share a space
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, default_value_t = 1e-5)]
        atol: f64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Register {
            fixed,
            moving,
            output_transform,
            resampled,
            kind,
            config,
        } => commands::register(&fixed, &moving, &output_transform, resampled.as_deref(), kind, config.as_deref()),
        Commands::Apply {
            input,
            reference,
            transform,
            output,
            interpolation,
            categorical,
            fill,
        } => commands::apply(&input, &reference, &transform, &output, interpolation, categorical, fill),
        Commands::Run {
            case_dir,
            config,
            layout,
            inputs,
            reuse_transform,
        } => commands::run(&case_dir, config.as_deref(), layout.as_deref(), &inputs, reuse_transform),
        Commands::Batch {
            roots,
            config,
            layout,
            manifest,
            reuse_transform,
            threads,
        } => commands::batch(roots, config.as_deref(), layout.as_deref(), &manifest, reuse_transform, threads),
        Commands::BiasCorrect {
            input,
            output,
            mask,
            field,
            sigma,
            shrink,
        } => commands::bias_correct(&input, &output, mask.as_deref(), field.as_deref(), sigma, shrink),
        Commands::Reorient { input, output } => commands::reorient(&input, &output),
        Commands::Inspect { files, atol, json } => commands::inspect(&files, atol, json),
    }
}
