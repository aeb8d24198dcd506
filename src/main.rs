//! isoblend: extract offset-level isosurfaces from OBJ shapes.
//!
//! Set `RUST_LOG` to control log output, e.g. `RUST_LOG=isoblend=debug`,
//! or pass `-v` / `-vv` / `-vvv`.
//!
//! ```bash
//! isoblend init-settings scene.json
//! isoblend -v extract --settings scene.json --dynamic hand.obj --static cup.obj --out-dir out
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use isoblend::{ExtractionSettings, OffsetLevelCache};

/// isoblend - offset-level isosurface extraction.
#[derive(Parser)]
#[command(name = "isoblend")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Where the scene and grid come from. Flags override the settings file.
#[derive(Args)]
struct SceneArgs {
    /// Settings JSON (defaults are used when omitted)
    #[arg(long, short)]
    settings: Option<PathBuf>,

    /// Dynamic shape OBJ, repeat for each slot (replaces the settings list)
    #[arg(long = "dynamic")]
    dynamic: Vec<PathBuf>,

    /// Static shape OBJ, repeat for each slot (replaces the settings list)
    #[arg(long = "static")]
    statics: Vec<PathBuf>,

    /// Number of offset levels
    #[arg(long)]
    levels: Option<usize>,

    /// Samples per axis for a cubic grid
    #[arg(long)]
    resolution: Option<usize>,

    /// Extract one (level, object) pair at a time
    #[arg(long)]
    sequential: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every offset level and write each surface to disk
    Extract {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output directory
        #[arg(long, short)]
        out_dir: PathBuf,

        /// File name prefix
        #[arg(long, default_value = "mesh")]
        stem: String,

        /// Write packed binary buffers instead of OBJ
        #[arg(long)]
        binary: bool,
    },

    /// Build every offset level and print triangle counts
    Inspect {
        #[command(flatten)]
        scene: SceneArgs,
    },

    /// Write the default settings to a JSON file
    InitSettings {
        /// Destination file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct LevelSummary {
    level: usize,
    offset: f32,
    objects: Vec<ObjectSummary>,
}

#[derive(Serialize)]
struct ObjectSummary {
    kind: String,
    slot: usize,
    triangles: usize,
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "isoblend=info",
            2 => "isoblend=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn resolve_settings(args: &SceneArgs) -> Result<ExtractionSettings> {
    let mut settings = match &args.settings {
        Some(path) => ExtractionSettings::load(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => ExtractionSettings::default(),
    };

    if !args.dynamic.is_empty() {
        settings.dynamic_meshes = args.dynamic.clone();
    }
    if !args.statics.is_empty() {
        settings.static_meshes = args.statics.clone();
    }
    if let Some(levels) = args.levels {
        settings.offset_levels = levels;
    }
    if let Some(resolution) = args.resolution {
        settings.resolution = [resolution; 3];
    }
    if args.sequential {
        settings.parallel = false;
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn build_cache(args: &SceneArgs) -> Result<OffsetLevelCache> {
    let settings = resolve_settings(args)?;
    if settings.dynamic_meshes.is_empty() && settings.static_meshes.is_empty() {
        bail!("No meshes given: pass --dynamic/--static or list them in the settings file");
    }

    let scene = settings.build_scene();
    OffsetLevelCache::build(&scene, &settings).context("Extraction failed")
}

fn run_extract(scene: &SceneArgs, out_dir: &Path, stem: &str, binary: bool, cli: &Cli) -> Result<()> {
    let cache = build_cache(scene)?;

    let written = if binary {
        cache.export_binary(out_dir, stem)
    } else {
        cache.export_obj(out_dir, stem)
    }
    .with_context(|| format!("Failed to write meshes to {:?}", out_dir))?;

    if cli.quiet {
        return Ok(());
    }
    match cli.format {
        OutputFormat::Text => {
            for path in &written {
                println!("{}", path.display());
            }
        }
        OutputFormat::Json => {
            let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
            println!("{}", serde_json::to_string_pretty(&paths)?);
        }
    }
    Ok(())
}

fn run_inspect(scene: &SceneArgs, cli: &Cli) -> Result<()> {
    let cache = build_cache(scene)?;

    let mut levels: Vec<LevelSummary> = (0..cache.levels())
        .map(|level| LevelSummary {
            level,
            offset: cache.offset(level).unwrap_or_default(),
            objects: Vec::new(),
        })
        .collect();
    for (level, kind, slot, mesh) in cache.iter() {
        levels[level].objects.push(ObjectSummary {
            kind: kind.to_string(),
            slot,
            triangles: mesh.triangle_count(),
        });
    }

    if cli.quiet {
        return Ok(());
    }
    match cli.format {
        OutputFormat::Text => {
            for summary in &levels {
                println!("level {} (offset {})", summary.level, summary.offset);
                for object in &summary.objects {
                    println!(
                        "  {:<8} {:>2}  {:>8} triangles",
                        object.kind, object.slot, object.triangles
                    );
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&levels)?),
    }
    Ok(())
}

fn run_init_settings(path: &Path, force: bool, cli: &Cli) -> Result<()> {
    if path.exists() && !force {
        bail!("{:?} already exists (use --force to overwrite)", path);
    }
    ExtractionSettings::default()
        .save(path)
        .with_context(|| format!("Failed to write settings to {:?}", path))?;
    if !cli.quiet {
        println!("Wrote default settings to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Extract {
            scene,
            out_dir,
            stem,
            binary,
        } => run_extract(scene, out_dir, stem, *binary, &cli),
        Commands::Inspect { scene } => run_inspect(scene, &cli),
        Commands::InitSettings { path, force } => run_init_settings(path, *force, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
