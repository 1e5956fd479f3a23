//! volscene CLI - inspect and dry-run scene documents
//!
//! Every subcommand builds the scene against the in-memory recording
//! engine, so documents can be checked without a transport engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use volscene::{RecordingEngine, SceneSettings, SceneTree};

#[derive(Parser)]
#[command(name = "volscene")]
#[command(about = "Scene documents for particle-transport geometry", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the volume hierarchy of a document
    Info {
        /// Scene document (JSON)
        file: PathBuf,
    },
    /// Link, build and place every volume, and validate dynamic schedules
    Check {
        /// Scene document (JSON)
        file: PathBuf,
        /// Settings file (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
    /// Compute voxel labels and write them as JSON
    Labels {
        /// Scene document (JSON)
        file: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Apply every run boundary in order and list what moves
    Runs {
        /// Scene document (JSON)
        file: PathBuf,
        /// Settings file (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?,
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Info { file } => show_info(&file),
        Commands::Check { file, settings } => check(&file, settings.as_deref()),
        Commands::Labels { file, out } => write_labels(&file, out),
        Commands::Runs { file, settings } => dry_run(&file, settings.as_deref()),
    }
}

fn load_settings(path: Option<&Path>) -> Result<SceneSettings> {
    match path {
        Some(path) => SceneSettings::load(path)
            .with_context(|| format!("loading settings {}", path.display())),
        None => Ok(SceneSettings::default()),
    }
}

fn load_tree(file: &Path, settings: SceneSettings) -> Result<SceneTree> {
    let json =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let doc = volscene_ir::Document::from_json(&json)
        .with_context(|| format!("parsing {}", file.display()))?;
    let tree = SceneTree::from_document(&doc, settings)
        .with_context(|| format!("building scene from {}", file.display()))?;
    info!(file = %file.display(), volumes = doc.volumes.len(), "scene loaded");
    Ok(tree)
}

fn show_info(file: &Path) -> Result<()> {
    let mut tree = load_tree(file, SceneSettings::default())?;

    println!("volscene document: {}", file.display());
    println!("  Volumes: {}", tree.len());
    println!("  Runs: {}", tree.settings().run_count());
    println!("\nHierarchy:");
    print!("{}", tree.render()?);
    Ok(())
}

fn check(file: &Path, settings: Option<&Path>) -> Result<()> {
    let mut tree = load_tree(file, load_settings(settings)?)?;
    tree.validate_dynamics()?;
    let mut engine = RecordingEngine::with_rotation_tolerance(tree.settings().rotation_tolerance);
    let report = tree.construct_all(&mut engine)?;

    println!("Solids built: {}", report.solids_built);
    println!("Placements: {}", report.placements);
    println!("Voxelized volumes: {}", report.voxel_volumes);
    for failure in &report.persistence_failures {
        println!("  could not write labels for {}: {}", failure.volume, failure.error);
    }
    println!("OK");
    Ok(())
}

fn write_labels(file: &Path, out: PathBuf) -> Result<()> {
    let settings = SceneSettings {
        label_output_dir: Some(out.clone()),
        ..SceneSettings::default()
    };
    let mut tree = load_tree(file, settings)?;
    let mut engine = RecordingEngine::with_rotation_tolerance(tree.settings().rotation_tolerance);
    let report = tree.construct_all(&mut engine)?;

    if report.voxel_volumes == 0 {
        bail!("{} has no voxelized volume", file.display());
    }
    if let Some(failure) = report.persistence_failures.first() {
        bail!("writing labels for {}: {}", failure.volume, failure.error);
    }
    for (volume, voxels) in engine.voxel_fills() {
        println!("{volume}: {voxels} voxels labeled");
    }
    println!("Labels written to {}", out.display());
    Ok(())
}

fn dry_run(file: &Path, settings: Option<&Path>) -> Result<()> {
    let mut tree = load_tree(file, load_settings(settings)?)?;
    let runs = tree.settings().run_count();
    if runs == 0 {
        bail!("{} defines no run intervals", file.display());
    }
    tree.validate_dynamics()?;
    let mut engine = RecordingEngine::with_rotation_tolerance(tree.settings().rotation_tolerance);
    tree.construct_all(&mut engine)?;

    for run in 0..runs {
        let [start, end] = tree.settings().run_intervals[run];
        let changed = tree.apply_run(run, &mut engine)?;
        if changed.is_empty() {
            println!("run {run} [{start}, {end}]: -");
        } else {
            println!("run {run} [{start}, {end}]: {}", changed.join(", "));
        }
    }
    println!("Geometry updates: {}", engine.geometry_updates());
    Ok(())
}
