use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use dicom_fusion::{
    DisplaySettings, EngineConfig, FusionEngine, Interpolation, Orientation, TransformPersistence,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render a manually fused slice of two DICOM series")]
struct Cli {
    /// Directory holding the fixed (reference) series.
    #[arg(long, value_name = "DIR")]
    fixed: PathBuf,
    /// Directory holding the moving series.
    #[arg(long, value_name = "DIR")]
    moving: Option<PathBuf>,
    /// JSON display settings (window/level, colors, opacity, interpolation).
    #[arg(long, value_name = "FILE")]
    display: Option<PathBuf>,
    /// Translation in mm as "x,y,z".
    #[arg(long, value_parser = parse_triplet, allow_hyphen_values = true)]
    translate: Option<[f64; 3]>,
    /// Rotation in degrees as "x,y,z".
    #[arg(long, value_parser = parse_triplet, allow_hyphen_values = true)]
    rotate: Option<[f64; 3]>,
    /// Opacity of the moving layer in [0, 1].
    #[arg(long)]
    opacity: Option<f64>,
    /// Resume slider values from a saved registration.
    #[arg(long, value_name = "FILE")]
    resume: Option<PathBuf>,
    /// Write the resulting registration.
    #[arg(long, value_name = "FILE")]
    save_registration: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = View::Axial)]
    view: View,
    /// Slice index; defaults to the center slice.
    #[arg(long)]
    index: Option<usize>,
    /// Use nearest-neighbour instead of linear resampling.
    #[arg(long)]
    nearest: bool,
    #[arg(short, long, default_value = "fused.png")]
    output: PathBuf,
    /// Directory for temporary staging.
    #[arg(long, value_name = "DIR")]
    staging_root: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum View {
    Axial,
    Coronal,
    Sagittal,
}

impl From<View> for Orientation {
    fn from(value: View) -> Self {
        match value {
            View::Axial => Orientation::Axial,
            View::Coronal => Orientation::Coronal,
            View::Sagittal => Orientation::Sagittal,
        }
    }
}

fn parse_triplet(s: &str) -> Result<[f64; 3], String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("{part:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[f64; 3]>::try_from(values).map_err(|v| format!("expected 3 values, got {}", v.len()))
}

fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let mut config = EngineConfig::default();
    if let Some(root) = &cli.staging_root {
        config = config.with_staging_root(root);
    }
    let engine = FusionEngine::new(config);

    let mut settings: DisplaySettings = match &cli.display {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => DisplaySettings::default(),
    };
    if cli.nearest {
        settings.interpolation = Interpolation::Nearest;
    }

    let fixed = list_files(&cli.fixed)?;
    let moving = cli.moving.as_deref().map(list_files).transpose()?;
    let mut session = engine
        .open_session(fixed.as_slice(), moving.as_deref())?
        .with_settings(settings);

    if let Some(path) = &cli.resume {
        let restored = TransformPersistence::load_from_file(path)?;
        session.set_parameters(restored.parameters);
    }
    if let Some(translation) = cli.translate {
        session.set_translation(translation);
    }
    if let Some(rotation) = cli.rotate {
        session.set_rotation(rotation);
    }
    if let Some(opacity) = cli.opacity {
        session.set_opacity(opacity);
    }

    let orientation = Orientation::from(cli.view);
    let index = cli
        .index
        .unwrap_or_else(|| session.fixed().slice_count(orientation) / 2);
    let image = session.render_slice(orientation, index)?;
    image.save(&cli.output)?;
    info!(output = %cli.output.display(), ?orientation, index, "wrote fused slice");

    if let Some(path) = &cli.save_registration {
        match session.to_sro()? {
            Some(sro) => TransformPersistence::save_to_file(sro, path)?,
            None => info!("no moving series loaded, registration not written"),
        }
    }

    session.close();
    Ok(())
}
