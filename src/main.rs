use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::Rgba;
use polmap::overlay::composite::{composite_layer, composite_over_blank};
use polmap::overlay::config::{OverlaySettings, Role};
use polmap::overlay::history::RenderCursor;
use polmap::overlay::model::SceneId;
use polmap::overlay::render::RasterSurface;
use polmap::overlay::store::{load_history, JsonSettingsStore, SettingsStore};
use serde_json::Map;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "polmap", version, about = "Inspect and render scene territory layers")]
struct Cli {
    /// Enable debug logging (honours RUST_LOG).
    #[arg(long, global = true)]
    debug: bool,
    /// Write logs to this file instead of stdout.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scene's history and write the layer as a PNG.
    Render {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        scene: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Image the layer is composited over. Must match the scene size.
        #[arg(long)]
        background: Option<PathBuf>,
        /// Layer opacity; defaults to the scene setting for `role`.
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long, value_enum, default_value_t = RoleArg::Gm)]
        role: RoleArg,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print a summary of a scene's history log.
    Inspect {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        scene: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Gm,
    Player,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Gm => Role::Gm,
            RoleArg::Player => Role::Player,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    polmap::logging::init(cli.debug, cli.log_file);

    match cli.command {
        Command::Render {
            store,
            scene,
            width,
            height,
            background,
            alpha,
            role,
            output,
        } => {
            if width == 0 || height == 0 {
                bail!("scene dimensions must be non-zero");
            }
            let store = JsonSettingsStore::open(&store)?;
            let scene = SceneId::new(scene);
            let settings = OverlaySettings::from_layers(&store.scene_flags(&scene), &Map::new());
            let alpha = alpha.unwrap_or_else(|| settings.alpha_for(role.into()));

            let mut surface = RasterSurface::for_scene(width, height);
            let log = load_history(&store, &scene)?;
            let outcome = RenderCursor::default().sync(log.as_ref(), &mut surface);
            tracing::info!(%scene, ?outcome, resolution = surface.resolution(), "layer rendered");

            let layer = surface.into_image();
            let image = match background {
                Some(path) => {
                    let background = image::open(&path)
                        .with_context(|| format!("open background {}", path.display()))?
                        .to_rgba8();
                    if background.dimensions() != (width, height) {
                        bail!(
                            "background is {}x{}, scene is {width}x{height}",
                            background.width(),
                            background.height()
                        );
                    }
                    composite_layer(&background, &layer, alpha)
                }
                None => composite_over_blank(&layer, width, height, Rgba([0, 0, 0, 0]), alpha),
            };
            image
                .save(&output)
                .with_context(|| format!("write {}", output.display()))?;
            println!("{}", output.display());
        }
        Command::Inspect { store, scene } => {
            let store = JsonSettingsStore::open(&store)?;
            let scene = SceneId::new(scene);
            match load_history(&store, &scene)? {
                Some(log) => {
                    let brushes: usize = log.applied().iter().map(|entry| entry.len()).sum();
                    println!(
                        "{scene}: {} entries, pointer {}, generation {}, {brushes} applied brushes",
                        log.len(),
                        log.pointer(),
                        log.generation()
                    );
                }
                None => println!("{scene}: no history"),
            }
        }
    }
    Ok(())
}
