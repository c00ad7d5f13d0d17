use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use defer_ngin::{
    config::RendererConfig,
    flow::{self, ViewerOptions},
};

/// Copy of `assets/` taken at build time. Used when the configured asset root
/// does not exist.
const BUNDLED_ASSETS: &str = env!("DEFER_NGIN_BUNDLED_ASSETS");

/// Deferred-shading scene viewer
#[derive(Parser, Debug)]
#[command(name = "defer-viewer")]
#[command(about = "Renders a scene manifest with a two-pass deferred pipeline")]
struct Cli {
    /// Scene manifest, relative to the asset root
    #[arg(short, long, default_value = "scene.json")]
    scene: String,

    /// Directory models, textures and the manifest are loaded from
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Renderer settings as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render one frame without a window and exit
    #[arg(long)]
    headless: bool,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Where captured frames are written
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<RendererConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => RendererConfig::default(),
    };
    if let Some(assets) = cli.assets {
        config.asset_root = assets;
    } else if !config.asset_root.is_dir() {
        config.asset_root = PathBuf::from(BUNDLED_ASSETS);
    }
    if let Some(output) = cli.output {
        config.capture_path = output;
    }

    let options = ViewerOptions {
        config,
        scene: cli.scene,
        size: (cli.width, cli.height),
        ..Default::default()
    };

    if cli.headless {
        let output = options.config.capture_path.clone();
        flow::render_headless(options, cli.width, cli.height, &output)
    } else {
        flow::run(options)
    }
}
