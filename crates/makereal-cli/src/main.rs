use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::RwLock;

use makereal_canvas::export::{self, Grid, SvgExportOptions};
use makereal_canvas::{Board, CaptureRequest, Shape, SnapshotRegistry, SurfaceHost};
use makereal_core::config::{Config, LoggingConfig};
use makereal_core::types::ShapeId;
use makereal_gateway::GatewayState;
use makereal_gateway::state::provider_from_config;
use makereal_providers::Credentials;

#[derive(Parser)]
#[command(
    name = "makereal",
    about = "Turn whiteboard wireframes into working code with a vision model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 3210)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Generate code from a board file without a running gateway
    Generate {
        /// Board JSON file: `{"shapes": [...], "selection": [...]}`.
        /// An empty selection selects every shape.
        board: PathBuf,

        /// Write the code here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// API key (default: from config or the provider's env var)
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Render a board file to the PNG the model would see
    Render {
        board: PathBuf,

        /// Output PNG path
        #[arg(short, long, default_value = "board.png")]
        output: PathBuf,

        /// Leave out the coordinate grid
        #[arg(long)]
        no_grid: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show gateway status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

/// On-disk board layout read by `generate` and `render`.
#[derive(Debug, Deserialize)]
struct BoardFile {
    shapes: Vec<Shape>,
    #[serde(default)]
    selection: Vec<ShapeId>,
}

fn load_board(path: &Path) -> anyhow::Result<Board> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read board file {}", path.display()))?;
    let file: BoardFile = serde_json::from_str(&text)
        .with_context(|| format!("Invalid board file {}", path.display()))?;

    let mut board = Board::new();
    for shape in file.shapes {
        board.create_shape(shape);
    }
    if file.selection.is_empty() {
        board.select_all();
    } else {
        board.select(&file.selection)?;
    }
    Ok(board)
}

/// Offline runs have no embedded surfaces to capture.
struct NoSurfaces;

impl SurfaceHost for NoSurfaces {
    fn send_capture_request(&self, _request: CaptureRequest) -> bool {
        false
    }
}

/// Filter directives from the logging config, e.g. `info,makereal_canvas=debug`.
fn log_directives(logging: Option<&LoggingConfig>, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.and_then(|l| l.level.as_deref()).unwrap_or("info")
    };
    let mut directives = level.to_string();
    for filter in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
        directives.push(',');
        directives.push_str(filter);
    }
    directives
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_directives(logging, verbose)));
    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_dir);

    let config = Config::load(&config_path)?;

    init_logging(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }
            tracing::info!("Starting makereal gateway on port {port}");
            let state = Arc::new(GatewayState::from_config(Arc::new(config)));
            makereal_gateway::start_gateway(state, port).await?;
        }
        Commands::Generate {
            board,
            output,
            api_key,
        } => {
            let board = RwLock::new(load_board(&board)?);
            let provider = provider_from_config(&config);
            let key = api_key
                .or_else(|| config.make_real_provider().and_then(|p| p.resolve_api_key()))
                .context("No API key: pass --api-key, set OPENAI_API_KEY or configure models.providers")?;
            let snapshots = SnapshotRegistry::new(config.handshake_timeout());

            let outcome = makereal_agent::make_real(
                &board,
                &snapshots,
                &NoSurfaces,
                provider.as_ref(),
                &Credentials::api_key(key),
                &config,
            )
            .await?;

            tracing::info!(
                shape_id = %outcome.shape_id,
                duration_ms = outcome.duration_ms,
                "Code generated"
            );
            match output {
                Some(path) => {
                    std::fs::write(&path, &outcome.code)?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{}", outcome.code),
            }
        }
        Commands::Render {
            board,
            output,
            no_grid,
        } => {
            let board = load_board(&board)?;
            let shapes: Vec<Shape> = board.selected_shapes().into_iter().cloned().collect();
            let snapshots = SnapshotRegistry::new(config.handshake_timeout());
            let mut svg =
                export::selection_to_svg(&shapes, &snapshots, &NoSurfaces, SvgExportOptions::default())
                    .await
                    .context("Board has no shapes to render")?;
            if !no_grid {
                export::add_grid_to_svg(&mut svg, &Grid::default());
            }
            let png = export::svg_to_png(&svg.to_document())?;
            std::fs::write(&output, png)?;
            println!("Wrote {} ({}x{})", output.display(), svg.width, svg.height);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at {key}"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
        Commands::Status => {
            println!("makereal v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway port: {}", config.gateway_port());
            println!("Model: {}", config.make_real_model());

            let url = format!(
                "http://{}:{}/health",
                config.gateway_bind(),
                config.gateway_port()
            );
            match reqwest::get(&url).await {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;
                    println!("Status: running");
                    println!("Uptime: {}s", health["uptime_secs"]);
                    println!("Shapes: {}", health["shapes"]);
                    println!("Surfaces: {}", health["surfaces"]);
                }
                _ => println!("Status: not running"),
            }
        }
    }

    Ok(())
}
