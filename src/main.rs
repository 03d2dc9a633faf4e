use clap::{Parser, Subcommand};
use iiif_image::request::ImageRequest;
use iiif_image::service::ImageService;
use iiif_image::tiles::{self, SeedOptions};
use iiif_image::{config, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "iiif-image")]
#[command(about = "IIIF Image API 2.1 transformation engine")]
#[command(long_about = "\
IIIF Image API 2.1 transformation engine

Requests follow the IIIF image request grammar:

  {identifier}/{region}/{size}/{rotation}/{quality}.{format}

  region    full | square | x,y,w,h | pct:x,y,w,h
  size      full | max | w, | ,h | pct:n | w,h | !w,h
  rotation  n | !n            (! mirrors before rotating)
  quality   default | color | gray | bitonal
  format    jpg | png | tif | gif | webp

Identifiers are paths relative to [source] root. Escape slashes inside an
identifier as %2F. Which values are accepted depends on the configured
compliance level.

Logging goes to stderr and is controlled with RUST_LOG, e.g.
RUST_LOG=iiif_image=debug.

Run 'iiif-image gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a request and print its canonical URI
    Uri {
        /// Request path, e.g. photo.jpg/full/max/0/default.jpg
        request: String,
    },
    /// Show the steps a request would execute
    Plan { request: String },
    /// Render a request to a file
    Render {
        request: String,
        /// Output file
        #[arg(long = "output", short = 'o')]
        destination: PathBuf,
    },
    /// Report the pixel size of a source image
    Info { id: String },
    /// Pre-render the tile pyramid of an image
    Seed {
        id: String,
        /// Tile edge in output pixels
        #[arg(long, default_value_t = 512)]
        tile_size: u32,
        /// Scale factors to render, comma separated
        #[arg(long, value_delimiter = ',', default_value = "1,2,4,8")]
        scale_factors: Vec<u32>,
        /// Tile format
        #[arg(long, default_value = "jpg")]
        format: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Uri { request } => {
            let config = config::load_config(&cli.config)?;
            let level = config.level.resolve()?;
            let request = ImageRequest::parse(&request)?;
            let transformation = request.transformation(&level)?;
            println!("{}", transformation.to_uri(&request.identifier)?);
        }
        Command::Plan { request } => {
            let service = load_service(&cli.config)?;
            let request = ImageRequest::parse(&request)?;
            let transformation = request.transformation(service.level())?;
            let plan = service.plan(&request.identifier, &transformation)?;
            output::print_plan(&transformation.to_uri(&request.identifier)?, &plan);
        }
        Command::Render {
            request,
            destination,
        } => {
            let service = load_service(&cli.config)?;
            let request = ImageRequest::parse(&request)?;
            let transformation = request.transformation(service.level())?;
            let rendered = service.render(&request.identifier, &transformation)?;
            std::fs::write(&destination, &rendered.body)?;
            output::print_render(
                &transformation.to_uri(&request.identifier)?,
                &rendered,
                &destination,
            );
            service.shutdown();
        }
        Command::Info { id } => {
            let config = config::load_config(&cli.config)?;
            let service = ImageService::from_config(&config)?;
            let dims = service.dimensions(&id)?;
            let limits = config.graphics.output_limits();
            println!("{id}");
            println!("    Size: {dims}");
            println!("    Profile: {}", service.level().profile_uri());
            println!(
                "    Max output: {}x{}, {} pixels",
                limits.max_width, limits.max_height, limits.max_area
            );
            service.shutdown();
        }
        Command::Seed {
            id,
            tile_size,
            scale_factors,
            format,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let service = ImageService::from_config(&config)?;
            let options = SeedOptions {
                tile_size,
                scale_factors,
                format,
            };
            let report = tiles::seed(&service, &id, &options)?;
            service.shutdown();
            output::print_seed_report(&report);
            if !report.is_complete() {
                return Err(format!("{} of {} tiles failed", report.failures.len(), report.tiles).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays clean for command output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "iiif_image=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_service(config_dir: &Path) -> Result<ImageService, Box<dyn std::error::Error>> {
    let config = config::load_config(config_dir)?;
    Ok(ImageService::from_config(&config)?)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available cores: the config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
