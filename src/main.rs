use clap::Parser;
use std::path::PathBuf;
use tilebake::config::{self, JobConfig};
use tilebake::generate::{self, CancelToken, RunStats};
use tilebake::geo::{Profile, ProfileKind};
use tilebake::metadata::{self, TileSetInfo};
use tilebake::output;
use tilebake::pyramid::{TileMatrix, ZoomRange};
use tilebake::raster::{open_raster, RasterProvider};
use tilebake::resampling::Resampling;
use tilebake::store::TileStore;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "tilebake")]
#[command(about = "Bakes a georeferenced raster into a TMS tile pyramid")]
#[command(long_about = "\
Bakes a georeferenced raster into a TMS tile pyramid

The input is a single north-up raster: a GeoTIFF, or any PNG/JPEG with an
ESRI world file beside it. The output is a directory of PNG tiles in TMS
layout plus the metadata a slippy-map client needs:

  out/
  ├── tilemapresource.xml          # TMS 1.0 resource description
  ├── metadata.json                # machine-readable run parameters
  ├── leaflet.html                 # self-contained preview viewer
  └── 12/                          # one directory per zoom level
      └── 1203/                    # tile column (x)
          └── 2867.png             # tile row (y, counted from the south)

Profiles:
  mercator   EPSG:3857 square world grid, the web-map default
  geodetic   EPSG:4326 plate carrée grid, two tiles wide at zoom 0
  raster     the input's own pixel grid, for unreferenced images

Zoom levels are derived from the raster's resolution unless -z overrides
them. Base tiles are cut from the source at the deepest level; every
shallower level is composed from the four tiles beneath it. Interrupted
runs can be picked up again with -e: tiles already on disk are kept.")]
#[command(version = version_string())]
struct Cli {
    /// Source raster (GeoTIFF, or an image with a world file)
    input: PathBuf,

    /// Output directory for the tile pyramid
    output: PathBuf,

    /// Tile grid profile
    #[arg(short, long, value_enum, default_value = "mercator")]
    profile: ProfileKind,

    /// Resampling for base tiles and overviews
    #[arg(short, long, value_enum, default_value = "average")]
    resampling: Resampling,

    /// Zoom levels to render (default: derived from the raster)
    #[arg(short, long, value_name = "N|N-M")]
    zoom: Option<String>,

    /// Resume an interrupted run: keep tiles that already exist
    #[arg(short = 'e', long)]
    resume: bool,

    /// NODATA value(s) to turn transparent, cycled across bands
    #[arg(short = 'a', long = "srcnodata", value_name = "v[,v...]")]
    srcnodata: Option<String>,

    /// Source spatial reference, for files that carry none
    #[arg(short = 's', long = "s-srs", value_name = "EPSG:code")]
    s_srs: Option<String>,

    /// Public base URL the tiles will be served from
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Map title used in the metadata outputs (default: input stem)
    #[arg(short, long)]
    title: Option<String>,

    /// Tile edge length in pixels
    #[arg(long, default_value_t = 256, value_name = "px")]
    tile_size: u32,

    /// Worker thread cap (default: all cores)
    #[arg(long, value_name = "N")]
    processes: Option<usize>,

    /// Write tiles only, no metadata or viewer files
    #[arg(long)]
    no_viewer: bool,

    /// Suppress progress output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print every tile as it is written
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let job = resolve_job(cli)?;

    if !job.quiet {
        println!("==> Stage 1: Opening {}", job.input.display());
    }
    let raster = open_raster(&job.input, job.profile, job.source_epsg, &job.nodata)?;
    let profile = Profile::new(job.profile, job.tile_size, raster.size());
    let geo_transform = raster.geo_transform();
    let bounds = geo_transform.bounds(raster.size().0, raster.size().1);
    let range = ZoomRange::resolve(&profile, geo_transform.pixel_width, raster.size(), job.zoom)?;
    let matrix = TileMatrix::build(&profile, &bounds, range)?;
    let store = TileStore::new(&job.output);
    if !job.quiet {
        println!(
            "    {}x{} px, {} data bands, zoom {}-{}",
            raster.size().0,
            raster.size().1,
            raster.data_bands(),
            matrix.min_zoom(),
            matrix.max_zoom()
        );
    }

    // Metadata goes first so the viewer and TMS resource exist even if the
    // run is interrupted partway through the tiles.
    if job.write_metadata {
        if !job.quiet {
            println!("==> Stage 2: Writing metadata");
        }
        let wgs84 = metadata::geographic_bounds(&raster, &profile, &bounds);
        let info = TileSetInfo {
            title: &job.title,
            profile: &profile,
            matrix: &matrix,
            bounds,
            pixel_width: geo_transform.pixel_width,
            source_epsg: job.source_epsg.or(raster.source_epsg()),
            publish_url: job.publish_url.as_deref(),
            resampling: job.resampling,
        };
        let written = metadata::write_metadata(&info, wgs84.as_ref(), &job.output, job.resume)?;
        if !job.quiet {
            for name in written {
                println!("    {}", name);
            }
        }
    }

    generate::init_thread_pool(job.threads);
    let cancel = CancelToken::new();

    let mut events = None;
    let mut printer = None;
    if !job.quiet {
        let (tx, rx) = std::sync::mpsc::channel();
        let verbose = job.verbose;
        printer = Some(std::thread::spawn(move || {
            for event in rx {
                output::print_progress_event(&event, verbose);
            }
        }));
        events = Some(tx);
    }

    if !job.quiet {
        println!("==> Stage 3: Base tiles (zoom {})", matrix.max_zoom());
    }
    let base = generate::generate_base_tiles(
        &raster,
        &profile,
        &matrix,
        &store,
        job.resampling,
        job.resume,
        &cancel,
        events.as_ref(),
    )?;

    let mut overview = RunStats::default();
    if matrix.min_zoom() < matrix.max_zoom() {
        if !job.quiet {
            println!(
                "==> Stage 4: Overview tiles (zoom {}-{})",
                matrix.min_zoom(),
                matrix.max_zoom() - 1
            );
        }
        overview = generate::generate_overview_tiles(
            &raster,
            &profile,
            &matrix,
            &store,
            job.resampling,
            job.resume,
            &cancel,
            events.as_ref(),
        )?;
    }

    drop(events);
    if let Some(printer) = printer {
        printer.join().unwrap();
    }

    if !job.quiet {
        output::print_run_summary(base, overview, cancel.is_cancelled());
        println!("==> Pyramid complete: {}", job.output.display());
    }

    Ok(())
}

/// Validate the raw CLI options and resolve defaults that depend on other
/// options.
fn resolve_job(cli: Cli) -> Result<JobConfig, config::ConfigError> {
    config::validate_input(&cli.input)?;
    config::validate_tile_size(cli.tile_size)?;
    let zoom = cli.zoom.as_deref().map(config::parse_zoom_range).transpose()?;
    let nodata = cli
        .srcnodata
        .as_deref()
        .map(config::parse_nodata_list)
        .transpose()?
        .unwrap_or_default();
    let source_epsg = cli.s_srs.as_deref().map(config::parse_epsg).transpose()?;
    let publish_url = cli
        .url
        .as_deref()
        .map(|url| config::normalize_publish_url(url, &cli.output));
    let title = cli
        .title
        .clone()
        .unwrap_or_else(|| config::default_title(&cli.input));
    Ok(JobConfig {
        threads: config::effective_threads(cli.processes),
        input: cli.input,
        output: cli.output,
        profile: cli.profile,
        resampling: cli.resampling,
        tile_size: cli.tile_size,
        zoom,
        resume: cli.resume,
        nodata,
        source_epsg,
        publish_url,
        title,
        write_metadata: !cli.no_viewer,
        verbose: cli.verbose,
        quiet: cli.quiet,
    })
}
