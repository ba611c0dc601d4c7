//! GeoLayer CLI - Command-line runner
//!
//! Fetches a GeoJSON feed, renders it through the layer pipeline, and
//! either reports once or keeps polling. The "map surface" here is a
//! logging stand-in: each attach/detach is reported through tracing, so
//! the binary doubles as a feed-styling dry run.

use clap::{Parser, ValueEnum};
use geolayer::config::{classified_magnitude_style, defaults, LayerConfig, RefreshSettings};
use geolayer::feature::LonLat;
use geolayer::feed::ReqwestFeedClient;
use geolayer::layer::{GeometryRenderMap, LayerGroup, PrimitiveKind, PropertyTemplate};
use geolayer::refresh::{RefreshController, RefreshOutcome};
use geolayer::style::{ColorRule, RadiusRule};
use geolayer::surface::{MapSurface, Viewport};
use geolayer::{GeometryKind, MapSession};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, ValueEnum)]
enum StylingMode {
    /// Radius scaled continuously from the radius property
    Continuous,
    /// Radius chosen from the tiny/small/medium/large threshold table
    Classified,
}

#[derive(Debug, Clone, ValueEnum)]
enum PointStyle {
    /// Styled circles sized by the resolved radius
    Circle,
    /// Icon markers
    Marker,
}

#[derive(Parser)]
#[command(name = "geolayer")]
#[command(about = "Render a live GeoJSON feed as styled, popup-bound map layers", long_about = None)]
struct Args {
    /// Feed URL (GeoJSON feature collection, fetched with HTTP GET)
    #[arg(long)]
    url: String,

    /// Polling interval in seconds; omit to refresh once and exit
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Styling strategy for point radii
    #[arg(long, value_enum, default_value = "continuous")]
    styling: StylingMode,

    /// Numeric property driving radius scaling / classification
    #[arg(long, default_value = defaults::RADIUS_PROPERTY)]
    radius_property: String,

    /// Primitive used for point geometries
    #[arg(long, value_enum, default_value = "circle")]
    point_style: PointStyle,

    /// Constant stroke/fill color, or a property key prefixed with '@'
    /// (e.g. "@fill") resolved per feature
    #[arg(long, default_value = defaults::STROKE_COLOR)]
    color: String,

    /// Popup template; `{key}` substitutes the feature property
    #[arg(long, default_value = defaults::POPUP_TEMPLATE)]
    popup_template: String,

    /// HTTP timeout in seconds for feed requests
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Directory for the log file (stdout only if omitted)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Stand-in map surface that reports attach/detach through tracing.
struct LogSurface;

impl MapSurface for LogSurface {
    fn attach(&self, group: &LayerGroup) {
        info!(
            generation = group.generation,
            layers = group.len(),
            "layer group attached"
        );
    }

    fn detach(&self, group: &LayerGroup) {
        info!(generation = group.generation, "layer group detached");
    }

    fn project_to_screen(&self, position: LonLat) -> (f64, f64) {
        (position.lon, -position.lat)
    }

    fn current_viewport(&self) -> Viewport {
        Viewport {
            center: LonLat { lon: 0.0, lat: 0.0 },
            zoom: 2.0,
        }
    }
}

fn layer_config(args: &Args) -> LayerConfig {
    let mut config = LayerConfig::with_defaults();

    config.style.radius = match args.styling {
        StylingMode::Continuous => RadiusRule::Continuous {
            property: args.radius_property.clone(),
            bounds: defaults::RADIUS_BOUNDS,
            default: defaults::DEFAULT_RADIUS,
        },
        StylingMode::Classified => match classified_magnitude_style() {
            RadiusRule::Classified {
                thresholds,
                fallback,
                ..
            } => RadiusRule::Classified {
                property: args.radius_property.clone(),
                thresholds,
                fallback,
            },
            rule => rule,
        },
    };

    let color_rule = match args.color.strip_prefix('@') {
        Some(key) => ColorRule::Property {
            key: key.to_string(),
            fallback: defaults::STROKE_COLOR.to_string(),
        },
        None => ColorRule::Constant(args.color.clone()),
    };
    config.style.stroke = color_rule.clone();
    config.style.fill = color_rule;

    if matches!(args.point_style, PointStyle::Marker) {
        config.render_map = GeometryRenderMap::default()
            .with(GeometryKind::Point, PrimitiveKind::Marker)
            .with(GeometryKind::MultiPoint, PrimitiveKind::Marker);
    }

    config.popup = Arc::new(PropertyTemplate::parse(&args.popup_template));
    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = layer_config(&args);
    if let Err(e) = config.validate() {
        eprintln!("Error: invalid configuration: {}", e);
        process::exit(1);
    }

    let mut settings = RefreshSettings::new(&args.url);
    settings.refresh_interval = args.interval_secs.map(Duration::from_secs);
    settings.request_timeout = Duration::from_secs(args.timeout_secs);
    if let Err(e) = settings.validate() {
        eprintln!("Error: invalid configuration: {}", e);
        process::exit(1);
    }

    let _logging_guard = match geolayer::logging::init_logging(args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    info!(
        version = geolayer::VERSION,
        url = %settings.feed_url,
        "starting geolayer"
    );

    let client = match ReqwestFeedClient::new(&settings.feed_url, settings.request_timeout) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: failed to create feed client: {}", e);
            process::exit(1);
        }
    };

    let session = Arc::new(MapSession::new(Arc::new(LogSurface)));
    let controller = Arc::new(RefreshController::new(client, config, session));

    match settings.refresh_interval {
        None => match controller.refresh().await {
            Ok(RefreshOutcome::Attached {
                generation,
                rendered,
                skipped,
            }) => {
                println!(
                    "Rendered {} layer(s) ({} skipped), generation {}",
                    rendered, skipped, generation
                );
            }
            Ok(RefreshOutcome::Coalesced) => unreachable!("no concurrent refresh in once mode"),
            Err(e) => {
                eprintln!("Error: refresh failed: {}", e);
                process::exit(1);
            }
        },
        Some(interval) => {
            let shutdown = CancellationToken::new();
            let loop_handle = tokio::spawn(controller.clone().run(interval, shutdown.clone()));

            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Error: failed to listen for ctrl-c: {}", e);
                process::exit(1);
            }
            info!("ctrl-c received, shutting down");
            shutdown.cancel();
            let _ = loop_handle.await;

            let stats = controller.stats().await;
            println!(
                "Refreshes: {} completed, {} failed, {} coalesced",
                stats.completed, stats.failed, stats.coalesced
            );
        }
    }
}
