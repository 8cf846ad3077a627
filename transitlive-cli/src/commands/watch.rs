//! Watch command - poll a feed and animate vehicles until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use transitlive::config::ConfigFile;
use transitlive::coord::GeoPoint;
use transitlive::feed::{DemoFeed, HttpFeed, ReqwestClient, SnapshotSource, TripTable};
use transitlive::labels::LabelChange;
use transitlive::map::{EntityRender, MarkerShape, RenderSink, TransitMap};
use transitlive::poller::{FrameLoop, Poller};
use transitlive::EntityId;

use super::common::open_store;
use crate::error::CliError;

/// Arguments for the watch command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Feed URL (overrides feed.url)
    #[arg(long)]
    pub url: Option<String>,

    /// Use the built-in simulated Stockholm feed
    #[arg(long, conflicts_with = "url")]
    pub demo: bool,

    /// JSON trip table for resolving tripId (overrides feed.trips)
    #[arg(long)]
    pub trips: Option<PathBuf>,

    /// Poll interval in milliseconds (overrides map.poll_interval_ms)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

/// Prints marker changes to stdout. Frame moves and labels are not shown.
#[derive(Debug, Default)]
struct ConsoleSink;

impl ConsoleSink {
    fn format_update(render: &EntityRender) -> String {
        let heading = match render.style.shape {
            MarkerShape::Dot => "   ?".to_string(),
            MarkerShape::Arrow { bearing } => format!("{:>3.0}°", bearing),
        };
        let pop = if render.style.pop { " (heading acquired)" } else { "" };
        format!(
            "  {:<8} {} {} {:>9.5},{:>9.5}{}",
            render.id.as_str(),
            render.style.color,
            heading,
            render.position.lat,
            render.position.lon,
            pop
        )
    }
}

impl RenderSink for ConsoleSink {
    fn entity_updated(&mut self, render: &EntityRender) {
        println!("{}", Self::format_update(render));
    }

    fn entity_moved(&mut self, _id: &EntityId, _position: GeoPoint) {}

    fn entity_removed(&mut self, id: &EntityId) {
        println!("- {}", id);
    }

    fn label_changed(&mut self, _change: &LabelChange) {}
}

/// Run the watch command.
pub fn run(args: WatchArgs, config: ConfigFile) -> Result<(), CliError> {
    let mut map_config = config.map.clone();
    if let Some(ms) = args.interval_ms {
        if ms == 0 {
            return Err(CliError::Config("--interval-ms must be positive".to_string()));
        }
        map_config = map_config.with_poll_interval(Duration::from_millis(ms));
    }

    let source = build_source(&args, &config, map_config.poll_interval)?;
    let store = open_store(&config)?;
    let map = TransitMap::new(&map_config, Box::new(store), Box::new(ConsoleSink))?;
    let map = Arc::new(Mutex::new(map));

    println!("transitlive v{}", transitlive::VERSION);
    println!("Feed:     {}", source.describe());
    println!("Interval: {} ms", map_config.poll_interval.as_millis());
    println!("Press Ctrl-C to stop.");
    println!();
    info!(
        source = %source.describe(),
        interval_ms = map_config.poll_interval.as_millis() as u64,
        "Watch started"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || signal.cancel())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async {
        let (_visible_tx, visible_rx) = watch::channel(true);

        if let Some(secs) = args.duration_secs {
            let timer = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                timer.cancel();
            });
        }

        let poller = Poller::new(source, Arc::clone(&map));
        let poll = tokio::spawn(poller.run(visible_rx, shutdown.clone()));
        let frames = tokio::spawn(FrameLoop::new(Arc::clone(&map)).run(shutdown.clone()));
        let _ = tokio::join!(poll, frames);
    });

    let mut map = map.lock();
    let tracked = map.len();
    map.clear();
    info!(tracked, "Watch stopped");
    println!();
    println!("Stopped ({} vehicles on map).", tracked);
    Ok(())
}

fn build_source(
    args: &WatchArgs,
    config: &ConfigFile,
    poll_interval: Duration,
) -> Result<Arc<dyn SnapshotSource>, CliError> {
    if args.demo {
        return Ok(Arc::new(DemoFeed::new(poll_interval)));
    }

    let url = args.url.clone().or_else(|| config.feed.url.clone()).ok_or_else(|| {
        CliError::Config(
            "No feed URL. Set feed.url in config.ini, pass --url, or use --demo.".to_string(),
        )
    })?;

    let trips = match args.trips.as_ref().or(config.feed.trips_file.as_ref()) {
        Some(path) => TripTable::load(path)?,
        None => TripTable::new(),
    };

    let client = ReqwestClient::with_timeout(config.feed.timeout)?;
    Ok(Arc::new(HttpFeed::new(Arc::new(client), url, Arc::new(trips))))
}
