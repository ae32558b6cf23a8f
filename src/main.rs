//! rrd2prom - republish RRD values as metric events

use anyhow::{bail, Context, Result};
use clap::Parser;
use rrd2prom::config::{self, Config, OutputFormat, EXAMPLE_CONFIG};
use rrd2prom::logging;
use rrd2prom::manager::{Manager, StopHandle, Streams};
use rrd2prom::output::Printer;
use rrd2prom::sources::{Reader, RrdReader, Source};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet, cli.log_format)?;

    let result = match cli.command {
        Commands::Run {
            config,
            url,
            name,
            format,
        } => run(config, url, name, format).await,
        Commands::Check { config } => check(&config).await,
        Commands::Init => init(),
    };

    if let Err(ref e) = result {
        error!(error = %e, "Command failed");
    }

    result
}

async fn run(
    config_path: PathBuf,
    url: Option<String>,
    name: String,
    format: Option<OutputFormat>,
) -> Result<()> {
    let cfg = match url {
        Some(url) => {
            let cfg = Config::single(url, name);
            cfg.validate()?;
            cfg
        }
        None => config::load_config(&config_path)?,
    };
    let printer = Printer::new(format.unwrap_or(cfg.output.format));

    let reader = Arc::new(RrdReader::new(&cfg.http.reader_config())?);
    let sources = open_sources(reader.as_ref(), &cfg).await;
    if sources.is_empty() {
        bail!("none of the configured sources could be opened");
    }

    let (manager, streams) =
        Manager::with_config(Arc::clone(&reader), sources, cfg.manager.manager_config());

    let stop = manager.stop_handle();
    ctrlc::set_handler(move || {
        if on_signal(&stop) == SignalAction::Exit {
            warn!("Interrupted again during shutdown, exiting without waiting for pollers");
            std::process::exit(130);
        }
    })
    .context("failed to install signal handler")?;

    let printing = tokio::spawn(print_events(streams, printer));
    manager.run().await;
    printing.await.context("event printer failed")?;

    info!("Shut down cleanly");
    Ok(())
}

/// What a termination signal should do
#[derive(Debug, PartialEq)]
enum SignalAction {
    /// Start a graceful shutdown
    Shutdown,
    /// A shutdown is already under way; leave immediately
    Exit,
}

fn on_signal(stop: &StopHandle) -> SignalAction {
    if stop.is_stopped() {
        SignalAction::Exit
    } else {
        stop.stop();
        SignalAction::Shutdown
    }
}

/// Open every enabled source, skipping the ones that fail
async fn open_sources(reader: &RrdReader, cfg: &Config) -> Vec<Source> {
    let mut sources = Vec::new();
    for source_cfg in cfg.enabled_sources() {
        match reader.open(&source_cfg.location, &source_cfg.name).await {
            Ok(source) => {
                info!(
                    source = source.name(),
                    location = source.location(),
                    interval_secs = source.interval().as_secs(),
                    series = source.series_count(),
                    "Opened source"
                );
                sources.push(source);
            }
            Err(e) => {
                error!(source = %source_cfg.name, error = %e, "Couldn't open source, it will not be polled");
            }
        }
    }
    sources
}

/// Print events until all three streams have closed
async fn print_events(mut streams: Streams, printer: Printer) {
    let mut metrics_open = true;
    let mut messages_open = true;
    let mut errors_open = true;

    while metrics_open || messages_open || errors_open {
        tokio::select! {
            metric = streams.metrics.recv(), if metrics_open => match metric {
                Some(metric) => println!("{}", printer.metric(&metric)),
                None => metrics_open = false,
            },
            message = streams.messages.recv(), if messages_open => match message {
                Some(message) => println!("{}", printer.message(&message)),
                None => messages_open = false,
            },
            err = streams.errors.recv(), if errors_open => match err {
                Some(err) => println!("{}", printer.error(&err)),
                None => errors_open = false,
            },
        }
    }
}

async fn check(config_path: &Path) -> Result<()> {
    println!("Checking configuration at {:?}...", config_path);
    let cfg = config::load_config(config_path)?;

    println!("Configuration is valid!");
    println!("  Verify TLS: {}", cfg.http.verify_tls);
    println!("  HTTP timeout: {}s", cfg.http.timeout_secs);
    if let Some(dir) = &cfg.http.temp_dir {
        println!("  Temp dir: {:?}", dir);
    }
    println!("  Channel capacity: {}", cfg.manager.channel_capacity);
    match cfg.manager.shutdown_timeout_secs {
        Some(secs) => println!("  Shutdown timeout: {}s", secs),
        None => println!("  Shutdown timeout: none"),
    }
    println!("  Sources: {}", cfg.sources.len());

    let reader = RrdReader::new(&cfg.http.reader_config())?;
    let mut failed = 0;
    for source_cfg in &cfg.sources {
        if !source_cfg.enabled {
            println!("\n{}: disabled", source_cfg.name);
            continue;
        }

        println!("\n{}:", source_cfg.name);
        println!("  Location: {}", source_cfg.location);
        match reader.open(&source_cfg.location, &source_cfg.name).await {
            Ok(source) => {
                println!("  Interval: {:?}", source.interval());
                println!("  Last update: {}", source.last_update().to_rfc3339());
                println!("  Series:");
                for series in source.series_by_index() {
                    println!(
                        "    [{}] {} ({}): {}",
                        series.index, series.name, series.kind, series.last_value
                    );
                }
            }
            Err(e) => {
                println!("  Error: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} source(s) could not be opened", failed);
    }
    Ok(())
}

fn init() -> Result<()> {
    let path = Path::new("rrd2prom.yaml");
    if path.exists() {
        println!("rrd2prom.yaml already exists. Not overwriting.");
    } else {
        std::fs::write(path, EXAMPLE_CONFIG).context("failed to write rrd2prom.yaml")?;
        println!("Created rrd2prom.yaml with example configuration.");
    }
    Ok(())
}
