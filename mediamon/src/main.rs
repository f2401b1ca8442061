use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use mediamon_config::MonitorSettings;
use mediamon_core::filter::DEFAULT_MEDIA_EXTENSIONS;
use mediamon_core::{Monitor, NotifyBackend};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "mediamon", version)]
#[command(
    about = "Run a program once on every new file that lands in the watched folders"
)]
struct Cli {
    /// Extension to match, including the leading dot (repeatable).
    /// Defaults to common video extensions when only --exec is given.
    #[arg(short = 'e', long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Program, plus any fixed arguments, run as `<PROG> <file>`
    #[arg(short = 'x', long = "exec", value_name = "PROG")]
    exec: Option<String>,

    /// TOML or JSON settings file (falls back to MEDIAMON_CONFIG_PATH)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Quiet period before a batch of new files is handled, e.g. 3s or 500ms
    #[arg(long, value_name = "DURATION")]
    latency: Option<humantime::Duration>,

    /// Folders to watch
    #[arg(value_name = "FOLDER")]
    folders: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (mut settings, source) = MonitorSettings::load(cli.config.as_deref())
        .context("failed to load monitor settings")?;
    debug!(?source, "loaded monitor settings");
    apply_cli(&mut settings, cli)?;

    if settings.folders.is_empty() {
        bail!("no folders to watch; pass them as arguments or in the config");
    }
    if settings.filters.is_empty() {
        bail!("no program to run; pass -x <PROG> or add filters to the config");
    }

    let filters = settings.filters();
    for filter in &filters {
        if let Err(err) = filter.validate() {
            warn!(program = %filter.program, "filter will not run cleanly: {err}");
        }
    }

    let monitor = Monitor::with_parts(
        settings.watch_config(),
        Arc::new(NotifyBackend),
        Arc::new(settings.runner()),
    );
    monitor.add_filters(filters).await?;
    monitor.add_folders(settings.folders.as_slice()).await?;
    monitor
        .start()
        .await
        .context("failed to start watching folders")?;

    println!("Press 'q' to stop");
    let result = run_console(&monitor).await;
    monitor.free().await;
    result
}

/// Folds command-line flags into the loaded settings. Folders are appended;
/// `--exec` adds one more filter.
fn apply_cli(settings: &mut MonitorSettings, cli: Cli) -> anyhow::Result<()> {
    if let Some(latency) = cli.latency {
        settings.latency_ms = latency.as_millis() as u64;
    }
    settings.folders.extend(cli.folders);

    match cli.exec {
        Some(program) => {
            let extensions = if cli.extensions.is_empty() {
                DEFAULT_MEDIA_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            } else {
                cli.extensions
            };
            settings.filters.push(mediamon_config::FilterSettings {
                program,
                extensions,
            });
        }
        None if !cli.extensions.is_empty() => {
            bail!("--ext needs a program to run; pass -x <PROG>");
        }
        None => {}
    }
    Ok(())
}

/// Reads operator commands until `q`, end of input or Ctrl-C.
async fn run_console(monitor: &Monitor) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    return Ok(());
                };
                match line.trim() {
                    "q" => return Ok(()),
                    "s" => print!("{}", monitor.print_status().await),
                    "" => {}
                    other => {
                        eprintln!("unknown command '{other}': 'q' stops, 's' prints status");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }
    }
}
