//! Structured logging: JSON (or pretty) file log plus optional stderr mirror.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";
const LOG_FILE: &str = "relaydeck.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub struct LoggingHandle {
    pub run_id: String,
    /// Flushes the non-blocking file writer on drop; hold until exit.
    pub guard: WorkerGuard,
}

fn resolve_filter() -> (EnvFilter, String) {
    if let Ok(value) = std::env::var("RELAYDECK_LOG_FILTER") {
        if let Ok(filter) = EnvFilter::try_new(&value) {
            return (filter, value);
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        let shown = std::env::var("RUST_LOG").unwrap_or_default();
        return (filter, shown);
    }
    (EnvFilter::new(DEFAULT_FILTER), DEFAULT_FILTER.to_string())
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .flatten_event(true)
            .with_file(true)
            .with_line_number(true)
            .with_current_span(true)
            .boxed(),
    }
}

pub fn init_logging(
    log_dir: &Path,
    format: LogFormat,
    mirror_stderr: bool,
) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    if std::env::var("RELAYDECK_TRUNCATE_LOG_ON_START").as_deref() == Ok("1") {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)?;
    }

    let (filter, filter_desc) = resolve_filter();
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    let mut layers: Vec<BoxedLayer> = vec![file_layer(format, writer)];
    if mirror_stderr {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    let run_id = std::env::var("RELAYDECK_RUN_ID").unwrap_or_else(|_| {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), millis)
    });

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_path.display(),
        format = ?format,
        filter = %filter_desc,
        run_id = %run_id,
        "Logging initialized"
    );

    Ok(LoggingHandle { run_id, guard })
}
