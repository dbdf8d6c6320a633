use balancer_config::Logging;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber from the `[logging]` config table.
///
/// With a file configured, logs go there as JSON lines with the requested
/// rotation; otherwise human-readable logs go to stderr. The returned guard
/// must be kept alive for the non-blocking writer to flush.
pub fn init(cfg: &Logging, cli_level: Option<&str>) -> eyre::Result<Option<WorkerGuard>> {
    let level = cli_level
        .or(cfg.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = &cfg.file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let dir = dir.unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;

        let appender = match cfg.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            Some("never") | None => tracing_appender::rolling::never(dir, name),
            Some(other) => return Err(eyre::eyre!("unknown logging.rotation: {other}")),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(None)
    }
}
