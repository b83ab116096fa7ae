use std::fs::OpenOptions;
use std::sync::OnceLock;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber. Safe to call more than once; only
/// the first call takes effect.
///
/// Logs go to stderr, or to `log_file` when one is configured; `log_json`
/// selects JSON lines over human-readable text for either sink.
pub fn init_tracing(config: &AppConfig) {
    let _ = TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_new(&config.log_filter)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        if let Some(path) = &config.log_file {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(_) => return,
            };
            if config.log_json {
                let subscriber = tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(file)
                    .with_current_span(false)
                    .with_span_list(false)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            } else {
                let subscriber = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(file)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        } else if config.log_json {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        } else {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    });
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::init_tracing;
    use crate::config::AppConfig;

    // Installing the global subscriber is one-shot per process, so the file
    // sink behavior is covered by a single test.
    #[test]
    fn file_sink_honors_plain_text_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.log");
        let config = AppConfig::parse_from([
            "test-app",
            "--log-file",
            path.to_str().unwrap(),
            "--log-filter",
            "info",
        ]);
        assert!(!config.log_json);

        init_tracing(&config);
        tracing::info!(marker = "telemetry-file-sink", "file sink line");

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents
            .lines()
            .find(|l| l.contains("telemetry-file-sink"))
            .expect("log line reaches the file");
        assert!(!line.trim_start().starts_with('{'));
    }
}
