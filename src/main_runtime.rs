use dealsync::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn default_filter(logging: &LoggingConfig) -> EnvFilter {
    let directive = if logging.level.eq_ignore_ascii_case("info") {
        "info,dealsync=debug".to_string()
    } else {
        logging.level.clone()
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info,dealsync=debug"))
}

/// Console logging plus a daily file when `DEALSYNC_LOG_DIR` is writable.
/// Keep the returned guard alive for the life of the process.
pub fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(logging));

    // `rolling::daily` panics if it cannot create the first file, so check first.
    let mut guard = None;
    let file_layer = match std::env::var("DEALSYNC_LOG_DIR") {
        Ok(log_dir) => {
            let writable = std::fs::create_dir_all(&log_dir).is_ok() && {
                let test_path = std::path::Path::new(&log_dir).join(".dealsync_write_test");
                let ok = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&test_path)
                    .is_ok();
                let _ = std::fs::remove_file(&test_path);
                ok
            };

            if writable {
                let file_appender = tracing_appender::rolling::daily(&log_dir, "dealsync.log");
                let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(worker_guard);
                eprintln!("Logging to: {}/dealsync.log", log_dir);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            } else {
                eprintln!(
                    "Warning: Could not write to log directory {}, file logging disabled",
                    log_dir
                );
                None
            }
        }
        Err(_) => None,
    };

    let (console_layer, json_layer) = if logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();

    guard
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
