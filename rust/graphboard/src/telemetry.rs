use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Service-specific filter, consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "GRAPHBOARD_LOG";

const DEFAULT_DIRECTIVES: &str = "info,graphboard=info,tower_http=info";

pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        fmt().with_env_filter(log_filter()).with_target(false).init();
    });
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn rust_log_wins_over_service_filter() {
        env::set_var("RUST_LOG", "warn");
        env::set_var(LOG_ENV, "graphboard=debug");
        let filter = log_filter().to_string();
        assert!(filter.contains("warn") && !filter.contains("graphboard"), "{filter}");

        env::remove_var("RUST_LOG");
        let filter = log_filter().to_string();
        assert!(filter.contains("graphboard=debug"), "{filter}");

        env::remove_var(LOG_ENV);
        assert!(log_filter().to_string().contains("tower_http=info"));
    }
}
