use chrono::Duration;

/// Initialize logging; `--verbose` wins over the configured level
pub fn init_logging(verbose: bool, configured: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose {
        "debug"
    } else {
        configured.unwrap_or("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Format a duration as its largest whole unit
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

pub fn print_sudo_message() {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "curfew-agent".to_string());
    eprintln!("Please run with sudo: sudo {}", program);
}

/// Exit with a hint when not running as root
pub fn require_admin() {
    if let Err(e) = crate::platform::ensure_admin_privileges() {
        eprintln!("Insufficient privileges: {:#}", e);
        print_sudo_message();
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_use_largest_unit() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(125)), "2m");
        assert_eq!(format_duration(Duration::hours(5)), "5h");
        assert_eq!(format_duration(Duration::days(3)), "3d");
    }
}
