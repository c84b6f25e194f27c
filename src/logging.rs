use std::str::FromStr;

use tracing::Level;

/// Pick the log level: each `-v` raises it above warn, otherwise the
/// configured level applies. An unknown configured level falls back to warn.
pub fn level_for(verbose: u8, configured: Option<&str>) -> Level {
    match verbose {
        0 => configured
            .and_then(|s| Level::from_str(s.trim()).ok())
            .unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the stderr subscriber. Only the binary calls this; a second call
/// is a no-op.
pub fn init(verbose: u8, configured: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for(verbose, configured))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_overrides_config() {
        assert_eq!(level_for(0, None), Level::WARN);
        assert_eq!(level_for(0, Some("debug")), Level::DEBUG);
        assert_eq!(level_for(0, Some("loud")), Level::WARN);
        assert_eq!(level_for(1, Some("error")), Level::INFO);
        assert_eq!(level_for(5, None), Level::TRACE);
    }
}
