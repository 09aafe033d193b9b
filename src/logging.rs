use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Installs the process-wide logger.
///
/// Records go to stderr as `<timestamp> [LEVEL] target: message` so that
/// stdout stays free for the event stream. `RUST_LOG` takes precedence over
/// `level` when it is set.
pub fn init(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .parse_default_env();

    // Tests may call this more than once
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Maps the number of `-v` flags to a level filter
pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Warn);
        assert_eq!(level_from_verbosity(1), LevelFilter::Info);
        assert_eq!(level_from_verbosity(2), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(9), LevelFilter::Trace);
    }

    #[test]
    fn init_twice_is_harmless() {
        init(LevelFilter::Info);
        init(LevelFilter::Debug);
    }
}
