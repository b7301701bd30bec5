use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Installs the process-wide logger. `RUST_LOG` overrides `level`.
/// Returns false when a logger was already installed.
pub fn init(level: LevelFilter) -> bool {
    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
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
        .try_init();

    match result {
        Ok(()) => {
            log::info!("Logging initialized");
            true
        }
        Err(_) => false,
    }
}
