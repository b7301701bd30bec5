use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use bpmon_lib::config::monitor_config::CONFIG_FILE_NAME;
use bpmon_lib::{
    BloodPressureMonitor, BluestAdapter, BpError, MonitorConfig, cancel_measurement, logging,
    read_battery_level, take_measurement,
};
use log::{LevelFilter, error, info, warn};

const CONFIG_ENV: &str = "BPMON_CONFIG";

enum Command {
    Measure,
    Battery,
}

/// `bpmon [measure|battery] [config-path]`
fn parse_args() -> Result<(Command, PathBuf)> {
    let mut command = Command::Measure;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "measure" => command = Command::Measure,
            "battery" => command = Command::Battery,
            path if config_path.is_none() => config_path = Some(PathBuf::from(path)),
            other => return Err(anyhow!("Unexpected argument: {}", other)),
        }
    }
    let config_path = config_path
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    Ok((command, config_path))
}

fn report(e: &BpError) {
    error!("{}", e);
    if let Some(hint) = e.hint() {
        warn!("{}", hint);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LevelFilter::Info);

    let (command, config_path) = parse_args()?;
    let config = MonitorConfig::load_config(&config_path).await?;
    let adapter = Arc::new(BluestAdapter::new().await?);
    let monitor = Arc::new(BloodPressureMonitor::new(adapter, config));

    match command {
        Command::Battery => match read_battery_level(&*monitor).await {
            Ok(level) => {
                println!("{}", serde_json::json!({ "battery_percent": level }));
                if let Err(e) = monitor.disconnect().await {
                    warn!("Disconnect failed: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                report(&e);
                Err(e.into())
            }
        },
        Command::Measure => {
            let mut measurement = {
                let monitor = monitor.clone();
                tokio::spawn(async move { take_measurement(&*monitor).await })
            };

            let result = tokio::select! {
                joined = &mut measurement => joined?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, canceling the reading...");
                    if let Err(e) = cancel_measurement(&*monitor).await {
                        report(&e);
                    }
                    measurement.await?
                }
            };

            match result {
                Ok(Some(record)) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(())
                }
                Ok(None) => {
                    info!("No measurement taken.");
                    Ok(())
                }
                Err(e) => {
                    report(&e);
                    Err(e.into())
                }
            }
        }
    }
}
