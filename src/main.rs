//! hookd - operator-side device bridge CLI
//!
//! The orchestration engine itself lives in `hookd-engine` and is embedded
//! by the serving front door; this binary covers the bridge-side workflows
//! an operator runs against devices directly.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hookd_bridge::{
    check_server_version, detect_abi, ensure_server, install_server, AdbBridge, DeviceBridge,
    ProvisionOutcome, ToolAvailability,
};
use hookd_core::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "hookd")]
#[command(about = "Device bridge workflows for the hookd instrumentation engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices visible to the bridge
    Devices,

    /// Install and start the instrumentation server on a device
    Provision {
        /// Device serial (as shown by `hookd devices`)
        #[arg(long)]
        device: String,

        /// Local server binary to push before starting
        #[arg(long)]
        binary: Option<PathBuf>,
    },

    /// Check local tooling
    Doctor,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    hookd_core::logging::init()?;

    let args = Args::parse();
    let config = config_from_env();
    let bridge = AdbBridge::from_config(&config);

    match args.command {
        Command::Devices => {
            let devices = bridge.list_devices().await?;
            if devices.is_empty() {
                println!("No devices found.");
            } else {
                for device in devices {
                    println!("{}\t{}", device.serial, device.state);
                }
            }
        }

        Command::Provision { device, binary } => {
            let abi = detect_abi(&bridge, &device).await;
            println!("Device ABI: {}", abi.artifact_suffix());

            if let Some(local) = binary {
                install_server(&bridge, &device, &local, &config.server_path).await?;
                println!("Installed {} to {}", local.display(), config.server_path);
            }

            let outcome = ensure_server(
                &bridge,
                &device,
                &config.server_path,
                config.server_binary_name(),
            )
            .await?;
            match outcome {
                ProvisionOutcome::AlreadyRunning => {
                    println!("Instrumentation server already running.")
                }
                ProvisionOutcome::Started => println!("Instrumentation server started."),
            }

            let check = check_server_version(
                &bridge,
                &device,
                &config.server_path,
                config.expected_server_version.as_deref(),
            )
            .await;
            if let Some((reported, expected)) = check.mismatch() {
                // Informational only, never a failure
                println!(
                    "Warning: server reports version {} but {} was expected.",
                    reported, expected
                );
            } else if let Some(reported) = &check.reported {
                println!("Server version: {}", reported);
            }
        }

        Command::Doctor => {
            let tools = ToolAvailability::check(&config.bridge_path);
            match &tools.adb_path {
                Some(path) => println!("adb: {}", path.display()),
                None => {
                    println!("{}", tools.adb_unavailable_message().unwrap_or("adb: missing"))
                }
            }
            println!("server path: {}", config.server_path);
            match &config.expected_server_version {
                Some(version) => println!("expected server version: {}", version),
                None => println!("expected server version: (not set)"),
            }
        }
    }

    Ok(())
}

/// Build the engine config from `HOOKD_*` environment variables
fn config_from_env() -> EngineConfig {
    config_from(|name| std::env::var(name).ok())
}

fn config_from(get: impl Fn(&str) -> Option<String>) -> EngineConfig {
    let mut config = EngineConfig::default();

    if let Some(path) = get("HOOKD_ADB_PATH") {
        config.bridge_path = PathBuf::from(path);
    }
    if let Some(path) = get("HOOKD_SERVER_PATH") {
        config.server_path = path;
    }
    config.expected_server_version = get("HOOKD_SERVER_VERSION");

    config
}
