use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};
use nch_wifi_controller_lib::config::AppConfig;
use nch_wifi_controller_lib::console::{self, ConsoleRequest, Task};
use nch_wifi_controller_lib::logging;
use nch_wifi_controller_lib::state::AppState;

/// Switch the Wi-Fi radio of an NCH over Bluetooth
#[derive(Debug, Parser)]
#[command(name = "nch-wifi-controller", version, about)]
struct Cli {
    /// Directory holding nch_config.json
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    /// How many times to retry a failed pairing, connect or lost link
    #[arg(long, global = true, default_value_t = 0)]
    retries: u32,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List the NCHs in range
    Scan,
    /// Print the Wi-Fi state of an NCH
    Status {
        /// Address or display name
        device: String,
    },
    /// Turn Wi-Fi on
    Enable { device: String },
    /// Turn Wi-Fi off
    Disable { device: String },
    /// Flip Wi-Fi relative to its current state
    Toggle { device: String },
    /// Write the effective config back to nch_config.json and print it
    Config,
}

impl CliCommand {
    /// `None` for commands that need no Bluetooth.
    fn into_request(self, retries: u32) -> Option<ConsoleRequest> {
        let (task, device) = match self {
            CliCommand::Scan => (Task::Scan, None),
            CliCommand::Status { device } => (Task::Status, Some(device)),
            CliCommand::Enable { device } => (Task::Enable, Some(device)),
            CliCommand::Disable { device } => (Task::Disable, Some(device)),
            CliCommand::Toggle { device } => (Task::Toggle, Some(device)),
            CliCommand::Config => return None,
        };
        Some(ConsoleRequest {
            task,
            device,
            retries,
        })
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(request) = cli.command.into_request(cli.retries) else {
        let config = AppConfig::write_effective(&cli.config_dir).await?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    };

    let config = AppConfig::load_config(&cli.config_dir).await?;
    let (app_state, mut events) = AppState::new(config).await?;

    info!("Running {:?}", request);
    let wifi_state = console::run(&app_state, &mut events, &request, io::stdout().lock()).await?;
    if let Some(wifi_state) = wifi_state {
        info!("Wi-Fi is {}", wifi_state);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::level_from_verbosity(cli.verbose));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
