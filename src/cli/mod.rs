pub mod capture;
pub mod program;
pub mod replay;


use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};

use crate::drivers::synaptics_tcm::TOUCH_REPORT_CONFIG_SIZE;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Replay a recorded touch report capture and print the touch events
    Replay {
        /// Path to the capture file
        capture: PathBuf,
        /// Device config to use instead of searching the config directories
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode and print a hex encoded touch report config
    Disasm {
        /// Touch report config bytes (e.g. "01 06 04 07 04 03 00")
        hex: String,
    },
    /// Print the touch report config installed by the host
    DefaultConfig {
        /// Include the double tap gesture field
        #[arg(long)]
        double_tap: bool,
        /// Maximum touch report config size of the device
        #[arg(long, default_value_t = TOUCH_REPORT_CONFIG_SIZE)]
        size: usize,
    },
}

pub async fn main_cli(args: Args) -> Result<(), Box<dyn Error>> {
    match args.cmd {
        Commands::Replay {
            capture,
            config,
            json,
        } => replay::handle_replay(capture, config, json).await?,
        Commands::Disasm { hex } => program::handle_disasm(hex)?,
        Commands::DefaultConfig { double_tap, size } => {
            program::handle_default_config(double_tap, size)?
        }
    }

    Ok(())
}
