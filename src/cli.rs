use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Runs one `ScalerLoop` per configured cluster.
#[derive(Parser, Debug)]
#[command(name = "rcscaler")]
#[command(about = "Resource cluster autoscaler control loop")]
#[command(version)]
pub struct Cli {
    /// Path to the scaler config file (YAML)
    #[arg(required = true)]
    pub config: PathBuf,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
