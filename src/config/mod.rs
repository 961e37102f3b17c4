pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "funding-watch.toml";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "funding-watch")]
#[command(about = "Watches crowdfunding projects and announces funding milestones")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the monitoring loop until interrupted
    Run,
    Tenant {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: TenantCommand,
    },
    Project {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ProjectCommand,
    },
    Threshold {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ThresholdCommand,
    },
    Channel {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ChannelCommand,
    },
    /// Simulate a funding amount and send the alerts it would trigger
    TestFunding {
        #[arg(long)]
        tenant: String,
        title: String,
        amount: u64,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum TenantCommand {
    Init,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum ProjectCommand {
    Add { url: String },
    Stop { title: String },
    List,
    /// Titles containing the given text
    Search { needle: String },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum ThresholdCommand {
    Add { title: String, amount: u64 },
    Clear { title: String },
    List { title: String },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum ChannelCommand {
    Add { url: String },
    Remove { url: String },
}
