// Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// certwatch - certificate expiration monitor with webhook notifications
#[derive(Debug, Parser)]
#[command(name = "certwatch", version, about)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "certwatch.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the monitoring loop until stopped
    Daemon,

    /// Run a single evaluation cycle and exit
    Check,

    /// Add a certificate to monitor (a file path or host[:port])
    Add {
        /// File path or host[:port] of the certificate
        target: String,

        /// Human-readable name for notifications
        #[arg(long)]
        label: Option<String>,

        /// Warning window for this certificate, overriding the global setting
        #[arg(long)]
        threshold_days: Option<i64>,
    },

    /// Stop monitoring a certificate
    Remove {
        /// Id of the monitored certificate (see `list`)
        id: String,
    },

    /// List monitored certificates
    List,

    /// Set the webhook URL notifications are delivered to
    SetWebhook { url: String },

    /// Set the global warning window in days
    SetThreshold { days: i64 },

    /// Send a test notification to the configured webhook
    TestWebhook,

    /// Write a default configuration file
    InitConfig,
}
