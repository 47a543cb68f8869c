// Command Line Interface Module
// clap definitions and colored status helpers for the dcm binary

pub mod commands;

use clap::{Parser, Subcommand};
use colored::*;
use domain_cert_manager::config::DEFAULT_CONFIG_PATH;

/// dcm - custom-domain certificate lifecycle manager
#[derive(Parser)]
#[command(name = "dcm")]
#[command(version)]
#[command(about = "Issues and rolls out TLS certificates for tenant custom domains", long_about = None)]
pub struct Cli {
    /// Human-readable logs on stderr instead of JSON
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: operator API plus the optional sweep ticker
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },

    /// Run one sweep over every registered project
    Sweep {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },

    /// Renew a single project now and wait for the result
    Renew {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },

    /// Show CNAME validation and renewal decisions without issuing anything
    Plan {
        /// Limit the plan to one project
        #[arg(short, long)]
        project: Option<String>,

        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        file: String,
    },
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}
