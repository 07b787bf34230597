//! CLI definitions for formguard.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Formguard CLI.
#[derive(Parser)]
#[command(name = "formguard")]
#[command(about = "Find required form fields and manage their validation annotations")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file (JSON, partial allowed)
    #[arg(short, long, global = true, env = "FORMGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Validation state file
    #[arg(long, global = true, default_value = "formguard-state.json")]
    pub state: PathBuf,

    /// Plan limits per tier (JSON object keyed by tier)
    #[arg(long, global = true)]
    pub limits: Option<PathBuf>,

    /// Plan tier, overriding the configuration
    #[arg(long, global = true)]
    pub tier: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Document and scope an operation works on
#[derive(Args)]
pub(crate) struct Target {
    /// Document snapshot (JSON node list)
    pub document: PathBuf,

    /// Key of the persisted validation states
    #[arg(long, default_value = "default")]
    pub scope: String,

    /// Only forms inside this node
    #[arg(long)]
    pub root: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List forms and their required fields
    Scan {
        #[command(flatten)]
        target: Target,
    },

    /// Annotate forms with validation rules
    Apply {
        #[command(flatten)]
        target: Target,

        /// Form ids (all scanned forms when omitted)
        #[arg(long = "form")]
        forms: Vec<String>,

        /// Print the planned mutations without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Write the updated document here instead of in place
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Remove validation annotations from forms
    Remove {
        #[command(flatten)]
        target: Target,

        /// Form ids (all scanned forms when omitted)
        #[arg(long = "form")]
        forms: Vec<String>,

        /// Write the updated document here instead of in place
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete stored states of forms missing from the document
    Prune {
        #[command(flatten)]
        target: Target,
    },
}
