use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// posture — security-posture ingestion and risk scoring
#[derive(Parser, Debug)]
#[command(name = "posture", version, about = "Ingest security scan artifacts and score organizational risk")]
pub struct Args {
    /// Database path (default: ~/.posture/posture.db)
    #[arg(long = "db", value_name = "PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Increase verbosity level (use -v or -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Seed a demo organization and use it when --org is omitted
    #[arg(long = "demo", global = true)]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage organizations
    #[command(subcommand)]
    Org(OrgCommand),

    /// Ingest scan artifacts (nmap/Nessus/OpenVAS XML, documents, images)
    Ingest {
        /// Organization id (or use --demo)
        #[arg(long = "org", value_name = "ID")]
        org: Option<String>,

        /// Files to ingest
        #[arg(value_name = "FILE", required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Maximum files processed concurrently
        #[arg(long, value_name = "N", default_value = "4")]
        concurrency: usize,

        /// Extraction service endpoint for documents/images
        /// (or POSTURE_EXTRACT_URL)
        #[arg(long = "extract-url", value_name = "URL")]
        extract_url: Option<String>,

        /// Extraction request timeout in seconds
        #[arg(long = "extract-timeout", value_name = "SECS", default_value = "60")]
        extract_timeout: u64,

        /// Print per-file reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the organization's risk score
    Score {
        /// Organization id (or use --demo)
        #[arg(long = "org", value_name = "ID")]
        org: Option<String>,

        /// Persist an immutable snapshot of the computed score
        #[arg(long)]
        save: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show risk score history
    History {
        /// Organization id (or use --demo)
        #[arg(long = "org", value_name = "ID")]
        org: Option<String>,

        /// Maximum snapshots to show
        #[arg(long, value_name = "N", default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    /// Create an organization
    Create {
        #[arg(long, value_name = "NAME")]
        name: String,
    },
    /// List organizations
    List,
}
