//! Command-line interface (clap derive).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// veobatch: submit text-to-video prompts in bulk and track the jobs.
#[derive(Debug, Parser)]
#[command(name = "veobatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit prompts as a new batch and watch it until every job finishes.
    Generate {
        /// Prompts given directly; each argument is one prompt.
        prompts: Vec<String>,

        /// Read prompts from a file, separated by blank lines.
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Maximum simultaneous API calls (1-20).
        #[arg(long, short)]
        concurrency: Option<usize>,

        /// Session snapshot file.
        #[arg(long)]
        session: Option<PathBuf>,

        /// Aspect ratio sent with every prompt, e.g. 16:9 or 9:16.
        #[arg(long)]
        aspect_ratio: Option<String>,

        /// Submit and exit without polling; continue later with `resume`.
        #[arg(long, default_value_t = false)]
        no_watch: bool,

        /// Replace an existing session that still has unfinished jobs.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Reload a saved session, submit anything left and keep polling.
    Resume {
        #[arg(long)]
        session: Option<PathBuf>,

        #[arg(long, short)]
        concurrency: Option<usize>,
    },

    /// Print progress and per-job state of the saved session.
    Status {
        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Mark jobs as selected (or unselected with --off).
    Select {
        /// Job ids or unique id prefixes.
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long, default_value_t = false)]
        off: bool,

        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Write the session as CSV (prompt, video_url, status, selected).
    Export {
        #[arg(long)]
        session: Option<PathBuf>,

        /// Output file; `-` for stdout. Defaults to video_results_<timestamp>.csv.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Prefix the file with a UTF-8 byte order mark.
        #[arg(long, default_value_t = false)]
        bom: bool,
    },
}
