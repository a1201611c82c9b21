use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "quizsession", version, about = "Timed assessment sessions in the terminal")]
pub struct Cli {
    /// Attempt file (YAML)
    #[arg(default_value = "attempt.yaml")]
    pub attempt_file: PathBuf,

    /// Config file [default: per-user config.yaml if present]
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Where saved answers live
    #[arg(long, value_name = "dir")]
    pub data_dir: Option<PathBuf>,

    /// Log file [default: <data-dir>/session.log]
    #[arg(long, value_name = "path")]
    pub log_file: Option<PathBuf>,

    /// Clear saved answers and start fresh
    #[arg(long)]
    pub clear: bool,

    /// Show current progress without entering the TUI
    #[arg(long)]
    pub status: bool,

    /// Export saved answers to a file (for backup)
    #[arg(long, value_name = "path")]
    pub export: Option<PathBuf>,
}
