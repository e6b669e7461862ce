use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::tracker::controller::RemainderPolicy;

#[derive(Parser)]
pub struct BridgeArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    /// What happens to accumulated sub-minute time when a flush runs.
    #[arg(long, value_enum, default_value_t)]
    pub remainder: RemainderPolicy,
}
