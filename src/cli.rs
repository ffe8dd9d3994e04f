use crate::domains::settings::PortRange;
use clap::Parser;
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maestro - Parallel agent sessions, one worktree per branch
#[derive(Debug, Parser)]
#[command(
    name = "maestro",
    about = "Maestro - Parallel agent sessions, one worktree per branch",
    version = VERSION,
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}

EXAMPLES:
    maestro                               # Open current directory
    maestro /path/to/repo                 # Open specific repository
    maestro --port-start 9950             # Look for a status port from 9950
    maestro --no-status                   # Run without the status endpoint
    maestro --version, -V                 # Show version information
    maestro --help, -h                    # Show this help message
"
)]
pub struct Cli {
    /// Repository to open. Defaults to current working directory if omitted.
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// First port tried for the status endpoint
    #[arg(long, value_name = "PORT")]
    pub port_start: Option<u16>,

    /// Last port tried for the status endpoint
    #[arg(long, value_name = "PORT")]
    pub port_end: Option<u16>,

    /// Do not start the status endpoint
    #[arg(long)]
    pub no_status: bool,
}

impl Cli {
    /// Applies the port overrides on top of the configured range.
    pub fn port_range(&self, configured: PortRange) -> PortRange {
        PortRange::new(
            self.port_start.unwrap_or(configured.start),
            self.port_end.unwrap_or(configured.end),
        )
    }
}
