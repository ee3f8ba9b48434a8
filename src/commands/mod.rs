pub mod agent;
pub mod protection;
pub mod utils;

use anyhow::Result;

use crate::agent::get_agent_config_path;
use crate::cli::{Args, Commands};

/// Dispatch a parsed command line
pub fn run(args: Args) -> Result<()> {
    let config_path = args.agent_config.unwrap_or_else(get_agent_config_path);
    let verbose = args.verbose;

    match args.command {
        Commands::Setup {
            url,
            device_id,
            token,
            check_interval,
        } => agent::setup(&config_path, url, device_id, token, check_interval, verbose),
        Commands::Start => agent::start(&config_path, verbose),
        Commands::CheckNow => agent::check_now(&config_path, verbose),
        Commands::Status => agent::status(&config_path, verbose),
        Commands::Enroll => protection::enroll(&config_path, verbose),
        Commands::Unenroll => protection::unenroll(&config_path, verbose),
    }
}
