use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Heliox multi-tenant API gateway
#[derive(Debug, Parser)]
#[command(name = "heliox", about = "Multi-tenant API gateway with rate limiting, quotas, caching and abuse blocking")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "heliox.toml", env = "HELIOX_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "HELIOX_LISTEN")]
    pub listen: Option<SocketAddr>,
}
