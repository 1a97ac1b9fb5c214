use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ballot-server", about = "Real-time polling backend")]
pub struct Args {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(short, long, default_value = "ballot.toml")]
    pub config: String,

    /// Override `server.bind_address` from the config file.
    #[arg(long)]
    pub bind: Option<String>,
}
