use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod device;
mod host;
mod indicator;
mod link;
mod pattern;
mod port;
mod prbs;
mod reactor;
mod sim;
mod stats;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.debug);
    match args.cmd {
        cli::Cmd::Device(opts) => device::run(opts),
        cli::Cmd::Host(opts) => host::run(opts),
        cli::Cmd::Sim(opts) => sim::run(opts),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
