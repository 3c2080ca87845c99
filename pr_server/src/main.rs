//! A low-level TCP poker server hosting any number of rooms.
//!
//! The server runs with two threads; one for managing TCP connections
//! and exchanging data, and another that owns every room and applies
//! user commands one at a time.

use anyhow::Error;
use ctrlc::set_handler;
use log::info;
use pico_args::Arguments;
use poker_rooms::server::{self, DEFAULT_MAX_CONNECTIONS, ServerConfig};

const HELP: &str = "\
Run a multi-room poker server

USAGE:
  pr_server [OPTIONS]

OPTIONS:
  --bind             IP:PORT  Server socket bind address  [default: 127.0.0.1:6969]
  --max_connections  N        Max concurrent connections  [default: 256]

FLAGS:
  -h, --help                  Print help information
";

struct Args {
    bind: String,
    max_connections: usize,
}

fn main() -> Result<(), Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs
            .value_from_str("--bind")
            .unwrap_or("127.0.0.1:6969".into()),
        max_connections: pargs
            .value_from_str("--max_connections")
            .unwrap_or(DEFAULT_MAX_CONNECTIONS),
    };

    let config = ServerConfig {
        max_connections: args.max_connections,
        ..Default::default()
    };

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    env_logger::builder().format_target(false).init();
    info!("starting at {}", args.bind);
    server::run(&args.bind, config)?;

    Ok(())
}
