//! podium: real-time weekly user-ranking service.
//!
//! thin orchestration: parse args -> init logging -> run the supervisor.

use log::error;
use podium_server::{ServiceConfig, Supervisor};
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let port = match parse_port(&args) {
        Ok(port) => port,
        Err(message) => {
            let program = args.first().map(String::as_str).unwrap_or("podium");
            eprintln!("usage: {} <port>", program);
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let config =
        ServiceConfig::new().with_bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));

    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("failed to initialize: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match supervisor.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("service terminated: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_port(args: &[String]) -> Result<u16, String> {
    if args.len() != 2 {
        return Err("exactly one argument expected".to_string());
    }

    args[1]
        .parse::<u16>()
        .map_err(|_| format!("port must be an integer between 0 and {}", u16::MAX))
}
