use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use threadfin_mock_server::{MockConfig, MockServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:34400";

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("THREADFIN_MOCK_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);

    let config = MockConfig {
        initial_token: parse_arg_value(&args, "--token"),
        start_in_wizard: args.iter().any(|a| a == "--wizard"),
        beta: args.iter().any(|a| a == "--beta"),
        ..MockConfig::default()
    };

    let server = match MockServer::spawn_with_addr(&addr, config) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        let _ = fs::write(path, server.listen_addr().to_string());
    }

    info!("mock_server listening on ws://{}/ws/", server.listen_addr());

    let start = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(50));
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    server.shutdown();
}
