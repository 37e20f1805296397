//! Cookie daemon binary
//!
//! Serves the cookie jar to webctl instances over a seqpacket socket.

use anyhow::Result;
use std::env;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;
use webctl::daemon::config::{CookieDaemonConfig, DaemonCommand};
use webctl::daemon::CookieDaemon;

fn main() -> Result<()> {
    let config = match CookieDaemonConfig::from_args(env::args().skip(1)) {
        Ok(DaemonCommand::Run(config)) => config,
        Ok(DaemonCommand::Help) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            process::exit(1);
        }
    };

    let default = if config.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WEBCTL_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    if config.socket_path.exists() && daemon_running(&config.socket_path) {
        eprintln!(
            "Error: a cookie daemon is already running at {}",
            config.socket_path.display()
        );
        process::exit(1);
    }

    let mut daemon = CookieDaemon::new(config)?;
    eprintln!("Cookie daemon listening on {}", daemon.socket_path().display());
    daemon.start()?;
    Ok(())
}

/// Whether something accepts connections on `path`
fn daemon_running(path: &Path) -> bool {
    use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};

    let Ok(fd) = socket(AddressFamily::Unix, SockType::SeqPacket, SockFlag::SOCK_CLOEXEC, None)
    else {
        return false;
    };
    UnixAddr::new(path)
        .and_then(|addr| connect(fd.as_raw_fd(), &addr))
        .is_ok()
}

fn print_usage() {
    println!("webctl-cookied {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: webctl-cookied [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -s, --socket PATH   Socket to listen on");
    println!("  -f, --file PATH     Load and save cookies as JSON in PATH");
    println!("  -v, --verbose       Log every request");
    println!("  -h, --help          Show this help message");
}
