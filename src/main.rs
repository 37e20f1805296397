#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webctl::config::{self, Action, ConfigSource, Options, DEFAULT_CONFIG};
use webctl::daemon;
use webctl::ipc;
use webctl::runtime::Runtime;
use webctl::signal::{SignalAction, SignalHandler};

/// Log filter variable; overrides the verbosity flags
const LOG_ENV: &str = "WEBCTL_LOG";

fn main() {
    let action = match config::parse_args(env::args().skip(1)) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("webctl: {}", e);
            eprintln!("Try 'webctl --help' for more information.");
            process::exit(2);
        }
    };

    let options = match action {
        Action::Help => {
            println!("{}", config::usage());
            return;
        }
        Action::Version => {
            println!("webctl {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Action::Run(options) => options,
    };

    init_logging(options.verbose);

    match run(options) {
        Ok(code) => process::exit(code),
        Err(e) => {
            tracing::error!(event = "startup_failed", error = %format!("{:#}", e));
            eprintln!("webctl: {:#}", e);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(options: Options) -> Result<i32> {
    let mut builder = Runtime::builder().cookie_socket(daemon::config::default_socket_path());
    if let Some(name) = &options.name {
        builder = builder.name(name.clone());
    }
    let rt = builder.build();
    tracing::info!(event = "instance_starting", name = %rt.name(), pid = rt.pid());

    let config_path = options.config_path();
    let _signals = {
        let rt = Arc::clone(&rt);
        let config_path = config_path.clone();
        SignalHandler::setup(move |action| match action {
            SignalAction::Exit(code) => rt.request_exit(code),
            SignalAction::Reload => {
                if let Some(path) = &config_path {
                    if let Err(e) = run_config_file(&rt, path) {
                        tracing::warn!(event = "config_reload_failed", error = %format!("{:#}", e));
                    }
                }
            }
        })?
    };

    if options.print_events {
        rt.set_variable("print_events", "1");
    }
    if options.verbose {
        rt.set_variable("verbose", "1");
    }
    let connected = ipc::connect_all(&rt, &options.connect_sockets);
    tracing::debug!(event = "connect_sockets", connected, requested = options.connect_sockets.len());

    rt.start();

    rt.execute_script(DEFAULT_CONFIG);
    match &options.config {
        ConfigSource::Stdin => {
            ipc::spawn_stdin(&rt).context("cannot read commands from stdin")?;
        }
        ConfigSource::File(_) | ConfigSource::Default => {
            if let Some(path) = &config_path {
                run_config_file(&rt, path)?;
            }
        }
    }

    if let Some(uri) = &options.uri {
        rt.set_variable("uri", uri);
    }

    let code = rt.wait_for_exit();
    tracing::info!(event = "instance_exiting", code);
    rt.shutdown();
    Ok(code)
}

fn run_config_file(rt: &Runtime, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    rt.execute_script(&text);
    tracing::debug!(event = "config_loaded", path = %path.display());
    Ok(())
}
