use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use htpc_core::prelude::*;
use serde_json::Value;
use xbmc_rpc::{XbmcConfig, XbmcRpc};

/// Query and drive an XBMC/Kodi instance over JSON-RPC
#[derive(Parser, Debug)]
#[command(name = "xbmc")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address of the XBMC instance
    #[arg(long, default_value = "192.168.1.120")]
    ip: String,

    /// Web server port serving the schema
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// JSON-RPC TCP port
    #[arg(long, default_value_t = 9090)]
    tcp_port: u16,

    /// Reply timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Log level (debug, info, warning, error, critical)
    #[arg(long, default_value = "INFO")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Check that the instance answers
    Ping,
    /// Print the JSON-RPC protocol version
    Version,
    /// List available methods
    Methods {
        /// Only methods in this namespace, e.g. `Player`
        #[arg(long)]
        namespace: Option<String>,
    },
    /// List published notifications
    Notifications {
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Describe a method or notification
    Info {
        name: String,
        /// Also print the parameter and return schemas
        #[arg(short, long)]
        verbose: bool,
    },
    /// Execute a method
    Call {
        method: String,
        /// Parameters as a JSON object
        params: Option<String>,
        /// Return as soon as the request is written
        #[arg(long)]
        no_wait: bool,
    },
    /// Print notifications until interrupted
    Listen {
        /// Notifications to listen for; all published ones when empty
        names: Vec<String>,
    },
}

impl Args {
    fn config(&self) -> XbmcConfig {
        XbmcConfig::new(self.ip.clone())
            .with_ports(self.http_port, self.tcp_port)
            .with_request_timeout(Duration::from_secs(self.timeout))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    htpc_core::logging::init_with_level(&args.log_level)
        .context("Failed to initialize logging")?;

    let xbmc = XbmcRpc::new(args.ip.clone(), args.config())
        .with_context(|| format!("Failed to discover XBMC at {}", args.ip))?;

    match args.command {
        Command::Methods { namespace } => print_names(xbmc.available_methods(), namespace.as_deref()),
        Command::Notifications { namespace } => {
            print_names(xbmc.available_notifications(), namespace.as_deref())
        }
        Command::Info { name, verbose } => print_info(&xbmc, &name, verbose)?,
        Command::Ping => {
            let running = htpc_core::run(&xbmc)?;
            let reply = running.try_execute("JSONRPC.Ping", Value::Null, true)?;
            println!("{}", reply.unwrap_or(Value::Null));
        }
        Command::Version => {
            let running = htpc_core::run(&xbmc)?;
            let reply = running.try_execute("JSONRPC.Version", Value::Null, true)?;
            print_json(&reply.unwrap_or(Value::Null))?;
        }
        Command::Call {
            method,
            params,
            no_wait,
        } => {
            let params = parse_params(params.as_deref())?;
            let running = htpc_core::run(&xbmc)?;
            match running.try_execute(&method, params, !no_wait)? {
                Some(reply) => print_json(&reply)?,
                None => println!("Sent {}", method),
            }
        }
        Command::Listen { names } => listen(&xbmc, names)?,
    }

    Ok(())
}

fn print_names(names: Vec<String>, namespace: Option<&str>) {
    let prefix = namespace.map(|ns| format!("{}.", ns));
    for name in names {
        if prefix.as_deref().map_or(true, |p| name.starts_with(p)) {
            println!("{}", name);
        }
    }
}

fn print_info(xbmc: &XbmcRpc, name: &str, verbose: bool) -> Result<()> {
    if let Some(info) = xbmc.methods().get(name) {
        println!("Description: {}", info.description);
        if verbose {
            println!("Parameters:");
            print_json(&info.params)?;
            println!("Returns:");
            print_json(&info.returns)?;
        }
    } else if let Some(info) = xbmc.notification_descriptor(name) {
        println!("Description: {}", info.description);
        if verbose {
            println!("Parameters:");
            print_json(&info.params)?;
        }
    } else {
        bail!("{} is neither a method nor a notification of {}", name, xbmc.name());
    }
    Ok(())
}

fn listen(xbmc: &XbmcRpc, names: Vec<String>) -> Result<()> {
    let names = if names.is_empty() {
        xbmc.available_notifications()
    } else {
        names
    };
    for name in &names {
        xbmc.subscribe(
            name,
            callback(|publisher, value| {
                println!("[{}] {}", publisher.name(), value);
                Ok(())
            }),
        )?;
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let running = htpc_core::run(xbmc)?;
    tracing::info!("Listening for {} notifications, Ctrl+C to stop", names.len());

    loop {
        match stop_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) if !running.is_connected() => {
                bail!("Connection to {} closed", running.name())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }
    Ok(())
}

/// Missing parameters mean an empty object
fn parse_params(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let params: Value = serde_json::from_str(raw).context("Parameters are not valid JSON")?;
    if !params.is_object() {
        bail!("Parameters must be a JSON object, got {}", params);
    }
    Ok(params)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
