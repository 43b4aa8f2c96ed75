use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use smoketest::bus::NamingContext;
use smoketest::{Config, MessagingClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "smoketest",
    about = "Send and receive test messages through a messaging endpoint"
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Endpoint URL for the selected connection factory (e.g. mqtt://localhost:1883)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Seconds to wait for the endpoint to accept the connection
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages, one correlation id per message starting at 1
    Send {
        /// Destination lookup name (or dynamicQueues/<address>)
        #[arg(short, long)]
        address: String,
        #[arg(required = true)]
        messages: Vec<String>,
    },
    /// Block until exactly COUNT messages arrive and print them
    Recv {
        #[arg(short, long)]
        address: String,
        #[arg(short = 'n', long)]
        count: usize,
    },
    /// Start a receiver, send COUNT messages once it is attached, compare
    Roundtrip {
        #[arg(short, long)]
        address: String,
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,
    },
}

#[derive(Serialize)]
struct RoundtripReport {
    address: String,
    sent: usize,
    received: usize,
    in_order: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = load_config(&cli)?;
    let context = config
        .naming_context()
        .context("building lookup context")?;
    let client = MessagingClient::new(context).with_factory_name(&config.connection_factory);

    match cli.command {
        Commands::Send { address, messages } => {
            let sent = client.send_messages_with(&address, messages, &config.send_config())?;
            println!("{}", sent);
        }
        Commands::Recv { address, count } => {
            for message in client.recv_messages_with(&address, count, config.receive_config())? {
                println!("{}", message);
            }
        }
        Commands::Roundtrip { address, count } => {
            let report = roundtrip(&client, &config, &address, count)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.in_order || report.sent != report.received {
                return Err(anyhow!("round trip on {} did not match", address));
            }
        }
    }
    Ok(())
}

fn setup_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smoketest=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(url) = &cli.url {
        config.set_url(url.clone());
    }
    if let Some(secs) = cli.connect_timeout {
        config.connect_timeout_secs = secs;
    }
    Ok(config)
}

fn roundtrip(
    client: &MessagingClient<NamingContext>,
    config: &Config,
    address: &str,
    count: usize,
) -> Result<RoundtripReport> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let receiver = client.clone();
    let receive_config = config.receive_config().on_ready(move || {
        let _ = ready_tx.send(());
    });
    let recv_address = address.to_string();
    let handle =
        thread::spawn(move || receiver.recv_records_with(&recv_address, count, receive_config));

    // A dropped sender means the receiver failed before attaching.
    if ready_rx.recv().is_err() {
        let outcome = handle
            .join()
            .map_err(|_| anyhow!("receiver thread panicked"))?;
        outcome?;
        return Err(anyhow!("receiver stopped before it was ready"));
    }
    info!(address, "receiver attached, sending");

    let bodies: Vec<String> = (1..=count)
        .map(|i| format!("smoketest message {}", i))
        .collect();
    let sent = client.send_messages_with(address, bodies.clone(), &config.send_config())?;

    let received = handle
        .join()
        .map_err(|_| anyhow!("receiver thread panicked"))??;
    let in_order = received
        .iter()
        .map(|m| m.text().unwrap_or_default())
        .eq(bodies.iter().map(String::as_str));

    Ok(RoundtripReport {
        address: address.to_string(),
        sent,
        received: received.len(),
        in_order,
    })
}
