//! `modem-bridge` command-line entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modem_bridge::push::{self, PushFrame};
use modem_bridge::{exit_on_loss, BridgeConfig, ModemService, MonitorEvent, RemoteCommandChannel, SshTransport};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// SIM and SMS access to a cellular modem behind an SSH-reachable bridge host
#[derive(Parser, Debug)]
#[command(name = "modem-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Bridge host (overrides ssh.host)
    #[arg(long)]
    host: Option<String>,

    /// Login user on the bridge host (overrides ssh.username)
    #[arg(long, short = 'u')]
    user: Option<String>,

    /// SSH port (overrides ssh.port)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Log phone numbers and message bodies
    #[arg(long)]
    sensitive_logs: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show SIM card information
    SimInfo,
    /// List stored messages
    List,
    /// Count stored messages
    Count,
    /// Show the most recent message
    Latest,
    /// Show the message at an index
    Get { index: u32 },
    /// Delete all stored messages
    Clear,
    /// Send a text message
    Send { number: String, content: String },
    /// Print incoming messages as JSON lines until interrupted
    Monitor,
    /// Serve the push protocol over stdin/stdout
    Push,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let transport = Arc::new(SshTransport::new(config.ssh_target()));
    let channel = match RemoteCommandChannel::connect(transport, config.channel_options(), exit_on_loss()).await {
        Ok(channel) => channel,
        Err(e) => {
            error!("Failed to set up shell session: {}", e);
            std::process::exit(1);
        }
    };
    let service = ModemService::new(channel);

    match args.command {
        Cmd::SimInfo => print_json(&service.sim_info().await?)?,
        Cmd::List => print_json(&service.list_messages().await?)?,
        Cmd::Count => print_json(&serde_json::json!({ "count": service.message_count().await? }))?,
        Cmd::Latest => print_json(&service.latest_message().await?)?,
        Cmd::Get { index } => match service.message(index).await? {
            Some(sms) => print_json(&sms)?,
            None => anyhow::bail!("no text message at index {}", index),
        },
        Cmd::Clear => print_json(&serde_json::json!({ "removed": service.clear_messages().await? }))?,
        Cmd::Send { number, content } => {
            service
                .send_message(&number, &content)
                .await
                .context("failed to send SMS")?;
            print_json(&serde_json::json!({ "success": true }))?;
        }
        Cmd::Monitor => monitor(&service).await?,
        Cmd::Push => serve_push(&service, config.push_api_key()).await?,
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => {
            let mut config = BridgeConfig::default();
            config.apply_env();
            config
        }
    };

    if let Some(host) = &args.host {
        config.ssh.host = host.clone();
    }
    if let Some(user) = &args.user {
        config.ssh.username = user.clone();
    }
    if let Some(port) = args.port {
        config.ssh.port = port;
    }
    if args.sensitive_logs {
        config.sensitive_logs = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn monitor(service: &ModemService) -> Result<()> {
    let mut subscription = service.monitor();
    info!("Monitoring incoming SMS, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(MonitorEvent::Sms(sms)) => println!("{}", serde_json::to_string(&sms)?),
                Some(MonitorEvent::Failed(message)) => anyhow::bail!("SMS monitoring error: {}", message),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let state = subscription.close().await;
    info!("Monitor session ended: {:?}", state);
    Ok(())
}

async fn serve_push(service: &ModemService, api_key: Option<String>) -> Result<()> {
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(16);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<PushFrame>();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if inbound_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = outbound_rx.recv().await {
            let mut line = frame.to_json()?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    push::serve(service, api_key, inbound_rx, outbound_tx).await;
    writer.await??;
    Ok(())
}
