// src/main.rs
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use nirscan::config::ScannerConfig;
use nirscan::console::{self, Input};
use nirscan::engine;
use nirscan::types::{ConnectionMode, ScanCommand, ScanMessage};

#[derive(Parser)]
#[command(name = "nirscan", about = "NIR plastic scanner console")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Serial port of the scanner, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,
    /// Use generated data even if a port is configured
    #[arg(long)]
    synthetic: bool,
    /// Seed for the synthetic device
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    baud: Option<u32>,
}

fn load_config(cli: &Cli) -> Result<ScannerConfig> {
    let mut config = match &cli.config {
        Some(path) => ScannerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ScannerConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.device.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.device.baud_rate = baud;
    }
    if cli.seed.is_some() {
        config.synthetic.seed = cli.seed;
    }
    if cli.synthetic {
        config.device.port = None;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let wants_hardware = config.device.port.is_some();

    let (tx, rx) = mpsc::channel::<ScanMessage>();
    let (tx_cmd, rx_cmd) = mpsc::channel::<ScanCommand>();
    let engine = engine::spawn_thread(config, tx, rx_cmd)?;
    let printer = thread::spawn(move || {
        for msg in rx {
            println!("{}", console::render(&msg));
            if matches!(msg, ScanMessage::Stopped) {
                break;
            }
        }
    });

    if wants_hardware {
        tx_cmd.send(ScanCommand::Connect(ConnectionMode::Hardware)).ok();
    }
    println!("type 'help' for commands");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match console::parse_line(&line) {
            Ok(Input::Command(cmd)) => {
                let quit = matches!(cmd, ScanCommand::Shutdown);
                if tx_cmd.send(cmd).is_err() || quit {
                    break;
                }
            }
            Ok(Input::Help) => println!("{}", console::HELP),
            Ok(Input::Empty) => {}
            Err(err) => println!("❌ {err:#}"),
        }
        io::stdout().flush().ok();
    }
    // also covers end of input
    tx_cmd.send(ScanCommand::Shutdown).ok();
    engine.join().ok();
    printer.join().ok();
    info!("session closed");
    Ok(())
}
