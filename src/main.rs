//! PIC Control
//!
//! Host-side tool for a PIC microcontroller board reached over a
//! USB-to-serial (UART) link. It selects the board's logic-gate mode and
//! toggles the onboard LED to confirm the link works.
//!
//! # Usage
//!
//! ```bash
//! # List available serial ports
//! pic-control ports
//!
//! # Switch the board to the OR gate
//! pic-control gate or -p /dev/ttyUSB0
//!
//! # Toggle the LED once and wait for the acknowledgement
//! pic-control led -p COM4
//!
//! # Toggle the LED 10 times, one second apart
//! pic-control blink -p COM4 -n 10 --delay-ms 1000
//!
//! # Print a config file template
//! pic-control generate config
//! ```

mod config;
mod error;
mod protocol;
mod serial;
mod worker;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use config::ControllerConfig;
use protocol::{Gate, LedAck, ReadyState};
use serial::SerialTransport;
use worker::DeviceHandle;

/// PIC Control
///
/// Discover, connect to and command a PIC logic-gate board over USB serial
#[derive(Parser)]
#[command(name = "pic-control")]
#[command(version = "0.1.0")]
#[command(about = "Control a PIC logic-gate board over a USB serial link")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read settings from a TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Select the board's logic gate
    Gate {
        /// Gate to select (and, or)
        gate: Gate,

        #[command(flatten)]
        conn: ConnectArgs,
    },

    /// Toggle the LED once and check the acknowledgement
    Led {
        #[command(flatten)]
        conn: ConnectArgs,
    },

    /// Toggle the LED repeatedly
    Blink {
        #[command(flatten)]
        conn: ConnectArgs,

        /// Number of toggles (overrides config)
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Delay between toggles in milliseconds (overrides config)
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Generate configuration files
    #[command(subcommand)]
    Generate(GenerateCommands),
}

#[derive(Args)]
struct ConnectArgs {
    /// Serial port path (e.g., /dev/ttyUSB0, COM4)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides config, default 9600)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Wait for the firmware's ready byte after connecting
    #[arg(long)]
    wait_ready: bool,
}

#[derive(Subcommand)]
enum GenerateCommands {
    /// Print a config file with the default settings
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = ControllerConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let command = match cli.command {
        Commands::Generate(cmd) => return handle_generate(cmd, &config),
        other => other,
    };

    let transport = SerialTransport::new().with_timeout(config.timeout());
    let (device, thread) = worker::spawn(transport).context("Failed to start device worker")?;

    let result = match command {
        Commands::Ports => {
            serial::print_ports(&device.list_ports().await);
            Ok(())
        }
        Commands::Gate { gate, conn } => handle_gate(&device, &config, &conn, gate).await,
        Commands::Led { conn } => handle_led(&device, &config, &conn).await,
        Commands::Blink {
            conn,
            count,
            delay_ms,
        } => handle_blink(&device, &config, &conn, count, delay_ms).await,
        Commands::Generate(_) => unreachable!("handled before the worker starts"),
    };

    device.shutdown();
    if thread.join().is_err() {
        log::error!("Device worker panicked");
    }

    result
}

/// Connect using CLI arguments, falling back to the config file
async fn open_device(
    device: &DeviceHandle,
    config: &ControllerConfig,
    conn: &ConnectArgs,
) -> Result<()> {
    let port = conn
        .port
        .clone()
        .or_else(|| config.port.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No serial port given. Use -p <PORT> or set 'port' in the config file")
        })?;
    let baud_rate = conn.baud.unwrap_or(config.baud_rate);

    device.connect(&port, baud_rate).await?;

    println!(
        "{} Connected to {} at {} baud",
        "[OK]".green().bold(),
        port.white().bold(),
        baud_rate
    );

    if conn.wait_ready || config.wait_ready {
        match device.await_ready().await {
            ReadyState::Ready => println!("{} PIC is ready", "[OK]".green().bold()),
            ReadyState::Other(b) => println!(
                "{} Unexpected startup byte: 0x{:02X}",
                "[WARNING]".yellow().bold(),
                b
            ),
            ReadyState::Silent => println!(
                "{} No ready signal received",
                "[WARNING]".yellow().bold()
            ),
            ReadyState::NotConnected => anyhow::bail!("Connection lost before ready signal"),
        }
    }

    Ok(())
}

async fn handle_gate(
    device: &DeviceHandle,
    config: &ControllerConfig,
    conn: &ConnectArgs,
    gate: Gate,
) -> Result<()> {
    open_device(device, config, conn).await?;

    println!(
        "{} Selecting {} gate (0x{:02X})",
        "[TX]".cyan().bold(),
        gate,
        gate.command().byte()
    );

    let sent = device.select_gate(gate).await;
    device.disconnect().await;

    if !sent {
        anyhow::bail!("Failed to send {} command", gate);
    }

    // The firmware does not acknowledge gate selection.
    println!("{} {} gate selected", "[OK]".green().bold(), gate);
    Ok(())
}

async fn handle_led(
    device: &DeviceHandle,
    config: &ControllerConfig,
    conn: &ConnectArgs,
) -> Result<()> {
    open_device(device, config, conn).await?;

    println!("{} Toggling LED", "[TX]".cyan().bold());
    let ack = device.toggle_led().await;
    device.disconnect().await;

    print_ack(&ack);
    if !ack.is_acknowledged() {
        anyhow::bail!("LED toggle not acknowledged: {}", ack);
    }
    Ok(())
}

async fn handle_blink(
    device: &DeviceHandle,
    config: &ControllerConfig,
    conn: &ConnectArgs,
    count: Option<u32>,
    delay_ms: Option<u64>,
) -> Result<()> {
    let mut settings = config.blink.clone();
    if let Some(n) = count {
        settings.count = n;
    }
    if let Some(ms) = delay_ms {
        settings.delay_ms = ms;
    }

    open_device(device, config, conn).await?;

    let started = Local::now();
    println!(
        "{} Starting {} LED toggles at {}",
        "[*]".cyan().bold(),
        settings.count,
        started.format("%H:%M:%S%.3f").to_string().dimmed()
    );

    let report = device.blink(settings.count, settings.delay()).await;
    device.disconnect().await;

    for (i, ack) in report.attempts.iter().enumerate() {
        print!("  #{:<3} ", i + 1);
        print_ack(ack);
    }

    let elapsed = Local::now() - started;
    println!("\n{}", "=".repeat(60).dimmed());
    println!(
        "Acknowledged: {}  Failed: {}  Elapsed: {:.1}s",
        report.acknowledged().to_string().green(),
        if report.failed() > 0 {
            report.failed().to_string().red().bold().to_string()
        } else {
            report.failed().to_string().green().to_string()
        },
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!("{}", "=".repeat(60).dimmed());

    if !report.all_acknowledged() {
        anyhow::bail!("{} of {} toggles failed", report.failed(), report.attempts.len());
    }
    Ok(())
}

fn print_ack(ack: &LedAck) {
    match ack {
        LedAck::Acknowledged => println!("{} {}", "[OK]".green().bold(), ack),
        LedAck::Unexpected(_) => println!("{} {}", "[WARNING]".yellow().bold(), ack),
        _ => println!("{} {}", "[ERROR]".red().bold(), ack),
    }
}

fn handle_generate(cmd: GenerateCommands, config: &ControllerConfig) -> Result<()> {
    match cmd {
        GenerateCommands::Config { output } => {
            let text = toml::to_string_pretty(config).context("Failed to render config")?;

            if let Some(path) = output {
                std::fs::write(&path, &text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "{} Config written to {}",
                    "[OK]".green().bold(),
                    path.display()
                );
            } else {
                println!("{}", text);
            }
        }
    }

    Ok(())
}
