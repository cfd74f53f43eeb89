// Electrometer CLI - Node, gateway and development backend
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Electrometer CLI
//!
//! Runs one device role of the electrometer telemetry stack.
//!
//! ## Usage
//!
//! ```bash
//! # Local backend on port 8080
//! electrometer-cli backend --port 8080
//!
//! # Gateway relaying to it over plain HTTP
//! electrometer-cli --config gateway.toml gateway
//!
//! # Node with a simulated 0.5 A load, 3 transmissions
//! ELECTROMETER_KEY=secret electrometer-cli --config node.toml node --current 0.5 --cycles 3
//! ```

mod backend;
mod config;
mod sim;
mod udp_radio;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use electrometer::{FixedVoltage, HttpClient, LinearCalibration, LinearCurrent, SystemClock};
use electrometer_station::{GatewaySession, NodeSession};
use sim::SimulatedClamp;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use udp_radio::UdpRadio;

/// Electrometer telemetry node and gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "electrometer.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Sample the sensors and transmit telemetry
    Node {
        /// Number of transmissions (runs forever if omitted)
        #[arg(long)]
        cycles: Option<u64>,

        /// Simulated load in amps
        #[arg(long, default_value = "0.5")]
        current: f64,

        /// Simulated ADC noise in counts
        #[arg(long, default_value = "2.0")]
        noise: f64,

        /// Seed for the simulated sensor
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Receive telemetry and relay it to the backend
    Gateway {
        /// Number of receive cycles (runs forever if omitted)
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Serve a local development backend
    Backend {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config)?;

    init_tracing(args.log_level.as_deref(), &config);
    info!("Electrometer v{}", env!("CARGO_PKG_VERSION"));
    if config.key_from_env {
        info!("Using {} from environment", config::KEY_ENV);
    }
    if !args.config.exists() {
        warn!(
            "Config file {} not found, using defaults",
            args.config.display()
        );
    }

    match args.role {
        Role::Node {
            cycles,
            current,
            noise,
            seed,
        } => run_node(&config, cycles, current, noise, seed),
        Role::Gateway { cycles } => run_gateway(&config, cycles),
        Role::Backend { port } => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(backend::serve(addr))
        }
    }
}

fn init_tracing(cli_level: Option<&str>, config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level_name = cli_level.unwrap_or(&config.logging.level);
        let level = match level_name.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        let mut filter = EnvFilter::from_default_env().add_directive(level.into());
        for directive in config.verbose_directives() {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("ignoring log directive {directive}: {e}"),
            }
        }
        filter
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_radio(config: &AppConfig) -> Result<UdpRadio> {
    let bind: SocketAddr = config.radio.bind.parse()?;
    let peer: SocketAddr = config.radio.peer.parse()?;
    Ok(UdpRadio::open(bind, peer, config.band()?)?)
}

fn run_node(
    config: &AppConfig,
    cycles: Option<u64>,
    amps: f64,
    noise: f64,
    seed: Option<u64>,
) -> Result<()> {
    let node_config = config.node_config()?;
    let calibration = LinearCalibration::default();
    let clamp = SimulatedClamp::for_current(amps, &calibration, noise, seed)?;
    let current = LinearCurrent::new(clamp, calibration, node_config.window.sample_interval);
    let voltage = FixedVoltage::new(config.node.mains_voltage);

    let mut node = NodeSession::new(
        node_config,
        open_radio(config)?,
        SystemClock::new(),
        current,
        voltage,
    )?;

    match cycles {
        Some(n) => {
            let stats = node.run(n);
            info!(
                "node done: {} cycles, {} encrypted, {} plaintext, {} failed",
                stats.cycles, stats.sent_encrypted, stats.sent_plaintext, stats.failures
            );
            Ok(())
        }
        None => node.run_forever(),
    }
}

fn relay_client(config: &AppConfig) -> Box<dyn HttpClient> {
    #[cfg(feature = "tls")]
    if config.gateway.tls {
        return Box::new(electrometer::TlsHttpClient::new().with_port(config.gateway.relay_port));
    }
    #[cfg(not(feature = "tls"))]
    if config.gateway.tls {
        warn!("TLS support not compiled in, relaying over plain HTTP");
    }
    Box::new(electrometer::TcpHttpClient::new(config.gateway.relay_port))
}

fn run_gateway(config: &AppConfig, cycles: Option<u64>) -> Result<()> {
    let gateway_config = config.gateway_config()?;
    let mut gateway = GatewaySession::new(gateway_config, open_radio(config)?, relay_client(config))?;

    match cycles {
        Some(n) => {
            let stats = gateway.run(n);
            info!(
                "gateway done: {} received, {} relayed, {} dropped, {} malformed, {} idle",
                stats.received, stats.relayed, stats.dropped, stats.malformed, stats.idle
            );
            Ok(())
        }
        None => gateway.run_forever(),
    }
}
