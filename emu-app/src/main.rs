// hpsdr-emu -- network-level OpenHPSDR radio emulator.
//
// Presents a Protocol 1 (Metis) or Protocol 2 (Ethernet) HPSDR transceiver
// on the LAN so SDR host applications can discover it, tune it, and stream
// synthetic IQ from it without any hardware attached.
//
// Usage:
//   hpsdr-emu --protocol 1 --radio hermeslite
//   hpsdr-emu --protocol 2 --radio orionmkii --freq 700 --noise 1e-5
//   hpsdr-emu --protocol 1 --radio hermes --mac 00:1c:c0:a2:22:5e --echo -v

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hpsdremu_core::config::{format_mac, parse_mac, random_mac, RadioConfig};
use hpsdremu_core::{HardwareKind, RadioState};
use hpsdremu_protocol1::Protocol1Server;
use hpsdremu_protocol2::{PortPlan, Protocol2Server};

/// OpenHPSDR Protocol 1 & 2 radio emulator.
#[derive(Parser)]
#[command(name = "hpsdr-emu", version, about)]
struct Cli {
    /// Protocol generation to emulate: 1 (legacy/Metis) or 2 (Ethernet).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    protocol: u8,

    /// Radio hardware type (atlas, hermes, hermesii, angelia, orion,
    /// orionmkii, hermeslite, saturn, saturnmkii).
    #[arg(long, default_value = "hermeslite")]
    radio: HardwareKind,

    /// MAC address (hex, e.g. 00:1c:c0:a2:22:5e). Random if omitted.
    #[arg(long)]
    mac: Option<String>,

    /// Test tone offset from the DDC center in Hz.
    #[arg(long, default_value_t = 1000.0)]
    freq: f64,

    /// Noise level as a fraction of full scale.
    #[arg(long, default_value_t = 3e-6)]
    noise: f64,

    /// Echo mode: record TX IQ during PTT and replay it on RX.
    #[arg(long)]
    echo: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(v) => EnvFilter::new(v),
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves when the process is asked to stop (ctrl-c, or SIGTERM on unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let hw = cli.radio;
    match cli.protocol {
        1 if !hw.supports_protocol1() => bail!("{hw} does not speak protocol 1"),
        2 if !hw.supports_protocol2() => bail!("{hw} does not speak protocol 2"),
        _ => {}
    }

    let mac = match &cli.mac {
        Some(s) => parse_mac(s).context("parse --mac")?,
        None => random_mac(),
    };

    let mut config = RadioConfig::new(hw, mac);
    config.tone_hz = cli.freq;
    config.noise_level = cli.noise;
    config.echo_enabled = cli.echo;

    // Protocol 1 hosts expect the legacy 48 kHz default; Protocol 2 hosts
    // negotiate from 192 kHz.
    let sample_rate = if cli.protocol == 1 { 48_000 } else { 192_000 };
    let state = Arc::new(RadioState::new(hw, sample_rate));

    tracing::info!(
        protocol = cli.protocol,
        radio = %hw,
        mac = %format_mac(&mac),
        tone_hz = cli.freq,
        noise = cli.noise,
        echo = cli.echo,
        "starting emulator"
    );

    if cli.protocol == 1 {
        let addr = format!("0.0.0.0:{}", hpsdremu_protocol1::frame::DEFAULT_PORT);
        let server = Protocol1Server::bind(config, state, &addr).await?;
        tokio::select! {
            result = server.run() => result?,
            _ = shutdown_signal() => {}
        }
    } else {
        let server = Protocol2Server::bind(config, state, "0.0.0.0", PortPlan::default()).await?;
        tokio::select! {
            result = server.run() => result?,
            _ = shutdown_signal() => {}
        }
    }

    Ok(())
}
