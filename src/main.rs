//! Udptester - UDP device liveness and latency tester
//!
//! Entry point for the command-line probing tool.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use udptester::config::{AppConfig, SessionSettings};
use udptester::csv_log::CsvEventSink;
use udptester_core::{
    EventSink, IdentityPolicy, NullSink, PeriodicConfig, ProbeScheduler, UdpTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("udptester=info".parse().unwrap()),
        )
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!(
        "║             Udptester v{} - UDP Device Monitor            ║",
        udptester_core::VERSION
    );
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments over the persisted config
    let args: Vec<String> = std::env::args().collect();
    let mut config = AppConfig::load();
    let mut once = false;
    let mut save = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("udptester {}", udptester_core::VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--target" | "-t" => {
                config.target = take_value(&args, &mut i, "--target")?;
                continue;
            }
            "--port" | "-p" => {
                let raw = take_value(&args, &mut i, "--port")?;
                config.port = raw
                    .parse()
                    .with_context(|| format!("invalid port: {raw}"))?;
                continue;
            }
            "--interval" | "-i" => {
                let raw = take_value(&args, &mut i, "--interval")?;
                config.interval_ms = raw
                    .parse()
                    .with_context(|| format!("invalid interval: {raw}"))?;
                continue;
            }
            "--count" | "-n" => {
                let raw = take_value(&args, &mut i, "--count")?;
                config.iterations = raw
                    .parse()
                    .with_context(|| format!("invalid count: {raw}"))?;
                continue;
            }
            "--payload" => {
                config.payload = take_value(&args, &mut i, "--payload")?;
                continue;
            }
            "--identity" => {
                let raw = take_value(&args, &mut i, "--identity")?;
                config.identity = match raw.as_str() {
                    "mac" => IdentityPolicy::Mac,
                    "ip" => IdentityPolicy::Ip,
                    other => anyhow::bail!("invalid identity policy: {other} (mac or ip)"),
                };
                continue;
            }
            "--log" => {
                config.log_dir = Some(take_value(&args, &mut i, "--log")?.into());
                continue;
            }
            "--unicast" | "-u" => {
                config.broadcast = false;
            }
            "--once" => {
                once = true;
            }
            "--save" => {
                save = true;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
            _ => {
                // Positional argument - treat as target host
                config.target = args[i].clone();
            }
        }
        i += 1;
    }

    let settings = config.validate().context("invalid configuration")?;
    if save {
        config.save(&AppConfig::path())?;
    }

    run_session(settings, once).await
}

/// Consume the value following a flag, advancing the cursor past both
fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    let value = args
        .get(*i + 1)
        .with_context(|| format!("{flag} requires a value"))?;
    *i += 2;
    Ok(value.clone())
}

fn print_help() {
    println!("Usage: udptester [OPTIONS] [TARGET]");
    println!();
    println!("Options:");
    println!("  -t, --target IP       Probe target (default: 192.168.0.255)");
    println!("  -p, --port PORT       Target UDP port (default: 5000)");
    println!("  -i, --interval MS     Probe interval in ms, 50-1000 (default: 1000)");
    println!("  -n, --count N         Probes to send; 0 = run until Ctrl+C (default: 0)");
    println!("      --payload TEXT    Probe payload text (default: FTEST)");
    println!("      --identity POLICY Device key: mac or ip (default: mac)");
    println!("      --log DIR         Write CSV session logs under DIR");
    println!("  -u, --unicast         Send unicast instead of broadcast");
    println!("      --once            Send a single probe, report, and exit");
    println!("      --save            Persist the effective options as defaults");
    println!("  -v, --version         Show version");
    println!("  -h, --help            Show this help");
    println!();
    println!("Examples:");
    println!("  udptester -t 192.168.0.255 -i 500 -n 100 --log ./logs");
    println!("  udptester --once 10.0.0.42");
}

async fn run_session(settings: SessionSettings, once: bool) -> Result<()> {
    // Echoes come back to the probing port, so bind it rather than an
    // ephemeral one
    let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.target.port());
    let transport = UdpTransport::bind(local)
        .await
        .with_context(|| format!("failed to bind UDP port {}", settings.target.port()))?;

    let csv_sink: Option<Arc<CsvEventSink>> = match &settings.log_dir {
        Some(dir) => Some(Arc::new(CsvEventSink::create(
            dir,
            &settings.target.ip().to_string(),
        )?)),
        None => None,
    };
    let events: Arc<dyn EventSink> = match &csv_sink {
        Some(sink) => Arc::clone(sink) as Arc<dyn EventSink>,
        None => Arc::new(NullSink),
    };

    let scheduler = ProbeScheduler::new(Arc::new(transport), settings.identity, events);
    let listener = scheduler.spawn_listener();

    if once {
        let sequence = scheduler
            .send_once(settings.target, settings.broadcast, &settings.payload)
            .await?;
        info!(sequence, target = %settings.target, "single probe sent");
        // Collect echoes for a short window before reporting
        tokio::time::sleep(Duration::from_secs(2)).await;
    } else {
        scheduler.start_periodic(PeriodicConfig {
            target: settings.target,
            broadcast: settings.broadcast,
            interval: settings.interval,
            payload: settings.payload.clone(),
            iteration_limit: settings.iteration_limit.unwrap_or(0),
            continuous: settings.iteration_limit.is_none(),
        })?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("interrupted, stopping run");
                scheduler.stop_periodic();
            }
            _ = async {
                while scheduler.is_periodic_running() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            } => {}
        }
        scheduler.join_periodic().await;
        // Let in-flight echoes land before the report
        tokio::time::sleep(settings.interval).await;
    }

    listener.shutdown().await;

    let registry = scheduler.registry();
    print_report(&registry.snapshot());
    if let Some(sink) = &csv_sink {
        sink.flush();
        sink.write_summary(&registry)?;
        println!("Session log: {}", sink.path().display());
    }
    Ok(())
}

fn print_report(devices: &[udptester_core::DeviceRecord]) {
    if devices.is_empty() {
        println!("No devices responded.");
        return;
    }
    println!(
        "{:<20} {:<16} {:>10} {:>8} {:>10} {:>6}",
        "DEVICE", "ADDRESS", "LAST RTT", "ERRORS", "MISMATCH", "OVER"
    );
    for d in devices {
        println!(
            "{:<20} {:<16} {:>10} {:>8} {:>10} {:>6}",
            d.identity_key,
            d.secondary_address,
            d.last_response.to_string(),
            d.error_count,
            d.mismatch_count,
            d.over_count,
        );
    }
}
