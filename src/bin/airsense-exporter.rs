use airsense_rs::ble::BlueZScanner;
use airsense_rs::collector::registry::{co2_metric_id, temperature_metric_id};
use airsense_rs::collector::{BleListener, MetricRegistry, Poller, TelemetryServer};
use airsense_rs::zg01::{self, Zg01Sensor};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "airsense-exporter")]
#[command(about = "Export CO2 and BLE environment sensor readings over HTTP")]
struct Args {
    /// Bind address for the telemetry endpoint
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Bind port for the telemetry endpoint
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// CO2 polling interval in seconds (minimum 1)
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// CO2 sensor serial port
    #[arg(long, default_value = "/dev/ttyUSB0")]
    serial_port: String,

    /// CO2 sensor baud rate
    #[arg(long, default_value_t = zg01::DEFAULT_BAUD_RATE)]
    serial_baud: u32,

    /// Bluetooth adapter name
    #[arg(long, default_value = "hci0")]
    adapter: String,

    /// Disable the BLE listener (serve CO2 gauges only)
    #[arg(long)]
    disable_ble: bool,

    /// Disable the CO2 poller (serve BLE gauges only)
    #[arg(long)]
    disable_co2: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let poll_interval = Duration::from_secs(args.poll_interval.max(1));

    let cancel = CancellationToken::new();

    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        cancel_signal.cancel();
    });

    let registry = MetricRegistry::new();
    registry.register(co2_metric_id());
    registry.register(temperature_metric_id());

    let sensor = if args.disable_co2 {
        None
    } else {
        tracing::info!(
            "Opening {} at {} baud...",
            args.serial_port,
            args.serial_baud
        );
        Some(Zg01Sensor::open(&args.serial_port, args.serial_baud)?)
    };

    let mut listener = if args.disable_ble {
        None
    } else {
        let scanner = BlueZScanner::new(&args.adapter).await?;
        let mut listener = BleListener::new(scanner, registry.clone());
        listener.start().await?;
        tracing::info!("BLE listener scanning on {}", args.adapter);
        Some(listener)
    };

    let addr = SocketAddr::new(args.host, args.port);
    let server = TelemetryServer::new(registry.clone(), addr, cancel.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("Telemetry server error: {}", e);
        }
    });

    match sensor {
        Some(sensor) => {
            Poller::new(sensor, registry.clone(), poll_interval, cancel.clone())
                .run()
                .await;
        }
        None => cancel.cancelled().await,
    }

    if let Some(listener) = listener.as_mut() {
        match listener.stop().await {
            Ok(()) => tracing::info!("BLE listener stopped"),
            Err(e) => tracing::warn!("BLE listener stop failed: {}", e),
        }
    }
    server_handle.await.ok();

    tracing::info!("Shutdown complete");
    Ok(())
}
