//! CLI tool for nvsonar

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use nvsonar::sampler::unmatched_indices;
use nvsonar::{
    Analysis, Baseline, Config, DeviceIdentity, Error, MetricsSnapshot, Sampler,
    TelemetryContext,
};

#[derive(Parser)]
#[command(name = "nvsonar")]
#[command(about = "Active GPU diagnostic tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Update interval in seconds (overrides the config file)
    #[arg(short, long, global = true)]
    interval: Option<f64>,

    /// Path to a config file (default: ~/.config/nvsonar/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// GPU indices to monitor, comma separated (default: all)
    #[arg(short, long, value_delimiter = ',', global = true)]
    gpu: Vec<u32>,

    /// Output format for one-shot commands
    #[arg(short, long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Launch the interactive dashboard (default)
    Tui,
    /// List available GPUs and exit
    Info,
    /// Read and classify every GPU once, then exit
    Snapshot,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct SnapshotReport {
    captured_at: String,
    devices: Vec<DeviceReport>,
}

#[derive(Serialize)]
struct DeviceReport {
    index: u32,
    name: String,
    baseline: Option<Baseline>,
    metrics: Option<MetricsSnapshot>,
    analysis: Option<Analysis>,
    error: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => {
            let sampler = Sampler::start(TelemetryContext::nvidia(), config.sampler_config());
            nvsonar::tui::run(sampler)?;
        }
        Commands::Info => {
            let devices = list_devices(&config.devices.monitored)?;
            if cli.format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else {
                print_devices(&devices);
            }
        }
        Commands::Snapshot => {
            let mut sampler = Sampler::start(TelemetryContext::nvidia(), config.sampler_config());
            if sampler.is_empty() {
                return Err(no_devices(
                    sampler.context().is_initialized(),
                    sampler.unmatched_devices(),
                ));
            }
            let report = take_snapshot(&mut sampler);
            if cli.format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_snapshot(&report);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config, Error> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(interval) = cli.interval {
        if !interval.is_finite() || interval <= 0.0 {
            return Err(Error::Config(format!("invalid interval: {}", interval)));
        }
        config.general.update_interval_ms = ((interval * 1000.0).round() as u32).max(1);
    }
    if !cli.gpu.is_empty() {
        config.devices.monitored = cli.gpu.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Identities of the requested devices (all if `requested` is empty)
fn list_devices(requested: &[u32]) -> Result<Vec<DeviceIdentity>, Box<dyn std::error::Error>> {
    let mut context = TelemetryContext::nvidia();
    if !context.initialize() {
        return Err(no_devices(false, &[]));
    }

    let unmatched = unmatched_indices(requested, context.device_count());
    let devices: Vec<DeviceIdentity> = context
        .list_devices()
        .into_iter()
        .filter(|d| requested.is_empty() || requested.contains(&d.index))
        .collect();
    context.shutdown();

    if devices.is_empty() {
        return Err(no_devices(true, &unmatched));
    }
    Ok(devices)
}

/// Error for a one-shot command that found nothing to report on
fn no_devices(library_loaded: bool, unmatched: &[u32]) -> Box<dyn std::error::Error> {
    if !library_loaded {
        return "NVML could not be initialized (is the NVIDIA driver installed?)".into();
    }
    if unmatched.is_empty() {
        return Box::new(Error::NoDevicesFound);
    }
    let indices: Vec<String> = unmatched.iter().map(u32::to_string).collect();
    format!(
        "{} (requested GPU {} not present)",
        Error::NoDevicesFound,
        indices.join(", ")
    )
    .into()
}

fn take_snapshot(sampler: &mut Sampler) -> SnapshotReport {
    let report = sampler.tick_all(Instant::now());

    let devices = sampler
        .sessions()
        .iter()
        .map(|session| {
            let error = report
                .failed
                .iter()
                .find(|(index, _)| *index == session.index())
                .map(|(_, e)| e.to_string());
            let (metrics, analysis) = match (&error, session.current_view()) {
                (None, Some((m, a))) => (Some(m.clone()), Some(*a)),
                _ => (None, None),
            };
            DeviceReport {
                index: session.index(),
                name: session.name().to_string(),
                baseline: session.baseline().copied(),
                metrics,
                analysis,
                error,
            }
        })
        .collect();

    SnapshotReport {
        captured_at: chrono::Local::now().to_rfc3339(),
        devices,
    }
}

fn print_devices(devices: &[DeviceIdentity]) {
    println!("=== Available GPUs ===");
    for device in devices {
        println!("\nGPU {}: {}", device.index, device.name);
        println!("  UUID: {}", device.uuid);
        println!(
            "  Memory: {:.1} GB",
            device.memory_total as f64 / (1024.0 * 1024.0 * 1024.0)
        );
        println!("  Driver: {}", device.driver_version);
        println!("  CUDA: {}", device.cuda_version);
        println!("  PCI Bus: {}", device.pci_bus_id);
    }
}

fn print_snapshot(report: &SnapshotReport) {
    println!("=== GPU Snapshot ({}) ===", report.captured_at);
    for device in &report.devices {
        println!("\nGPU {}: {}", device.index, device.name);

        if let Some(err) = &device.error {
            println!("  Read failed: {}", err);
            continue;
        }
        let (Some(m), Some(a)) = (&device.metrics, &device.analysis) else {
            continue;
        };

        println!("  Status: {} - {}", a, a.bottleneck.explanation());
        println!("  Compute: {}%  Memory: {}%", m.compute_utilization, m.memory_utilization);
        match device.baseline {
            Some(b) => println!(
                "  Temperature: {:.1}°C / {}°C ({:.0}%)",
                m.temperature,
                b.max_temperature,
                b.thermal_percent(m.temperature)
            ),
            None => println!("  Temperature: {:.1}°C", m.temperature),
        }
        match (m.power_draw, m.power_limit) {
            (Some(p), Some(l)) => println!("  Power: {:.1}W / {:.1}W", p, l),
            (Some(p), None) => println!("  Power: {:.1}W", p),
            _ => println!("  Power: N/A"),
        }
        if let Some(fan) = m.fan_speed {
            println!("  Fan Speed: {}%", fan);
        }
        println!(
            "  Memory Used: {:.1} / {:.1} GB",
            m.memory_used as f64 / (1024.0 * 1024.0 * 1024.0),
            m.memory_total as f64 / (1024.0 * 1024.0 * 1024.0)
        );
        println!("  GPU Clock: {} MHz  Memory Clock: {} MHz", m.core_clock, m.memory_clock);
    }
}
