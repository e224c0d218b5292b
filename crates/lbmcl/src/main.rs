//! lbmcl: run a lid-driven cavity from a JSON configuration.
//!
//! Usage:
//!   lbmcl [CONFIG.json]      run (defaults when no file is given)
//!   lbmcl --list-devices     list GPU adapters (`gpu` feature)
//!
//! Log filtering follows `RUST_LOG`.

use orchestrator::{RunReport, SimulationConfig, SimulationError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lbmcl=info,orchestrator=info,kernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--list-devices") {
        list_devices();
        return;
    }

    let config = match arg {
        Some(path) => match SimulationConfig::load(&path) {
            Ok(config) => config,
            Err(e) => fail(&SimulationError::Config(e)),
        },
        None => SimulationConfig::default(),
    };

    println!("{config}\n");

    match orchestrator::run(&config) {
        Ok(report) => print_report(&report),
        Err(e) => fail(&e),
    }
}

fn print_report(report: &RunReport) {
    println!("Device: {}\n", report.device);
    for stats in &report.summary {
        println!(
            "{:>24}: {:8.4} ms ({} x {:.4} ms)",
            stats.operation.as_str(),
            stats.total_ms,
            stats.count,
            stats.mean_ms
        );
    }
    println!();
    println!("{:>24}: {:8.4} ms", "total", report.total_ms);
    println!("{:>24}: {:8.4} ms", "kernels", report.kernels_ms);
    println!("{:>24}: {:8.4}", "MLUPS", report.mlups);
    println!("{:>24}: {:8.4}", "kernels MLUPS", report.kernels_mlups);
}

fn fail(error: &SimulationError) -> ! {
    tracing::error!(
        "{}({}) - {}",
        error.operation(),
        error.exit_code(),
        error.description()
    );
    std::process::exit(error.exit_code());
}

#[cfg(feature = "gpu")]
fn list_devices() {
    let devices = kernel::list_devices();
    if devices.is_empty() {
        println!("No GPU adapters found");
    }
    for line in devices {
        println!("{line}");
    }
}

#[cfg(not(feature = "gpu"))]
fn list_devices() {
    println!("GPU support not compiled in; rebuild with --features gpu");
}
