use clap::Parser;
use colored::Colorize;
use domebus::plant::{MockPlant, PlantOptions};

/// Standalone mock dome controller speaking the line-JSON protocol.
#[derive(Parser)]
#[command(name = "domebus-plant", version, about = "Mock dome controller (TCP server)")]
struct Args {
    /// Port to listen on; 0 picks an ephemeral port.
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Emit the legacy flat thermal telemetry schema.
    #[arg(long)]
    legacy_thermal_schema: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let options = PlantOptions {
        communication_error: false,
        legacy_thermal_schema: args.legacy_thermal_schema,
    };
    let plant = MockPlant::start(args.port, options).await?;

    println!("{}", "Mock Dome Controller".bold());
    println!("====================");
    println!(
        "Listening on {} (one client at a time)",
        format!("127.0.0.1:{}", plant.port()).green()
    );
    println!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    plant.stop().await;
    println!("{}", "Mock dome controller stopped".yellow());
    Ok(())
}
