use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Map, Value};
use tokio::io::BufReader;
use tokio::net::TcpStream;

use domebus::constants::DOME_AZIMUTH_OFFSET;
use domebus::framing::{read_frame, write_frame};
use domebus::protocol::LlcName;

/// One-shot command client for a running dome controller.
#[derive(Parser)]
#[command(name = "domebus", version, about = "Dome controller command client")]
struct Args {
    /// Controller host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Controller port.
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    #[command(subcommand)]
    command: Cli,
}

#[derive(Subcommand)]
enum Cli {
    /// Request one subsystem status snapshot.
    Status {
        /// Subsystem wire name, e.g. AMCS, ApSCS, LWSCS.
        llc: String,
    },
    /// Move the dome to a sky azimuth [deg], crawling at a velocity
    /// [deg/s] afterwards.
    MoveAz { position: f64, velocity: f64 },
    /// Stop azimuth motion.
    StopAz,
    /// Park the dome.
    Park,
    /// Open the aperture shutters.
    OpenShutter,
    /// Close the aperture shutters.
    CloseShutter,
}

impl Cli {
    fn into_frame(self) -> Result<(String, Map<String, Value>), String> {
        let mut params = Map::new();
        let name = match self {
            Cli::Status { llc } => {
                let llc: LlcName = serde_json::from_value(Value::String(llc.clone()))
                    .map_err(|_| format!("unknown subsystem {llc:?}"))?;
                return Ok((llc.status_command().as_wire_name().to_string(), params));
            }
            Cli::MoveAz { position, velocity } => {
                let dome_position = (position + DOME_AZIMUTH_OFFSET).rem_euclid(360.0);
                params.insert("position".into(), json!(dome_position.to_radians()));
                params.insert("velocity".into(), json!(velocity.to_radians()));
                "moveAz"
            }
            Cli::StopAz => "stopAz",
            Cli::Park => "park",
            Cli::OpenShutter => "openShutter",
            Cli::CloseShutter => "closeShutter",
        };
        Ok((name.to_string(), params))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let (command, params) = args.command.into_frame().map_err(|e| {
        eprintln!("{}", e.red());
        e
    })?;
    let frame = json!({
        "commandId": 1,
        "command": command,
        "parameters": params,
    });

    let stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_frame(&mut write_half, &frame).await?;
    match read_frame(&mut reader).await? {
        Some(reply) => println!("{}", serde_json::to_string_pretty(&reply)?),
        None => eprintln!("{}", "connection closed without a reply".red()),
    }
    Ok(())
}
