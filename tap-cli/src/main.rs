//! TouchLink tap
//!
//! Connects to a TouchLink bridge socket in place of the TouchController
//! mod and prints every decoded frame. Useful for verifying launcher-side
//! input handling without a running game.

use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use touchlink_core::protocol::TouchEvent;
use touchlink_core::server::BridgeConfig;

#[derive(Parser)]
#[command(name = "touchlink-tap")]
#[command(about = "Prints decoded events from a TouchLink bridge socket", long_about = None)]
#[command(after_help = r#"EXAMPLES:
    touchlink-tap                            Tap the default bridge socket
    touchlink-tap -n MyLauncher              Tap the "MyLauncher" socket
    touchlink-tap -s /tmp/bridge.sock        Tap an explicit socket path
    touchlink-tap --json                     Output events as JSON lines
"#)]
struct Cli {
    /// Socket name, resolved under $XDG_RUNTIME_DIR or /tmp
    /// (default: AmethystLauncher)
    #[arg(short = 'n', long)]
    socket_name: Option<String>,

    /// Full socket path (overrides --socket-name)
    #[arg(short = 's', long)]
    socket_path: Option<PathBuf>,

    /// Output events as JSON lines
    #[arg(short, long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = BridgeConfig {
        socket_name: cli.socket_name,
        socket_path: cli.socket_path,
    }
    .socket_path();

    let mut stream = UnixStream::connect(&path)
        .with_context(|| format!("Failed to connect to bridge socket: {}", path.display()))?;
    eprintln!("Connected to {}", path.display());

    loop {
        let event = TouchEvent::read_from(&mut stream).context("Failed to read frame")?;
        match event {
            Some(event) if cli.json => println!("{}", serde_json::to_string(&event)?),
            Some(event) => print_event(&event),
            None => {
                eprintln!("Bridge closed the connection");
                return Ok(());
            }
        }
    }
}

fn print_event(event: &TouchEvent) {
    match *event {
        TouchEvent::AddPointer { index, x, y } => {
            println!("AddPointer    index={} x={} y={}", index, x, y);
        }
        TouchEvent::RemovePointer { index } => {
            println!("RemovePointer index={}", index);
        }
        TouchEvent::ClearPointer => println!("ClearPointer"),
        TouchEvent::MoveView {
            screen_based,
            delta_pitch,
            delta_yaw,
        } => {
            println!(
                "MoveView      screen_based={} delta_pitch={} delta_yaw={}",
                screen_based, delta_pitch, delta_yaw
            );
        }
    }
}
