//! Touch-event IPC bridge for the TouchController game mod
//!
//! The launcher process owns a Unix domain socket; the TouchController mod
//! running inside the game process connects to it. The launcher then forwards
//! live pointer and camera events over a small one-directional binary
//! protocol (one opcode byte plus network-byte-order payload fields per
//! frame).
//!
//! # Usage
//!
//! ```no_run
//! use touchlink_core::server::{BridgeConfig, BridgeServer};
//!
//! let mut server = BridgeServer::new(BridgeConfig::default());
//! server.start().unwrap();
//! server.send_add_pointer(0, 0.5, 0.5);
//! server.stop();
//! ```

pub mod protocol;
pub mod server;
pub mod wire;
