//! Transport server owning the bridge socket
//!
//! The server binds a path-named Unix domain socket and accepts connections
//! from the TouchController mod on a background thread. At most one peer is
//! connected at a time; a new incoming connection replaces the previous one.
//! The send operations encode one frame and write it to the current peer.
//! Delivery is fire and forget: with no peer connected, or when a write
//! fails, the event is dropped and the next one is sent to whoever is
//! connected then.

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::{env, fs, io};

use crossbeam_channel::{Receiver, Sender};
use log::*;
use thiserror::Error;

use crate::protocol::TouchEvent;
use crate::wire;

/// Default socket name, shared with `TOUCH_CONTROLLER_PROXY_SOCKET` in the
/// TouchController mod.
pub const DEFAULT_SOCKET_NAME: &str = "AmethystLauncher";

/// Poll interval of the acceptor loop. Also bounds how long `stop()` waits
/// for the thread to notice the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on a single frame write. Frames are at most 13 bytes, so
/// this only fires if the peer has stalled completely; such a peer is
/// dropped like any other failed write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors surfaced by [`BridgeServer::start`]
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge server is already running")]
    AlreadyRunning,
    #[error("failed to bind bridge socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Bridge server configuration
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Socket name (if None, uses [`DEFAULT_SOCKET_NAME`])
    pub socket_name: Option<String>,
    /// Full socket path override (if None, the name is resolved under
    /// `$XDG_RUNTIME_DIR` or `/tmp`)
    pub socket_path: Option<PathBuf>,
}

impl BridgeConfig {
    /// Returns the socket path to bind
    pub fn socket_path(&self) -> PathBuf {
        if let Some(ref path) = self.socket_path {
            return path.clone();
        }

        let name = self.socket_name.as_deref().unwrap_or(DEFAULT_SOCKET_NAME);
        let filename = format!("{}.sock", name);

        // Try XDG_RUNTIME_DIR first, fall back to /tmp
        if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(runtime_dir).join(&filename)
        } else {
            PathBuf::from("/tmp").join(&filename)
        }
    }
}

/// Connection state notification for the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A peer connected (replacing any previous peer)
    PeerConnected,
    /// The peer disconnected or was dropped after a failed write
    PeerDisconnected,
}

/// Bridge server that forwards touch events to the connected mod
pub struct BridgeServer {
    config: BridgeConfig,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    peer: Arc<Mutex<Option<UnixStream>>>,
    event_tx: Sender<BridgeEvent>,
    event_rx: Receiver<BridgeEvent>,
}

impl BridgeServer {
    /// Creates a new, stopped bridge server
    pub fn new(config: BridgeConfig) -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            accept_thread: None,
            peer: Arc::new(Mutex::new(None)),
            event_tx,
            event_rx,
        }
    }

    /// Returns the receiver for connection state notifications
    pub fn event_receiver(&self) -> Receiver<BridgeEvent> {
        self.event_rx.clone()
    }

    /// Returns the socket path this server binds
    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }

    /// Returns whether a peer is currently connected
    pub fn is_connected(&self) -> bool {
        self.peer.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Binds the socket and spawns the acceptor thread.
    ///
    /// A stale socket file from a previous run is removed before binding.
    /// Starting an already running server is rejected; restart explicitly
    /// with [`stop`](Self::stop) followed by `start`.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.accept_thread.is_some() {
            return Err(BridgeError::AlreadyRunning);
        }

        let socket_path = self.config.socket_path();
        let bind_err = |source| BridgeError::Bind {
            path: socket_path.clone(),
            source,
        };

        // Remove existing socket file if it exists (stale from previous run)
        if socket_path.exists() {
            fs::remove_file(&socket_path).map_err(&bind_err)?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(&bind_err)?;
        listener.set_nonblocking(true).map_err(&bind_err)?;

        info!("bridge listening on {}", socket_path.display());

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let peer = self.peer.clone();
        let event_tx = self.event_tx.clone();

        self.accept_thread = Some(thread::spawn(move || {
            Self::accept_loop(listener, running, peer, event_tx, socket_path);
        }));

        Ok(())
    }

    /// Stops the server: joins the acceptor thread, drops any connected
    /// peer and removes the socket file. No-op when already stopped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
            info!("bridge stopped");
        }

        if let Ok(mut slot) = self.peer.lock() {
            if slot.take().is_some() {
                let _ = self.event_tx.send(BridgeEvent::PeerDisconnected);
            }
        }

        let socket_path = self.config.socket_path();
        if socket_path.exists() {
            let _ = fs::remove_file(&socket_path);
        }
    }

    /// Forwards `AddPointer(index, x, y)`
    pub fn send_add_pointer(&self, index: i32, x: f32, y: f32) -> bool {
        self.send_event(&TouchEvent::AddPointer { index, x, y })
    }

    /// Forwards `RemovePointer(index)`
    pub fn send_remove_pointer(&self, index: i32) -> bool {
        self.send_event(&TouchEvent::RemovePointer { index })
    }

    /// Forwards `ClearPointer()`
    pub fn send_clear_pointer(&self) -> bool {
        self.send_event(&TouchEvent::ClearPointer)
    }

    /// Forwards `MoveView(screen_based, delta_pitch, delta_yaw)`
    pub fn send_move_view(&self, screen_based: bool, delta_pitch: f32, delta_yaw: f32) -> bool {
        self.send_event(&TouchEvent::MoveView {
            screen_based,
            delta_pitch,
            delta_yaw,
        })
    }

    /// Encodes `event` and writes the frame to the connected peer.
    ///
    /// Returns whether the frame was delivered. Never returns an error and
    /// never panics: with no peer this is a no-op, and a failed write drops
    /// the connection and reports `false` while the acceptor keeps
    /// listening for the next one.
    fn send_event(&self, event: &TouchEvent) -> bool {
        let frame = event.encode();

        let Ok(mut slot) = self.peer.lock() else {
            return false;
        };
        let Some(stream) = slot.as_mut() else {
            return false;
        };

        match wire::write_fully(stream, &frame) {
            Ok(()) => true,
            Err(e) => {
                debug!("peer write failed, dropping connection: {}", e);
                *slot = None;
                let _ = self.event_tx.send(BridgeEvent::PeerDisconnected);
                false
            }
        }
    }

    #[allow(clippy::needless_pass_by_value)]
    fn accept_loop(
        listener: UnixListener,
        running: Arc<AtomicBool>,
        peer: Arc<Mutex<Option<UnixStream>>>,
        event_tx: Sender<BridgeEvent>,
        socket_path: PathBuf,
    ) {
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    debug!("peer connected on {}", socket_path.display());
                    if let Err(e) = stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
                        debug!("failed to set write timeout: {}", e);
                    }

                    let Ok(mut slot) = peer.lock() else {
                        break;
                    };
                    // Newest connection wins; dropping the old stream
                    // closes it
                    if slot.replace(stream).is_some() {
                        debug!("replacing existing peer connection");
                        let _ = event_tx.send(BridgeEvent::PeerDisconnected);
                    }
                    drop(slot);
                    let _ = event_tx.send(BridgeEvent::PeerConnected);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("bridge accept error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        // Clean up socket file on exit
        let _ = fs::remove_file(&socket_path);
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ReadOutcome;
    use std::io::Read;
    use std::process;

    fn test_config(tag: &str) -> BridgeConfig {
        let path = env::temp_dir().join(format!(
            "touchlink-test-{}-{}.sock",
            process::id(),
            tag
        ));
        let _ = fs::remove_file(&path);
        BridgeConfig {
            socket_name: None,
            socket_path: Some(path),
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..2000 {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn connect(server: &BridgeServer) -> UnixStream {
        let stream = UnixStream::connect(server.socket_path()).unwrap();
        assert!(
            wait_until(|| server.is_connected()),
            "acceptor did not pick up the connection"
        );
        stream
    }

    #[test]
    fn send_without_peer_is_a_silent_noop() {
        let mut server = BridgeServer::new(test_config("nopeer"));
        server.start().unwrap();

        assert!(!server.is_connected());
        assert!(!server.send_add_pointer(3, 0.5, -1.25));
        assert!(!server.send_clear_pointer());

        server.stop();
    }

    #[test]
    fn connected_peer_receives_exact_frames() {
        let mut server = BridgeServer::new(test_config("frames"));
        server.start().unwrap();
        let mut client = connect(&server);

        assert!(server.send_add_pointer(3, 0.5, -1.25));
        let mut frame = [0_u8; 13];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(
            frame,
            [
                0x00, 0x00, 0x00, 0x00, 0x03, 0x3F, 0x00, 0x00, 0x00, 0xBF, 0xA0, 0x00, 0x00,
            ]
        );

        assert!(server.send_clear_pointer());
        let mut frame = [0_u8; 1];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0x02]);

        server.stop();
    }

    #[test]
    fn frames_decode_on_the_peer_side() {
        let mut server = BridgeServer::new(test_config("decode"));
        server.start().unwrap();
        let mut client = connect(&server);

        assert!(server.send_move_view(true, -90.0, 0.25));
        assert!(server.send_remove_pointer(7));
        server.stop();

        assert_eq!(
            TouchEvent::read_from(&mut client).unwrap(),
            Some(TouchEvent::MoveView {
                screen_based: true,
                delta_pitch: -90.0,
                delta_yaw: 0.25,
            })
        );
        assert_eq!(
            TouchEvent::read_from(&mut client).unwrap(),
            Some(TouchEvent::RemovePointer { index: 7 })
        );
        // Server stopped, so the stream ends cleanly at a frame boundary
        assert_eq!(TouchEvent::read_from(&mut client).unwrap(), None);
    }

    #[test]
    fn newest_connection_wins() {
        let mut server = BridgeServer::new(test_config("replace"));
        server.start().unwrap();

        let mut first = connect(&server);
        first
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut second = UnixStream::connect(server.socket_path()).unwrap();

        // The first stream is closed when the acceptor installs the second
        let mut buf = [0_u8; 1];
        assert!(
            wait_until(|| matches!(
                wire::read_fully(&mut first, &mut buf),
                Ok(ReadOutcome::Eof)
            )),
            "first connection was not closed on replacement"
        );

        assert!(server.send_remove_pointer(1));
        let mut frame = [0_u8; 5];
        second.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0x01, 0x00, 0x00, 0x00, 0x01]);

        server.stop();
    }

    #[test]
    fn peer_disconnect_recovers_to_listening() {
        let mut server = BridgeServer::new(test_config("recover"));
        server.start().unwrap();

        let client = connect(&server);
        drop(client);

        // The first write after the hangup may still land in the kernel
        // buffer; keep sending until the broken pipe is observed
        assert!(
            wait_until(|| !server.send_clear_pointer()),
            "write to hung-up peer never failed"
        );
        assert!(!server.is_connected());

        // The acceptor is still running and takes a fresh connection
        let mut replacement = connect(&server);
        assert!(server.send_clear_pointer());
        let mut frame = [0_u8; 1];
        replacement.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0x02]);

        server.stop();
    }

    #[test]
    fn stop_then_restart_rebinds_same_path() {
        let mut server = BridgeServer::new(test_config("restart"));
        server.start().unwrap();
        let client = connect(&server);
        drop(client);

        server.stop();
        assert!(!server.socket_path().exists());

        server.start().unwrap();
        let mut client = connect(&server);
        assert!(server.send_clear_pointer());
        let mut frame = [0_u8; 1];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0x02]);

        server.stop();
    }

    #[test]
    fn double_start_is_rejected() {
        let mut server = BridgeServer::new(test_config("dblstart"));
        server.start().unwrap();
        assert!(matches!(server.start(), Err(BridgeError::AlreadyRunning)));
        server.stop();
    }

    #[test]
    fn stop_when_stopped_is_a_noop() {
        let mut server = BridgeServer::new(test_config("dblstop"));
        server.stop();
        server.start().unwrap();
        server.stop();
        server.stop();
    }

    #[test]
    fn connection_events_are_reported() {
        let mut server = BridgeServer::new(test_config("events"));
        let events = server.event_receiver();
        server.start().unwrap();

        let client = connect(&server);
        assert_eq!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            BridgeEvent::PeerConnected
        );

        drop(client);
        assert!(wait_until(|| !server.send_clear_pointer()));
        assert_eq!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            BridgeEvent::PeerDisconnected
        );

        server.stop();
    }

    #[test]
    fn default_socket_name_resolves() {
        let config = BridgeConfig::default();
        let path = config.socket_path();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("{}.sock", DEFAULT_SOCKET_NAME)
        );

        let named = BridgeConfig {
            socket_name: Some("CustomBridge".to_string()),
            socket_path: None,
        };
        assert_eq!(
            named.socket_path().file_name().unwrap().to_str().unwrap(),
            "CustomBridge.sock"
        );
    }
}
