//! Threadfin-compatible `/ws/` endpoint for exercising the control panel
//! without a running streaming proxy.

mod backend;
mod net;
mod protocol;

pub use crate::backend::{MockBackend, MockConfig, MENU, WIZARD_STEPS};
pub use crate::net::NetworkThread;
pub use crate::protocol::{InboundMsg, OutboundMsg, INBOUND_CAP, OUTBOUND_CAP};

use crossbeam_channel::bounded;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const BACKEND_TICK: Duration = Duration::from_millis(2);

/// Network thread plus a backend thread ticking the request handler.
pub struct MockServer {
    net: NetworkThread,
    shutdown: Arc<AtomicBool>,
    backend: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    pub fn spawn_with_addr(addr: &str, config: MockConfig) -> Result<Self, String> {
        let (in_tx, in_rx) = bounded(INBOUND_CAP);
        let (out_tx, out_rx) = bounded(OUTBOUND_CAP);

        let net = NetworkThread::spawn_with_addr(addr, in_tx, out_rx)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let backend = thread::spawn(move || {
            let mut backend = MockBackend::new(in_rx, out_tx, config);
            while !shutdown_for_thread.load(Ordering::Relaxed) {
                backend.tick();
                thread::sleep(BACKEND_TICK);
            }
        });

        Ok(Self {
            net,
            shutdown,
            backend: Mutex::new(Some(backend)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.net.listen_addr()
    }

    /// Base URL of the page the panel would be served from.
    pub fn page_url(&self) -> String {
        format!("http://{}/web/", self.listen_addr())
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.net.shutdown();
        if let Ok(mut h) = self.backend.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
