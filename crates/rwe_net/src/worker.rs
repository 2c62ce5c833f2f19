//! Background network thread.
//!
//! Each service runs its socket loop on a dedicated thread with a
//! single-threaded tokio runtime. Stopping fires a oneshot the loop selects
//! on, then joins; anything still queued for sending is discarded.

use std::future::Future;
use std::net::UdpSocket as StdUdpSocket;
use std::thread::JoinHandle;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::Result;

/// Largest payload of a single UDP datagram.
pub(crate) const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A running network thread.
#[derive(Debug)]
pub(crate) struct Worker {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Run `body` on a new thread over `socket`.
    pub(crate) fn spawn<F, Fut>(name: &str, socket: StdUdpSocket, body: F) -> Result<Self>
    where
        F: FnOnce(UdpSocket, oneshot::Receiver<()>) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        socket.set_nonblocking(true)?;
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let (shutdown, stop) = oneshot::channel();
        let thread = std::thread::Builder::new().name(name.to_string()).spawn(move || {
            runtime.block_on(async move {
                match UdpSocket::from_std(socket) {
                    Ok(socket) => body(socket, stop).await,
                    Err(e) => error!(error = %e, "failed to register socket"),
                }
            });
        })?;
        Ok(Self {
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// True while the thread has not exited.
    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the loop to stop and wait for the thread.
    pub(crate) fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("network thread panicked");
            } else {
                debug!("network thread stopped");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Whether a receive error is a stale ICMP report rather than a dead
/// socket.
pub(crate) fn is_transient(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::WouldBlock
    )
}
