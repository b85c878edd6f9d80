//! Lifecycle of the external graph-store server process.
//!
//! Health is observed only by TCP connect to the endpoint's host and port.
//! `start` launches the server when nothing answers and polls until it does;
//! `stop` optionally flushes the dirty set, terminates the process, and polls
//! until the port closes; `restart` does both in turn. Process changes run
//! under one mutex per supervisor. A port
//! that answers although this supervisor launched nothing is a foreign
//! process and is never adopted.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread;

use crate::config::{EndpointConfig, ServerConfig};
use crate::dirty::DirtyFlush;
use crate::error::StoreError;

/// Starts, probes and stops one server instance.
#[derive(Debug)]
pub struct ServerSupervisor {
    server: ServerConfig,
    host: String,
    port: u16,
    dataset: String,
    child: Mutex<Option<Child>>,
}

impl ServerSupervisor {
    pub fn new(server: ServerConfig, endpoint: &EndpointConfig) -> Self {
        ServerSupervisor {
            server,
            host: endpoint.host.clone(),
            port: endpoint.port,
            dataset: endpoint.dataset.clone(),
            child: Mutex::new(None),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when something accepts TCP connections on the endpoint.
    pub fn alive(&self) -> bool {
        let timeout = self.server.probe_timeout();
        self.addrs()
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
    }

    /// True while a process launched by this supervisor is running.
    pub fn owns_process(&self) -> bool {
        let mut child = self.lock();
        running(&mut child)
    }

    /// Launches the server unless ours is already answering.
    pub fn start(&self) -> Result<(), StoreError> {
        let mut child = self.lock();
        let owned = running(&mut child);
        if self.alive() {
            if owned {
                return Ok(());
            }
            return Err(StoreError::PortInUse { port: self.port });
        }
        self.launch(&mut child)
    }

    /// Terminates the server this supervisor launched, if any, and launches
    /// a fresh one. A foreign process on the port is `PortInUse`.
    pub fn restart(&self) -> Result<(), StoreError> {
        let mut child = self.lock();
        if running(&mut child) {
            self.terminate(&mut child)?;
        } else if self.alive() {
            return Err(StoreError::PortInUse { port: self.port });
        }
        self.launch(&mut child)
    }

    /// Flushes through `flush` (if given), then terminates the server this
    /// supervisor launched and waits for the port to close.
    ///
    /// The flush runs before the process lock is taken, so it may go through
    /// a client that restarts the server via this supervisor. Without an
    /// owned process only the flush runs.
    pub fn stop(&self, flush: Option<&dyn DirtyFlush>) -> Result<(), StoreError> {
        if let Some(flush) = flush {
            flush.flush()?;
        }
        let mut child = self.lock();
        self.terminate(&mut child)
    }

    fn launch(&self, child: &mut Option<Child>) -> Result<(), StoreError> {
        // Ours is running but not answering: replace it.
        if let Some(mut stale) = child.take() {
            tracing::warn!(port = self.port, "replacing unresponsive server process");
            let _ = stale.kill();
            let _ = stale.wait();
        }

        tracing::info!(
            binary = %self.server.binary.display(),
            port = self.port,
            dataset = %self.dataset,
            "launching graph-store server"
        );
        let spawned = self
            .command()
            .spawn()
            .map_err(|source| StoreError::ServerLaunch {
                binary: self.server.binary.clone(),
                source,
            })?;
        let process = child.insert(spawned);

        for _ in 0..self.server.probe_attempts {
            if self.alive() {
                tracing::info!(port = self.port, pid = process.id(), "graph-store server is up");
                return Ok(());
            }
            if let Ok(Some(status)) = process.try_wait() {
                *child = None;
                return Err(StoreError::ServerExited {
                    port: self.port,
                    status: status.to_string(),
                });
            }
            thread::sleep(self.server.probe_interval());
        }
        Err(StoreError::ServerStartTimeout {
            port: self.port,
            attempts: self.server.probe_attempts,
        })
    }

    fn terminate(&self, child: &mut Option<Child>) -> Result<(), StoreError> {
        let Some(mut process) = child.take() else {
            tracing::debug!(port = self.port, "no owned server process to stop");
            return Ok(());
        };

        tracing::info!(port = self.port, pid = process.id(), "stopping graph-store server");
        let _ = process.kill();
        let _ = process.wait();

        for _ in 0..self.server.stop_attempts {
            if !self.alive() {
                tracing::info!(port = self.port, "graph-store server stopped");
                return Ok(());
            }
            thread::sleep(self.server.probe_interval());
        }
        Err(StoreError::ServerStopTimeout {
            port: self.port,
            attempts: self.server.stop_attempts,
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.server.binary);
        command
            .arg(format!("--loc={}", self.server.database.display()))
            .arg("--update")
            .arg(format!("--port={}", self.port))
            .arg(format!("/{}", self.dataset))
            .envs(&self.server.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    fn addrs(&self) -> Vec<SocketAddr> {
        match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(err) => {
                tracing::warn!(host = %self.host, error = %err, "cannot resolve server host");
                Vec::new()
            }
        }
    }
}

impl Drop for ServerSupervisor {
    /// Terminates a process this supervisor launched; nothing is flushed.
    fn drop(&mut self) {
        let child = self.child.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut process) = child.take() {
            tracing::debug!(port = self.port, pid = process.id(), "terminating server on drop");
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

/// Reaps an exited child; true when one is still running.
fn running(child: &mut Option<Child>) -> bool {
    match child.as_mut().map(Child::try_wait) {
        Some(Ok(None)) => true,
        Some(_) => {
            *child = None;
            false
        }
        None => false,
    }
}
