//! Single-instance guard keyed by a loopback TCP port.
//!
//! Holding the listener is holding the lock; the kernel releases it when the
//! process exits, however it exits.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::sync::backoff::Backoff;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock port {port} is still held by another instance after {attempts} attempts")]
    Exhausted { port: u16, attempts: u32 },
    #[error("failed to bind lock port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Progress reported while acquiring, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Retrying { attempt: u32, delay: Duration },
    Granted { port: u16 },
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub enum LockAttempt {
    Granted(InstanceLock),
    MustRetry,
}

#[derive(Debug)]
pub struct InstanceLock {
    port: u16,
    _listener: TcpListener,
}

impl InstanceLock {
    pub async fn try_acquire(port: u16) -> Result<LockAttempt, LockError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => Ok(LockAttempt::Granted(Self {
                port,
                _listener: listener,
            })),
            Err(err) if err.kind() == io::ErrorKind::AddrInUse => Ok(LockAttempt::MustRetry),
            Err(source) => Err(LockError::Bind { port, source }),
        }
    }

    /// Tries up to `attempts` times, sleeping per `backoff` in between.
    pub async fn acquire<F>(
        port: u16,
        attempts: u32,
        backoff: Backoff,
        mut on_event: F,
    ) -> Result<Self, LockError>
    where
        F: FnMut(LockEvent),
    {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            if let LockAttempt::Granted(lock) = Self::try_acquire(port).await? {
                on_event(LockEvent::Granted { port });
                return Ok(lock);
            }
            if attempt < attempts {
                let delay = backoff.delay(attempt - 1);
                on_event(LockEvent::Retrying { attempt, delay });
                tokio::time::sleep(delay).await;
            }
        }
        on_event(LockEvent::Exhausted { attempts });
        Err(LockError::Exhausted { port, attempts })
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
