//! Termination signal handling.
//!
//! Signals never touch the graph directly. Each one is turned into a
//! [`ControlMessage`] and handled by the control loop like any other input.

use crate::error::{DriftError, Result};
use std::fmt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::info;

/// Termination signals that request a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Hangup,
    Terminate,
}

impl ShutdownSignal {
    pub const ALL: [ShutdownSignal; 3] = [
        ShutdownSignal::Interrupt,
        ShutdownSignal::Hangup,
        ShutdownSignal::Terminate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Hangup => "SIGHUP",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input to the control loop from outside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Push end-of-stream and wait for the graph to drain.
    Drain(ShutdownSignal),
}

pub type ControlSender = UnboundedSender<ControlMessage>;
pub type ControlReceiver = UnboundedReceiver<ControlMessage>;

pub fn control_channel() -> (ControlSender, ControlReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Registers the termination signals and forwards them to the control loop.
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    /// Register SIGINT, SIGHUP and SIGTERM. Every delivery (not just the
    /// first) is forwarded as [`ControlMessage::Drain`]; the controller makes
    /// repeated drains harmless.
    ///
    /// Must be called from within a tokio runtime. Registration happens
    /// before this returns, so a signal raised afterwards is never lost.
    #[cfg(unix)]
    pub fn install(tx: ControlSender) -> Result<()> {
        use tokio::signal::unix::signal;

        let mut streams = Vec::with_capacity(ShutdownSignal::ALL.len());
        for sig in ShutdownSignal::ALL {
            let stream = signal(sig.kind()).map_err(|e| DriftError::Signal {
                message: format!("Failed to register {sig} handler: {e}"),
            })?;
            streams.push((sig, stream));
        }

        for (sig, mut stream) in streams {
            let tx = tx.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!(signal = %sig, "Caught signal");
                    if tx.send(ControlMessage::Drain(sig)).is_err() {
                        break;
                    }
                }
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn install(tx: ControlSender) -> Result<()> {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = %ShutdownSignal::Interrupt, "Caught signal");
                if tx.send(ControlMessage::Drain(ShutdownSignal::Interrupt)).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}
