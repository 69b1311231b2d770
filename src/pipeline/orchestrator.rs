//! Measurement run from graph construction to teardown.

use crate::config::CaptureConfig;
use crate::engine::{GraphEngine, StatusReceiver, status_channel};
use crate::error::Result;
use crate::pipeline::dispatcher::{EventDispatcher, Flow, LoopExit};
use crate::pipeline::lifecycle::{ActiveGraph, LifecycleController};
use crate::pipeline::shutdown::{
    ControlMessage, ControlReceiver, ControlSender, ShutdownCoordinator, ShutdownSignal,
    control_channel,
};
use crate::pipeline::topology::TopologyBuilder;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory for topology snapshots, if enabled.
    pub dump_dir: Option<PathBuf>,
    /// Register termination signal handlers while running.
    pub handle_signals: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dump_dir: None,
            handle_signals: true,
        }
    }
}

/// Cloneable handle for requesting a drain from outside the control loop.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: ControlSender,
}

impl ControlHandle {
    /// Ask the running pipeline to drain. Returns false once the loop is gone.
    pub fn request_drain(&self, signal: ShutdownSignal) -> bool {
        self.tx.send(ControlMessage::Drain(signal)).is_ok()
    }
}

/// Built pipeline plus the channels of its control loop.
pub struct Orchestrator<E: GraphEngine> {
    controller: LifecycleController<E>,
    dispatcher: EventDispatcher,
    status_rx: StatusReceiver,
    control_tx: ControlSender,
    control_rx: ControlReceiver,
    handle_signals: bool,
}

impl<E: GraphEngine> Orchestrator<E> {
    /// Build the graph described by `config` on `engine`.
    ///
    /// Fails without starting anything if a node type is missing or the
    /// graph cannot be assembled.
    pub fn new(config: &CaptureConfig, mut engine: E, options: RunOptions) -> Result<Self> {
        let topology = TopologyBuilder::new(config).build(&mut engine)?;
        let (status_tx, status_rx) = status_channel();
        engine.attach_status_sink(status_tx)?;
        let (control_tx, control_rx) = control_channel();

        Ok(Self {
            controller: LifecycleController::new(engine, topology, config.source_name()),
            dispatcher: EventDispatcher::new().with_dump_dir(options.dump_dir),
            status_rx,
            control_tx,
            control_rx,
            handle_signals: options.handle_signals,
        })
    }

    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle {
            tx: self.control_tx.clone(),
        }
    }

    pub fn controller(&self) -> &LifecycleController<E> {
        &self.controller
    }

    /// Start the graph and process events until it drains or fails.
    ///
    /// Control messages are always handled before pending status events.
    /// The graph is torn down exactly once on every way out of this
    /// function.
    pub async fn run(self) -> Result<LoopExit> {
        let Self {
            controller,
            dispatcher,
            mut status_rx,
            control_tx,
            mut control_rx,
            handle_signals,
        } = self;

        let mut active = ActiveGraph::acquire(controller);
        if handle_signals {
            ShutdownCoordinator::install(control_tx.clone())?;
        }

        active.start();

        let exit = loop {
            tokio::select! {
                biased;

                Some(message) = control_rx.recv() => match message {
                    ControlMessage::Drain(signal) => {
                        debug!(signal = %signal, "drain requested");
                        active.request_drain();
                    }
                },
                event = status_rx.recv() => match event {
                    Some(event) => {
                        if let Flow::Quit(exit) = dispatcher.dispatch(&mut *active, event) {
                            break exit;
                        }
                    }
                    None => {
                        error!("Status channel closed unexpectedly");
                        break LoopExit::Fatal {
                            message: "status channel closed".to_string(),
                        };
                    }
                },
            }
        };

        drop(control_tx);
        active.release();
        match &exit {
            LoopExit::EndOfStream => info!("Pipeline drained"),
            LoopExit::Fatal { message } => error!("Pipeline stopped: {message}"),
        }
        Ok(exit)
    }
}
