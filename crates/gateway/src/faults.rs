// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Process fault channels
//!
//! Faults raised inside a request are caught by the pipeline and rendered by
//! the error translator. Everything else lands on one of three channels:
//!
//! 1. **Uncaught fault** (a panic outside request scope): logged, the state
//!    moves to `FAILED` and the process exits with code 1 immediately.
//! 2. **Unhandled rejection** (a supervised background task returned `Err`):
//!    logged, then the lifecycle manager drains and exits with code 1.
//! 3. **Termination signal** (SIGTERM, SIGINT or a programmatic request):
//!    the lifecycle manager drains and the process exits with code 0.

use std::{fmt, future::Future, panic, sync::Arc};

use axum::{extract::Request, middleware::Next, response::Response};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

use crate::state::{LifecycleState, StateTracker};

tokio::task_local! {
    static REQUEST_SCOPE: RequestScope;
}

#[derive(Debug, Clone, Copy)]
struct RequestScope;

/// Whether the caller is running inside a request handled by the pipeline
pub fn in_request_scope() -> bool {
    REQUEST_SCOPE.try_with(|_| ()).is_ok()
}

/// Marks everything downstream as running in request scope
pub async fn enter_request_scope(req: Request, next: Next) -> Response {
    REQUEST_SCOPE.scope(RequestScope, next.run(req)).await
}

/// Terminates the process with the given code
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit function that ends the process
pub fn process_exit() -> ExitFn {
    Arc::new(exit_process)
}

fn exit_process(code: i32) {
    std::process::exit(code);
}

/// Why the lifecycle manager started draining
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A termination signal from the supervisor
    Signal(&'static str),
    /// Shutdown requested from inside the process
    Requested,
    /// A supervised background task failed
    UnhandledRejection {
        /// Task name
        task: String,
        /// Rendered error chain
        message: String,
    },
}

impl ShutdownTrigger {
    /// Process exit code once draining completes
    pub fn code(&self) -> u8 {
        match self {
            Self::Signal(_) | Self::Requested => 0,
            Self::UnhandledRejection { .. } => 1,
        }
    }

    /// Exit code for `main`
    pub fn exit_code(&self) -> std::process::ExitCode {
        std::process::ExitCode::from(self.code())
    }
}

/// Entry points for the three fault channels
#[derive(Clone)]
pub struct FaultHandlers {
    state: StateTracker,
    triggers: mpsc::UnboundedSender<ShutdownTrigger>,
    exit: ExitFn,
}

impl fmt::Debug for FaultHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultHandlers")
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

impl FaultHandlers {
    pub(crate) fn new(
        state: StateTracker,
        triggers: mpsc::UnboundedSender<ShutdownTrigger>,
        exit: ExitFn,
    ) -> Self {
        Self {
            state,
            triggers,
            exit,
        }
    }

    pub(crate) fn with_exit(&self, exit: ExitFn) -> Self {
        Self {
            exit,
            ..self.clone()
        }
    }

    /// Channel 1: log, mark `FAILED`, exit with code 1 without draining
    pub fn uncaught_fault(&self, fault: &dyn fmt::Display) {
        error!(fault = %fault, "uncaught fault, shutting down");
        self.state.transition(LifecycleState::Failed);
        (self.exit)(1);
    }

    /// Channel 2: log, then drain and exit with code 1
    pub fn unhandled_rejection(&self, task: &str, error: &anyhow::Error) {
        error!(task, error = %format!("{error:#}"), "unhandled rejection, draining");
        self.send(ShutdownTrigger::UnhandledRejection {
            task: task.to_string(),
            message: format!("{error:#}"),
        });
    }

    /// Channel 3: drain and exit with code 0
    pub fn request_shutdown(&self) {
        debug!("programmatic shutdown requested");
        self.send(ShutdownTrigger::Requested);
    }

    pub(crate) fn signal(&self, name: &'static str) {
        warn!(signal = name, "termination signal received, draining");
        self.send(ShutdownTrigger::Signal(name));
    }

    fn send(&self, trigger: ShutdownTrigger) {
        if self.triggers.send(trigger).is_err() {
            debug!("lifecycle manager is no longer waiting for shutdown triggers");
        }
    }

    /// Run a background task whose failure is reported on channel 2
    pub fn spawn_supervised<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let faults = self.clone();
        tokio::spawn(async move {
            if let Err(error) = task.await {
                faults.unhandled_rejection(name, &error);
            }
        })
    }

    /// Route panics outside request scope to channel 1
    ///
    /// Panics inside request scope are only logged here; the pipeline turns
    /// them into 500 responses.
    pub fn install_panic_hook(&self) {
        let faults = self.clone();
        panic::set_hook(Box::new(move |info| {
            if in_request_scope() {
                error!(panic = %info, "request handler panicked");
            } else {
                faults.uncaught_fault(info);
            }
        }));
    }
}
