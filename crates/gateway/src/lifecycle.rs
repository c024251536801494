// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle manager
//!
//! Owns the store connection and the listening socket, and drives the state
//! machine `STARTING → LISTENING → DRAINING → TERMINATED`, with `FAILED`
//! reachable from any state. `LISTENING` is only reached once the store
//! connection is confirmed.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use collaborators::{BillingService, StoreConnector, StoreHandle};
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle, time::timeout};
use tokio_retry::{
    Retry,
    strategy::{ExponentialBackoff, jitter},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    faults::{ExitFn, FaultHandlers, ShutdownTrigger, process_exit},
    pipeline::Pipeline,
    routes::RouteTable,
    state::{LifecycleState, StateTracker},
};

const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
const MAX_CONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time in-flight requests get to finish once draining starts
    pub graceful_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Builds the route table once the store is connected
pub type RouteFactory = Box<dyn FnOnce(StoreHandle) -> RouteTable + Send>;

/// External collaborators injected into the lifecycle manager
pub struct Collaborators {
    /// Webhook verification
    pub billing: Arc<dyn BillingService>,
    /// Opens the store connection
    pub store: Arc<dyn StoreConnector>,
    /// Resource routers, given the connected store
    pub routes: RouteFactory,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("billing", &self.billing)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Process lifecycle manager
#[derive(Debug)]
pub struct Lifecycle {
    config: ServerConfig,
    shutdown_config: ShutdownConfig,
    collaborators: Collaborators,
    state: StateTracker,
    faults: FaultHandlers,
    triggers: mpsc::UnboundedReceiver<ShutdownTrigger>,
}

impl Lifecycle {
    /// Create a manager in `STARTING`
    pub fn new(
        config: ServerConfig,
        shutdown_config: ShutdownConfig,
        collaborators: Collaborators,
    ) -> Self {
        let state = StateTracker::new();
        let (tx, triggers) = mpsc::unbounded_channel();
        let faults = FaultHandlers::new(state.clone(), tx, process_exit());

        Self {
            config,
            shutdown_config,
            collaborators,
            state,
            faults,
            triggers,
        }
    }

    /// Replace the function used to exit on an uncaught fault
    #[must_use]
    pub fn with_exit(mut self, exit: ExitFn) -> Self {
        self.faults = self.faults.with_exit(exit);
        self
    }

    /// Fault channel entry points
    pub fn faults(&self) -> &FaultHandlers {
        &self.faults
    }

    /// Lifecycle state
    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start, then serve until a shutdown trigger completes draining
    ///
    /// # Errors
    ///
    /// See [`Lifecycle::start`] and [`RunningServer::wait`].
    pub async fn run(self) -> ServerResult<ShutdownTrigger> {
        self.start().await?.wait().await
    }

    /// Connect the store, bind the socket and start serving
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` for an unusable connection string,
    /// `ServerError::Store` when every connection attempt fails and
    /// `ServerError::Bind` when the socket cannot be bound. The state is
    /// `FAILED` afterwards.
    pub async fn start(self) -> ServerResult<RunningServer> {
        let state = self.state.clone();
        match self.launch().await {
            Ok(server) => Ok(server),
            Err(error) => {
                error!(error = %error, "startup failed");
                state.transition(LifecycleState::Failed);
                Err(error)
            }
        }
    }

    async fn launch(self) -> ServerResult<RunningServer> {
        let Self {
            config,
            shutdown_config,
            collaborators,
            state,
            faults,
            triggers,
        } = self;

        info!(environment = %config.environment, "gateway starting");

        let signals = TerminationSignals::register()?;
        let store = connect_store(&config, collaborators.store.as_ref()).await?;
        let routes = (collaborators.routes)(Arc::clone(&store));
        let pipeline = Pipeline::builder(&config, collaborators.billing)
            .routes(routes)
            .build();

        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let token = CancellationToken::new();
        tokio::spawn(shutdown_signal_handler(
            faults.clone(),
            token.clone(),
            signals,
        ));

        let router = pipeline.into_router();
        let drain = token.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { drain.cancelled().await })
                .await
        });

        state.transition(LifecycleState::Listening);
        info!(
            address = %local_addr,
            environment = %config.environment,
            "gateway listening",
        );

        Ok(RunningServer {
            local_addr,
            store,
            state,
            faults,
            triggers,
            server,
            token,
            shutdown_config,
        })
    }
}

/// A server in `LISTENING`
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    store: StoreHandle,
    state: StateTracker,
    faults: FaultHandlers,
    triggers: mpsc::UnboundedReceiver<ShutdownTrigger>,
    server: JoinHandle<std::io::Result<()>>,
    token: CancellationToken,
    shutdown_config: ShutdownConfig,
}

impl RunningServer {
    /// Bound socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connected store
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Lifecycle state
    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    /// Fault channel entry points
    pub fn faults(&self) -> &FaultHandlers {
        &self.faults
    }

    /// Serve until a shutdown trigger arrives, then drain
    ///
    /// Returns the trigger; its [`ShutdownTrigger::code`] is the process exit
    /// code. Draining is bounded by [`ShutdownConfig::graceful_timeout`];
    /// requests still running at the deadline are abandoned.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Runtime` when an uncaught fault moved the state
    /// to `FAILED` or the server stopped on its own, and
    /// `ServerError::Shutdown` when serving failed while draining.
    pub async fn wait(self) -> ServerResult<ShutdownTrigger> {
        let Self {
            state,
            faults: _faults,
            mut triggers,
            mut server,
            token,
            shutdown_config,
            ..
        } = self;

        let trigger = tokio::select! {
            trigger = triggers.recv() => trigger.unwrap_or(ShutdownTrigger::Requested),
            () = state.wait_for(LifecycleState::Failed) => {
                token.cancel();
                server.abort();
                return Err(ServerError::Runtime {
                    message: "uncaught fault, exiting without draining".to_string(),
                });
            }
            joined = &mut server => {
                state.transition(LifecycleState::Failed);
                let error = match joined {
                    Ok(Ok(())) => ServerError::Runtime {
                        message: "server stopped without a shutdown trigger".to_string(),
                    },
                    Ok(Err(source)) => ServerError::Startup { source },
                    Err(join_error) => join_error.into(),
                };
                error!(error = %error, "server stopped unexpectedly");
                return Err(error);
            }
        };

        state.transition(LifecycleState::Draining);
        info!(
            trigger = ?trigger,
            deadline_ms = shutdown_config.graceful_timeout.as_millis(),
            "draining in-flight requests"
        );
        token.cancel();

        match timeout(shutdown_config.graceful_timeout, &mut server).await {
            Ok(Ok(Ok(()))) => debug!("drain complete"),
            Ok(Ok(Err(source))) => {
                state.transition(LifecycleState::Failed);
                error!(error = %source, "server failed while draining");
                return Err(ServerError::Shutdown { source });
            }
            Ok(Err(join_error)) => {
                state.transition(LifecycleState::Failed);
                return Err(join_error.into());
            }
            Err(_) => {
                warn!(
                    deadline_ms = shutdown_config.graceful_timeout.as_millis(),
                    "drain deadline passed, abandoning in-flight requests"
                );
                server.abort();
            }
        }

        state.transition(LifecycleState::Terminated);
        info!(code = trigger.code(), "gateway terminated");
        Ok(trigger)
    }
}

/// Connect to the store, retrying with exponential backoff
async fn connect_store(
    config: &ServerConfig,
    connector: &dyn StoreConnector,
) -> ServerResult<StoreHandle> {
    let uri = config.connection_string()?;
    let uri = uri.as_str();
    let attempts = config.database.connect_attempts.max(1);

    // 500ms, 1s, 2s, ... capped at MAX_CONNECT_BACKOFF
    let retry_strategy = ExponentialBackoff::from_millis(2)
        .factor(250)
        .max_delay(MAX_CONNECT_BACKOFF)
        .map(jitter)
        .take(attempts.saturating_sub(1) as usize);

    let store = Retry::spawn(retry_strategy, move || {
        let attempt = connector.connect(uri);
        async move {
            attempt.await.inspect_err(|error| {
                warn!(error = %error, "store connection attempt failed");
            })
        }
    })
    .await?;

    info!(store = %store.describe(), "store connection established");
    Ok(store)
}

/// Report SIGTERM and SIGINT on fault channel 3
async fn shutdown_signal_handler(
    faults: FaultHandlers,
    token: CancellationToken,
    mut signals: TerminationSignals,
) {
    tokio::select! {
        received = signals.recv() => match received {
            Ok(name) => faults.signal(name),
            Err(error) => faults.unhandled_rejection("signal-handler", &anyhow::Error::new(error)),
        },
        () = token.cancelled() => debug!("draining started, signal handler exiting"),
    }
}

/// Termination signal streams, registered before the socket is bound
#[cfg(unix)]
struct TerminationSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn register() -> ServerResult<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let register = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| ServerError::Signal {
                message: format!("failed to register {name} handler: {e}"),
            })
        };

        Ok(Self {
            sigterm: register(SignalKind::terminate(), "SIGTERM")?,
            sigint: register(SignalKind::interrupt(), "SIGINT")?,
        })
    }

    async fn recv(&mut self) -> ServerResult<&'static str> {
        tokio::select! {
            _ = self.sigterm.recv() => Ok("SIGTERM"),
            _ = self.sigint.recv() => Ok("SIGINT"),
        }
    }
}

#[cfg(not(unix))]
struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    fn register() -> ServerResult<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ServerResult<&'static str> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| ServerError::Signal {
                message: format!("failed to install CTRL+C handler: {e}"),
            })?;
        Ok("CTRL+C")
    }
}
