// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Marketplace gateway
//!
//! The front-door HTTP process of the marketplace backend: an ordered request
//! pipeline in front of externally provided resource routers, raw-body
//! payment webhook ingress, and a lifecycle manager with three fault channels.
//!
//! # Module Structure
//!
//! - [`config`]: Hierarchical configuration with validated newtypes and redacted secrets
//! - [`error`]: Process-level [`ServerError`] and request-level [`AppError`]
//! - [`pipeline`]: Builds the thirteen-stage pipeline for a [`PipelineVariant`]
//! - [`middleware`]: CORS, access log, security headers, parsing, sanitization and pollution control
//! - [`webhook`]: Payment webhook ingress ahead of the body parsers
//! - [`routes`]: Prefix route table delegating to resource routers
//! - [`extractors`]: The [`Input`] extractor resource handlers read sanitized input with
//! - [`fallback`]: Production SPA entry document or development 404
//! - [`translator`]: The single path that renders error responses
//! - [`lifecycle`]: Store connection, socket, drain and exit codes
//! - [`faults`]: Uncaught fault, unhandled rejection and termination signal channels
//! - [`state`]: Lifecycle state machine
//!
//! # Process Faults
//!
//! | Channel             | Source                                  | Drain | Exit |
//! |---------------------|-----------------------------------------|-------|------|
//! | uncaught fault      | panic outside request scope             | no    | 1    |
//! | unhandled rejection | supervised background task returned Err | yes   | 1    |
//! | termination signal  | SIGTERM, SIGINT or a shutdown request   | yes   | 0    |

pub mod config;
pub mod error;
pub mod extractors;
pub mod fallback;
pub mod faults;
pub mod lifecycle;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod translator;
pub mod webhook;

pub use config::{Environment, ServerConfig};
pub use error::{AppError, ServerError, ServerResult};
pub use extractors::Input;
pub use faults::{ExitFn, FaultHandlers, ShutdownTrigger};
pub use lifecycle::{Collaborators, Lifecycle, RunningServer, ShutdownConfig};
pub use pipeline::{Pipeline, PipelineVariant, Stage};
pub use routes::{RouteError, RouteTable};
pub use shared_types::{ErrorValue, ResourceKind};
pub use state::{LifecycleState, StateTracker};
