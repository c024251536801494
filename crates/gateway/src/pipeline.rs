// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Pipeline builder
//!
//! Assembles the request pipeline in a fixed order. The order is part of the
//! contract: the webhook route sits in front of the body parsers so the
//! billing collaborator sees the raw bytes, and sanitization runs before any
//! resource router.
//!
//! | # | Stage                  | Implementation                          |
//! |---|------------------------|-----------------------------------------|
//! | 1 | compression            | `tower-http` `CompressionLayer`         |
//! | 2 | CORS and preflight     | [`credentialed_cors`]                   |
//! | 3 | static assets          | `tower-http` `ServeDir`                 |
//! | 4 | access log (dev only)  | [`access_log`]                          |
//! | 5 | security headers       | [`harden_headers`]                      |
//! | 6 | webhook ingress        | [`ingest_webhook`] at [`WEBHOOK_PATH`]  |
//! | 7 | body and cookie parsing| [`parse_input`]                         |
//! | 8 | operator sanitization  | [`strip_operators`]                     |
//! | 9 | markup sanitization    | [`escape_markup`]                       |
//! |10 | pollution control      | [`control_pollution`]                   |
//! |11 | router dispatcher      | [`RouteTable`]                          |
//! |12 | fallback resolver      | [`FallbackResolver`]                    |
//! |13 | error translator       | [`translate_errors`]                    |
//!
//! The translator is layered around stages 6 to 12 so it only sees what they
//! propagate; it is never reached by plain sequential advance. A second
//! translator wraps the static asset stage so file-system failures are
//! rendered the same way. The access log layer only exists in the
//! development pipeline.

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::OriginalUri,
    http::Method,
    middleware::{from_fn, from_fn_with_state},
    routing::post,
};
use collaborators::BillingService;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, services::ServeDir};
use tracing::info;

use crate::{
    config::{Environment, ServerConfig},
    fallback::FallbackResolver,
    faults::enter_request_scope,
    middleware::{
        BodyLimit, ParameterWhitelist, access_log, bound_request, control_pollution,
        credentialed_cors, escape_markup, harden_headers, materialize_input, parse_input,
        strip_operators,
    },
    routes::RouteTable,
    translator::{fault_response, translate_errors},
    webhook::{WEBHOOK_PATH, ingest_webhook},
};

/// Environment-dependent pipeline shape, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Access log on, unmatched routes are 404, faults shown in full
    Development,
    /// SPA fallback for unmatched GETs, fault detail hidden
    Production,
}

impl PipelineVariant {
    /// Whether this is the production variant
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Whether the access log stage is active
    pub fn logs_access(self) -> bool {
        self == Self::Development
    }
}

impl From<Environment> for PipelineVariant {
    fn from(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::Production,
            Environment::Development | Environment::Testing => Self::Development,
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Pipeline stages in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Stage {
    Compression,
    Cors,
    StaticAssets,
    AccessLog,
    SecurityHeaders,
    WebhookIngress,
    BodyParsing,
    OperatorSanitization,
    MarkupSanitization,
    PollutionControl,
    RouterDispatch,
    Fallback,
    ErrorTranslation,
}

impl Stage {
    /// Every stage, in order
    pub const ALL: [Self; 13] = [
        Self::Compression,
        Self::Cors,
        Self::StaticAssets,
        Self::AccessLog,
        Self::SecurityHeaders,
        Self::WebhookIngress,
        Self::BodyParsing,
        Self::OperatorSanitization,
        Self::MarkupSanitization,
        Self::PollutionControl,
        Self::RouterDispatch,
        Self::Fallback,
        Self::ErrorTranslation,
    ];

    /// Short name used in logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Compression => "compression",
            Self::Cors => "cors",
            Self::StaticAssets => "static-assets",
            Self::AccessLog => "access-log",
            Self::SecurityHeaders => "security-headers",
            Self::WebhookIngress => "webhook-ingress",
            Self::BodyParsing => "body-parsing",
            Self::OperatorSanitization => "operator-sanitization",
            Self::MarkupSanitization => "markup-sanitization",
            Self::PollutionControl => "pollution-control",
            Self::RouterDispatch => "router-dispatch",
            Self::Fallback => "fallback",
            Self::ErrorTranslation => "error-translation",
        }
    }

    /// Whether the stage takes part in `variant`
    pub fn is_active(self, variant: PipelineVariant) -> bool {
        match self {
            Self::AccessLog => variant.logs_access(),
            _ => true,
        }
    }
}

/// A built pipeline
#[derive(Debug)]
pub struct Pipeline {
    variant: PipelineVariant,
    router: Router,
}

impl Pipeline {
    /// Start building a pipeline from `config`
    pub fn builder(config: &ServerConfig, billing: Arc<dyn BillingService>) -> PipelineBuilder {
        PipelineBuilder {
            variant: PipelineVariant::from(config.environment),
            asset_dir: config.asset_dir(),
            spa_entry: config.spa_entry(),
            body_limit: BodyLimit(config.body_limit_bytes),
            request_timeout: config.timeout_seconds.value(),
            billing,
            routes: RouteTable::new(),
            whitelist: ParameterWhitelist::default(),
        }
    }

    /// Variant the pipeline was built for
    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    /// Active stages in order
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| stage.is_active(self.variant))
            .collect()
    }

    /// The router to serve
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Builder for [`Pipeline`]
#[derive(Debug)]
pub struct PipelineBuilder {
    variant: PipelineVariant,
    asset_dir: PathBuf,
    spa_entry: PathBuf,
    body_limit: BodyLimit,
    request_timeout: Duration,
    billing: Arc<dyn BillingService>,
    routes: RouteTable,
    whitelist: ParameterWhitelist,
}

impl PipelineBuilder {
    /// Resource routers to dispatch to
    #[must_use]
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Assemble the stages
    pub fn build(self) -> Pipeline {
        let variant = self.variant;
        let resources = self.routes.resources().count();

        let resolver = FallbackResolver::new(variant, self.spa_entry);
        let dispatch = self
            .routes
            .into_router()
            .fallback(move |method: Method, OriginalUri(uri): OriginalUri| {
                let resolver = resolver.clone();
                async move { resolver.resolve(&method, &uri).await }
            })
            .layer(
                ServiceBuilder::new()
                    .layer(from_fn_with_state(self.body_limit, parse_input))
                    .layer(from_fn(strip_operators))
                    .layer(from_fn(escape_markup))
                    .layer(from_fn_with_state(self.whitelist, control_pollution))
                    .layer(from_fn(materialize_input)),
            );

        // Webhook ingress matches before the parsers; other methods on the
        // webhook path continue down the pipeline
        let ingress = Router::new()
            .route(
                WEBHOOK_PATH,
                post(ingest_webhook)
                    .with_state(self.billing)
                    .fallback_service(dispatch.clone()),
            )
            .fallback_service(dispatch);

        let guarded = harden_headers(
            Router::new().fallback_service(
                ServiceBuilder::new()
                    .layer(from_fn_with_state(variant, translate_errors))
                    .layer(from_fn(enter_request_scope))
                    .layer(CatchPanicLayer::custom(fault_response))
                    .layer(from_fn_with_state(self.request_timeout, bound_request))
                    .service(ingress),
            ),
        );
        let guarded = if variant.logs_access() {
            guarded.layer(access_log())
        } else {
            guarded
        };

        let assets = ServeDir::new(&self.asset_dir)
            .call_fallback_on_method_not_allowed(true)
            .fallback(guarded);

        let app = ServiceBuilder::new()
            .layer(CompressionLayer::new())
            .layer(credentialed_cors())
            .layer(from_fn_with_state(variant, translate_errors))
            .service(assets);

        info!(
            variant = %variant,
            assets = %self.asset_dir.display(),
            resources,
            stages = Stage::ALL.iter().filter(|s| s.is_active(variant)).count(),
            "pipeline built"
        );

        Pipeline {
            variant,
            router: Router::new().fallback_service(app),
        }
    }
}
