// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Security header hardening
//!
//! The gateway runs the relaxed profile, which leaves out
//! content-security-policy and frame-guard. Handlers may set any of these
//! headers themselves; the stage only fills in what is missing.

use axum::{
    Router,
    http::{HeaderName, HeaderValue, header},
    middleware::map_response,
    response::Response,
};
use tower_http::set_header::SetResponseHeaderLayer;

const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

static RELAXED_HEADERS: [(HeaderName, HeaderValue); 10] = [
    (
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    ),
    (
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    ),
    (
        HeaderName::from_static("origin-agent-cluster"),
        HeaderValue::from_static("?1"),
    ),
    (
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    ),
    (
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    ),
    (
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ),
    (
        header::X_DNS_PREFETCH_CONTROL,
        HeaderValue::from_static("off"),
    ),
    (
        HeaderName::from_static("x-download-options"),
        HeaderValue::from_static("noopen"),
    ),
    (
        HeaderName::from_static("x-permitted-cross-domain-policies"),
        HeaderValue::from_static("none"),
    ),
    (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
];

/// Add the relaxed security headers to every response from `router`
pub fn harden_headers(router: Router) -> Router {
    RELAXED_HEADERS
        .iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                name.clone(),
                value.clone(),
            ))
        })
        .layer(map_response(hide_powered_by))
}

async fn hide_powered_by(mut response: Response) -> Response {
    response.headers_mut().remove(X_POWERED_BY);
    response
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;

    async fn headers_for(router: Router) -> axum::http::HeaderMap {
        let response = harden_headers(router)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("infallible");
        response.headers().clone()
    }

    #[tokio::test]
    async fn relaxed_headers_omit_csp_and_frame_guard() {
        let headers = headers_for(Router::new().route("/", get(|| async { "ok" }))).await;

        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers["origin-agent-cluster"], "?1");
        assert_eq!(headers[header::X_XSS_PROTECTION], "0");
        assert!(!headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(!headers.contains_key(header::X_FRAME_OPTIONS));
    }

    #[tokio::test]
    async fn handler_headers_win_and_powered_by_is_removed() {
        let router = Router::new().route(
            "/",
            get(|| async {
                (
                    StatusCode::OK,
                    [
                        (header::REFERRER_POLICY, "origin"),
                        (X_POWERED_BY, "Express"),
                    ],
                )
            }),
        );
        let headers = headers_for(router).await;

        assert_eq!(headers[header::REFERRER_POLICY], "origin");
        assert_eq!(headers.get_all(header::REFERRER_POLICY).iter().count(), 1);
        assert!(!headers.contains_key(X_POWERED_BY));
    }

    #[tokio::test]
    async fn fallback_responses_are_hardened() {
        let headers = headers_for(Router::new().fallback(|| async { StatusCode::NOT_FOUND })).await;
        assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], "max-age=31536000; includeSubDomains");
    }
}
