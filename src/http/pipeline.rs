//! Gate composition.
//!
//! ```text
//! admission (429) → security headers → auth (401) → route
//!     {base}/ and {base}/{*rest} → upload limits (413) → body limit → delegate
//!     fallback                   → static assets
//! ```
//!
//! Both routes share the three gates. The header layer sits outside auth
//! so 401s are decorated; admission decorates its own 429.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::HeaderName,
    middleware::from_fn_with_state,
    response::IntoResponse,
    Router,
};
use tower::Service;
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};

use crate::config::{GateConfig, Secret};
use crate::http::request::{propagate_request_id_layer, request_span, set_request_id_layer};
use crate::http::server::ServerError;
use crate::security::auth::{auth_middleware, AuthGate};
use crate::security::headers::{security_headers_middleware, SecurityHeaders};
use crate::security::identity::IdentityResolver;
use crate::security::limits::{upload_limits_middleware, UploadLimits};
use crate::security::rate_limit::{admission_middleware, AdmissionLimiter, AdmissionState, ClientRegistry};

pub struct Pipeline {
    admission: AdmissionState,
    headers: Arc<SecurityHeaders>,
    auth: Arc<AuthGate>,
    limits: UploadLimits,
    base_path: String,
    static_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        config: &GateConfig,
        secret: Secret,
        registry: Arc<ClientRegistry>,
    ) -> Result<Self, ServerError> {
        let headers = Arc::new(SecurityHeaders::new(&config.security, &config.upload.base_path)?);

        let proxy_header = if config.rate_limit.trust_proxy_header {
            Some(HeaderName::from_bytes(config.rate_limit.client_ip_header.as_bytes())?)
        } else {
            None
        };
        let admission = AdmissionState {
            limiter: AdmissionLimiter::new(registry),
            identity: IdentityResolver::new(proxy_header),
            headers: Arc::clone(&headers),
            enabled: config.rate_limit.enabled,
        };

        let auth_header = HeaderName::from_bytes(config.security.auth_header.as_bytes())?;

        Ok(Self {
            admission,
            headers,
            auth: Arc::new(AuthGate::new(auth_header, secret)),
            limits: UploadLimits::new(config.upload.max_size),
            base_path: config.upload.base_path.clone(),
            static_dir: config.upload.static_dir.clone(),
        })
    }

    /// Build the router with `upload` as the upload-route delegate.
    pub fn into_router<S>(self, upload: S) -> Router
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        let base = self.base_path.trim_end_matches('/');

        Router::new()
            .route_service(&format!("{}/", base), upload.clone())
            .route_service(&format!("{}/{{*rest}}", base), upload)
            .route_layer(RequestBodyLimitLayer::new(self.limits.max_body()))
            .route_layer(from_fn_with_state(self.limits, upload_limits_middleware))
            .fallback_service(ServeDir::new(&self.static_dir))
            .layer(from_fn_with_state(self.auth, auth_middleware))
            .layer(from_fn_with_state(self.headers, security_headers_middleware))
            .layer(from_fn_with_state(self.admission, admission_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }
}
