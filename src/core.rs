use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::get,
};
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    app::AppContext, health, http::RouteModule, middleware::MakeRequestUuid, routes,
};

/// The Corpdesk HTTP application: every API module over one [`AppContext`].
pub struct App {
    router: Router<AppContext>,
    context: AppContext,
}

impl App {
    /// All API routes plus `/health`.
    pub fn new(context: AppContext) -> Self {
        Self::builder(context).build()
    }

    pub fn builder(context: AppContext) -> AppBuilder {
        AppBuilder::new(context)
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Register an additional route module.
    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    /// The complete router with middleware and state applied.
    ///
    /// This is what `serve` runs; tests drive it directly with
    /// [`testing`](crate::testing) helpers.
    pub fn into_router(self) -> Router {
        let config = self.context.config().clone();
        let mut router = self.router;

        // Innermost first: the dev-mode detail rewrite has to see the
        // handler's response before anything else touches it.
        if config.dev.enabled {
            router = router.layer(axum::middleware::from_fn(
                crate::middleware::expose_error_details,
            ));
        }

        router = router
            .layer(DefaultBodyLimit::max(config.server.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_seconds,
            )))
            .layer(build_cors_layer(
                config.dev.enabled,
                config.server.base_url(),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        router.with_state(self.context)
    }

    /// Start the server and run until SIGINT or SIGTERM.
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let addr = self
            .context
            .config()
            .server
            .addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let router = self.into_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!("Health check available at http://{}/health", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

/// Builder for [`App`]. Starts with every Corpdesk API module registered.
#[must_use = "builder does nothing until you call build()"]
pub struct AppBuilder {
    context: AppContext,
    router: Router<AppContext>,
}

impl AppBuilder {
    pub fn new(context: AppContext) -> Self {
        let router = Router::<AppContext>::new()
            .route("/health", get(health::health_handler))
            .merge(routes::api_router());
        Self { context, router }
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    pub fn build(self) -> App {
        App {
            router: self.router,
            context: self.context,
        }
    }
}

/// Permissive in dev mode; otherwise only the configured web origin.
fn build_cors_layer(dev_mode: bool, base_url: &str) -> CorsLayer {
    if dev_mode {
        return CorsLayer::permissive();
    }

    let origin = match base_url.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            tracing::warn!(base_url = %base_url, "Base URL is not a valid origin, CORS disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
