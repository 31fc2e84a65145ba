use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppContext;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

/// Trait for implementing health checks
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Database,
    Stripe,
    Storage,
    Mailer,
    Pdf,
    Inference,
}

impl Component {
    const ALL: [Component; 6] = [
        Component::Database,
        Component::Stripe,
        Component::Storage,
        Component::Mailer,
        Component::Pdf,
        Component::Inference,
    ];

    fn name(&self) -> &'static str {
        match self {
            Component::Database => "database",
            Component::Stripe => "stripe",
            Component::Storage => "storage",
            Component::Mailer => "mailer",
            Component::Pdf => "pdf",
            Component::Inference => "inference",
        }
    }
}

/// Check of one backing service of an [`AppContext`].
///
/// Only the database is probed over the network. Missing optional services
/// report `degraded`, since the app keeps working with a local fallback.
struct ServiceCheck {
    ctx: AppContext,
    component: Component,
}

impl ServiceCheck {
    async fn run(&self) -> ComponentHealth {
        use HealthStatus::*;
        let name = self.component.name();
        let ctx = &self.ctx;

        match self.component {
            Component::Database => match ctx.db().ping().await {
                Ok(()) => ComponentHealth::new(name, Healthy, "Database reachable"),
                Err(e) => {
                    tracing::error!(error = %e, "Database health check failed");
                    ComponentHealth::new(name, Unhealthy, "Database unreachable")
                }
            },
            Component::Stripe => {
                if ctx.subscriptions().is_configured() {
                    ComponentHealth::new(name, Healthy, "Stripe configured")
                } else {
                    ComponentHealth::new(name, Degraded, "Stripe not configured, billing is local-only")
                }
            }
            Component::Storage => match ctx.storage().backend() {
                "memory" => ComponentHealth::new(name, Degraded, "In-memory storage, files are not persisted"),
                backend => ComponentHealth::new(name, Healthy, format!("{} storage", backend)),
            },
            Component::Mailer => {
                let mailer = ctx.mailer();
                match (mailer.is_healthy(), mailer.backend()) {
                    (false, backend) => {
                        ComponentHealth::new(name, Unhealthy, format!("{} mailer unavailable", backend))
                    }
                    (true, "console") => ComponentHealth::new(name, Degraded, "Emails are only logged"),
                    (true, backend) => ComponentHealth::new(name, Healthy, format!("{} mailer", backend)),
                }
            }
            Component::Pdf => {
                if ctx.pdf().is_available().await {
                    ComponentHealth::new(name, Healthy, format!("{} renderer", ctx.pdf().name()))
                } else {
                    ComponentHealth::new(name, Degraded, "No PDF renderer available")
                }
            }
            Component::Inference => {
                if ctx.invoices().is_llm_enabled() {
                    ComponentHealth::new(name, Healthy, "Inference endpoint configured")
                } else {
                    ComponentHealth::new(name, Degraded, "Invoices use the built-in template")
                }
            }
        }
    }
}

impl HealthCheck for ServiceCheck {
    fn name(&self) -> &str {
        self.component.name()
    }

    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>> {
        Box::pin(self.run())
    }
}

/// Health check manager that runs all registered checks
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// One check per backing service of `ctx`.
    pub fn for_context(ctx: &AppContext) -> Self {
        Component::ALL.iter().fold(Self::new(), |checker, component| {
            checker.with_check(Arc::new(ServiceCheck {
                ctx: ctx.clone(),
                component: *component,
            }))
        })
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for the health endpoint
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    HealthChecker::for_context(&ctx).check_health().await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(HealthStatus);

    impl HealthCheck for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn check(
            &self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>>
        {
            Box::pin(async move { ComponentHealth::new("fixed", self.0, "") })
        }
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let checker = HealthChecker::new()
            .with_check(Arc::new(Fixed(HealthStatus::Healthy)))
            .with_check(Arc::new(Fixed(HealthStatus::Degraded)));
        assert_eq!(checker.check_health().await.status, HealthStatus::Degraded);

        let checker = checker.with_check(Arc::new(Fixed(HealthStatus::Unhealthy)));
        let response = checker.check_health().await;
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(response.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_checker_is_healthy() {
        assert_eq!(
            HealthChecker::default().check_health().await.status,
            HealthStatus::Healthy
        );
    }
}
