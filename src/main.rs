mod cache;
mod config;
mod dto;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod repositories;
mod services;
mod utils;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::CacheStore;
use crate::config::{AppState, Config};
use crate::handlers::{
    auth::{
        login_handler, logout_handler, refresh_handler, register_handler,
        request_password_reset_handler, resend_verification_handler, reset_password_handler,
        verify_code_handler,
    },
    authorization::{
        audit_stats_handler, audit_verify_handler, authorize_check_handler,
        user_permissions_handler,
    },
    group::{
        add_group_member_handler, create_group_handler, create_permission_handler,
        delete_group_handler, grant_group_permission_handler, list_group_members_handler,
        list_group_permissions_handler, list_groups_handler, list_permissions_handler,
        remove_group_member_handler, revoke_group_permission_handler,
    },
    oauth::{
        authorize_handler, authorize_post_handler, discovery_handler, register_client_handler,
        revoke_handler, token_handler,
    },
    organization::{
        add_member_handler, create_organization_handler, get_organization_handler,
        list_members_handler, list_my_organizations_handler, remove_member_handler,
        update_member_role_handler,
    },
    twofa::{disable_totp_handler, login_2fa_handler, setup_totp_handler, verify_totp_handler},
};
use crate::middleware::{
    intent_middleware, jwt_auth_middleware, limit_middleware, security_headers_middleware,
};
use crate::services::audit::{AuditLogger, AuditPipelineConfig};
use crate::services::email::{EmailConfig, EmailService};

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - verifies the database connection
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, axum::http::StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the application router with all routes configured.
///
/// Route groups carry their own body caps; the global default applies
/// elsewhere. Auth-protected groups run behind the bearer middleware; the
/// intent middleware runs on everything.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Registration and verification
    let register_routes = Router::new()
        .route("/register", post(register_handler))
        .route("/verify-code", post(verify_code_handler))
        .route("/resend-verification", post(resend_verification_handler))
        .layer(axum_middleware::from_fn(limit_middleware(
            config.body_limit_register,
        )))
        .layer(DefaultBodyLimit::max(config.body_limit_register));

    // Login (both steps and the TOTP completion)
    let login_routes = Router::new()
        .route("/login", post(login_handler))
        .route("/login/2fa", post(login_2fa_handler))
        .layer(axum_middleware::from_fn(limit_middleware(
            config.body_limit_login,
        )))
        .layer(DefaultBodyLimit::max(config.body_limit_login));

    // Token refresh and logout
    let session_routes = Router::new()
        .route("/refresh", post(refresh_handler))
        .route("/logout", post(logout_handler))
        .layer(axum_middleware::from_fn(limit_middleware(
            config.body_limit_token_refresh,
        )))
        .layer(DefaultBodyLimit::max(config.body_limit_token_refresh));

    // Password reset
    let reset_routes = Router::new()
        .route("/request-password-reset", post(request_password_reset_handler))
        .route("/reset-password", post(reset_password_handler))
        .layer(axum_middleware::from_fn(limit_middleware(
            config.body_limit_password_reset,
        )))
        .layer(DefaultBodyLimit::max(config.body_limit_password_reset));

    // 2FA management - authenticated
    let twofa_routes = Router::new()
        .route("/2fa/setup", post(setup_totp_handler))
        .route("/2fa/verify", post(verify_totp_handler))
        .route("/2fa/disable", post(disable_totp_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ))
        .layer(axum_middleware::from_fn(limit_middleware(
            config.body_limit_twofa,
        )))
        .layer(DefaultBodyLimit::max(config.body_limit_twofa));

    // OAuth endpoints - public; client authentication happens in-handler
    let oauth_routes = Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/authorize", post(authorize_post_handler))
        .route("/token", post(token_handler))
        .route("/revoke", post(revoke_handler))
        .route("/clients", post(register_client_handler));

    // PDP and permission introspection - authenticated
    let authorization_routes = Router::new()
        .route("/authorize", post(authorize_check_handler))
        .route("/users/:user_id/permissions", get(user_permissions_handler))
        .route("/audit/verify", get(audit_verify_handler))
        .route("/audit/stats", get(audit_stats_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Organization and group management - authenticated
    let rbac_routes = Router::new()
        .route("/orgs", post(create_organization_handler))
        .route("/orgs", get(list_my_organizations_handler))
        .route("/orgs/:org_id", get(get_organization_handler))
        .route("/orgs/:org_id/members", get(list_members_handler))
        .route("/orgs/:org_id/members", post(add_member_handler))
        .route("/orgs/:org_id/members/:user_id", delete(remove_member_handler))
        .route("/orgs/:org_id/members/:user_id", put(update_member_role_handler))
        .route("/orgs/:org_id/groups", post(create_group_handler))
        .route("/orgs/:org_id/groups", get(list_groups_handler))
        .route("/groups/:group_id", delete(delete_group_handler))
        .route("/groups/:group_id/members", get(list_group_members_handler))
        .route("/groups/:group_id/members", post(add_group_member_handler))
        .route(
            "/groups/:group_id/members/:user_id",
            delete(remove_group_member_handler),
        )
        .route(
            "/groups/:group_id/permissions",
            get(list_group_permissions_handler),
        )
        .route(
            "/groups/:group_id/permissions",
            post(grant_group_permission_handler),
        )
        .route(
            "/groups/:group_id/permissions/:permission_id",
            delete(revoke_group_permission_handler),
        )
        .route("/permissions", post(create_permission_handler))
        .route("/permissions", get(list_permissions_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .nest("/auth", register_routes)
        .nest("/auth", login_routes)
        .nest("/auth", session_routes)
        .nest("/auth", reset_routes)
        .nest("/auth", twofa_routes)
        .nest("/oauth", oauth_routes)
        .route(
            "/.well-known/oauth-authorization-server",
            get(discovery_handler),
        )
        .merge(authorization_routes)
        .merge(rbac_routes)
        .layer(axum_middleware::from_fn(intent_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(DefaultBodyLimit::max(state.config.body_limit_default))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    let cache = CacheStore::connect(&config.redis_url).await?;

    let email = EmailService::new(EmailConfig::from_env())?;

    let audit = AuditLogger::new(pool.clone(), AuditPipelineConfig::from(&config));
    audit.start();

    let addr = config.socket_addr()?;
    let state = AppState::new(pool, cache, config, email, Arc::clone(&audit))?;

    let app = create_router(state.clone());

    tracing::info!(
        "Gatehouse v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the audit buffer before exit.
    state.audit.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
