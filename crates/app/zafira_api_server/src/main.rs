//! Zafira API server binary.
//!
//! Reads configuration from flags / environment (a `.env` file is honoured),
//! migrates the database and serves the HTTP API until ctrl-c.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use zafira_api::AppState;
use zafira_api::config::ApiConfig;
use zafira_core::auth::PgAccountStore;
use zafira_core::auth::password::prepare_dummy_hash;
use zafira_core::email::{EmailSender, LogEmailSender, SmtpEmailSender, SmtpSettings};
use zafira_core::oauth::{
    GoogleIdentityProvider, GoogleOAuthConfig, IdentityProvider, OAuthStateStore,
};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "zafira_api_server", about = "Zafira authentication API server")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/zafira"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Session token signing secret.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Global route prefix.
    #[arg(long, env = "API_PREFIX", default_value = "api")]
    api_prefix: String,

    /// Public frontend URL (verification links, post-login redirect).
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    frontend_url: String,

    /// Comma-separated CORS origins; defaults to the frontend URL.
    #[arg(long, env = "ALLOWED_ORIGIN")]
    allowed_origin: Option<String>,

    /// `Secure` flag of the session cookie; defaults to whether the frontend
    /// is served over https.
    #[arg(long, env = "COOKIE_SECURE")]
    cookie_secure: Option<bool>,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    google_client_secret: Option<String>,

    /// Redirect URI registered with Google.
    #[arg(long, env = "GOOGLE_CALLBACK_URL")]
    google_callback_url: Option<String>,

    /// SMTP relay host; verification links are only logged when unset.
    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME")]
    smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    #[arg(long, env = "SMTP_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    smtp_tls: bool,

    #[arg(
        long,
        env = "MAIL_FROM",
        default_value = "Zafira Solidaire <no-reply@zafira-solidaire.org>"
    )]
    mail_from: String,
}

fn build_mailer(args: &Args) -> Result<Arc<dyn EmailSender>, Box<dyn std::error::Error>> {
    let Some(host) = args.smtp_host.clone().filter(|h| !h.is_empty()) else {
        warn!("SMTP_HOST not set, verification links will only be logged");
        return Ok(Arc::new(LogEmailSender));
    };
    info!(%host, port = args.smtp_port, tls = args.smtp_tls, "using SMTP mailer");
    let sender = SmtpEmailSender::new(SmtpSettings {
        host,
        port: args.smtp_port,
        username: args.smtp_username.clone(),
        password: args.smtp_password.clone(),
        use_tls: args.smtp_tls,
        from: args.mail_from.clone(),
    })?;
    Ok(Arc::new(sender))
}

fn build_identity_provider(args: &Args) -> Option<Arc<dyn IdentityProvider>> {
    match (
        args.google_client_id.clone(),
        args.google_client_secret.clone(),
        args.google_callback_url.clone(),
    ) {
        (Some(client_id), Some(client_secret), Some(callback_url)) => {
            info!(%callback_url, "google sign-in enabled");
            Some(Arc::new(GoogleIdentityProvider::new(GoogleOAuthConfig::new(
                client_id,
                client_secret,
                callback_url,
            ))))
        }
        _ => {
            warn!("GOOGLE_CLIENT_ID/SECRET/CALLBACK_URL incomplete, google sign-in disabled");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,zafira_api=debug,zafira_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::new(
        format!("{}:{}", args.host, args.port),
        &args.api_prefix,
        args.jwt_secret.clone(),
        &args.frontend_url,
    )?;
    if let Some(origins) = args.allowed_origin.as_deref() {
        config = config.with_allowed_origins(origins);
    }
    if let Some(secure) = args.cookie_secure {
        config = config.with_cookie_secure(secure);
    }

    info!(
        bind_addr = %config.bind_addr,
        api_prefix = %config.api_prefix,
        frontend_url = %config.frontend_url,
        cookie_secure = config.cookie_secure,
        "starting zafira_api_server"
    );

    if !prepare_dummy_hash() {
        warn!("dummy password hash unavailable, unknown-email logins answer faster");
    }

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    zafira_api::migrate(&pool).await?;

    let oauth_states = Arc::new(OAuthStateStore::new());
    let _cleanup = oauth_states.spawn_cleanup_task();

    let state = AppState {
        store: Arc::new(PgAccountStore::new(pool)),
        config: config.clone(),
        mailer: build_mailer(&args)?,
        oauth_states,
        identity_provider: build_identity_provider(&args),
    };

    let app = zafira_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
