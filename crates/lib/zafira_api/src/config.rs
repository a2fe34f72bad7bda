//! API server configuration.
//!
//! Built once by the binary from CLI/env and carried in [`crate::AppState`];
//! nothing below this layer reads the environment.

use thiserror::Error;

/// Configuration errors detected at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a non-empty value")]
    MissingJwtSecret,

    #[error("FRONTEND_URL must be an absolute http(s) URL, got '{0}'")]
    InvalidFrontendUrl(String),
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:3001").
    pub bind_addr: String,
    /// Global route prefix without slashes (e.g. "api"); empty for none.
    pub api_prefix: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Public frontend origin, used for verification links and redirects.
    pub frontend_url: String,
    /// Origins allowed by CORS (credentials enabled).
    pub allowed_origins: Vec<String>,
    /// `Secure` attribute of the session cookie.
    pub cookie_secure: bool,
}

impl ApiConfig {
    /// Build a configuration, normalizing the prefix and frontend URL.
    ///
    /// A blank secret is refused.
    pub fn new(
        bind_addr: impl Into<String>,
        api_prefix: &str,
        jwt_secret: impl Into<String>,
        frontend_url: &str,
    ) -> Result<Self, ConfigError> {
        let jwt_secret = jwt_secret.into();
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        let frontend_url = frontend_url.trim().trim_end_matches('/').to_string();
        if !(frontend_url.starts_with("http://") || frontend_url.starts_with("https://")) {
            return Err(ConfigError::InvalidFrontendUrl(frontend_url));
        }
        Ok(Self {
            bind_addr: bind_addr.into(),
            api_prefix: api_prefix.trim().trim_matches('/').to_string(),
            cookie_secure: frontend_url.starts_with("https://"),
            allowed_origins: vec![frontend_url.clone()],
            jwt_secret,
            frontend_url,
        })
    }

    /// Replace the CORS origins with a comma-separated list.
    pub fn with_allowed_origins(mut self, origins: &str) -> Self {
        let origins: Vec<String> = origins
            .split(',')
            .map(|o| o.trim().trim_end_matches('/'))
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if !origins.is_empty() {
            self.allowed_origins = origins;
        }
        self
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Route prefix as a path (`/api`), or `None` when routes are mounted at
    /// the root.
    pub fn route_prefix(&self) -> Option<String> {
        (!self.api_prefix.is_empty()).then(|| format!("/{}", self.api_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_prefix_and_frontend() {
        let config = ApiConfig::new("0.0.0.0:3001", "/api/", "s3cret", "http://localhost:3000/")
            .unwrap();
        assert_eq!(config.api_prefix, "api");
        assert_eq!(config.route_prefix().as_deref(), Some("/api"));
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert!(!config.cookie_secure);
    }

    #[test]
    fn blank_secret_is_fatal() {
        let err = ApiConfig::new("x", "api", "   ", "http://localhost:3000").unwrap_err();
        assert_eq!(err, ConfigError::MissingJwtSecret);
    }

    #[test]
    fn relative_frontend_is_rejected() {
        let err = ApiConfig::new("x", "api", "s", "localhost:3000").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrontendUrl(_)));
    }

    #[test]
    fn https_frontend_defaults_to_secure_cookie() {
        let config = ApiConfig::new("x", "", "s", "https://zafira.org").unwrap();
        assert!(config.cookie_secure);
        assert_eq!(config.route_prefix(), None);
        assert!(!config.with_cookie_secure(false).cookie_secure);
    }

    #[test]
    fn allowed_origins_are_split_and_trimmed() {
        let config = ApiConfig::new("x", "api", "s", "http://localhost:3000")
            .unwrap()
            .with_allowed_origins(" https://a.org/, https://b.org ,,");
        assert_eq!(config.allowed_origins, vec!["https://a.org", "https://b.org"]);

        let unchanged = ApiConfig::new("x", "api", "s", "http://localhost:3000")
            .unwrap()
            .with_allowed_origins("");
        assert_eq!(unchanged.allowed_origins, vec!["http://localhost:3000"]);
    }
}
