use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Without
/// `DATABASE_URL` the server runs on in-memory stores.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for in-flight generation jobs on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Deadline for one background generation job (default: `300`).
    pub job_timeout_secs: u64,
    /// Timeout for a single media download (default: `30`).
    pub media_fetch_timeout_secs: u64,
    /// Interval between SSE heartbeat events (default: `15`).
    pub sse_heartbeat_secs: u64,
    /// Per-subscriber notification mailbox size (default: `16`).
    pub mailbox_capacity: usize,
    /// Directory the local storage sink writes under (default: `./storage`).
    pub storage_root: String,
    /// Prefix joined onto stored locators (default: empty).
    pub storage_public_prefix: String,
    /// Postgres connection string. `None` selects the in-memory stores.
    pub database_url: Option<String>,
    /// JSON provider/model catalog for the in-memory config store.
    pub catalog_path: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `JOB_TIMEOUT_SECS`         | `300`                   |
    /// | `MEDIA_FETCH_TIMEOUT_SECS` | `30`                    |
    /// | `SSE_HEARTBEAT_SECS`       | `15`                    |
    /// | `MAILBOX_CAPACITY`         | `16`                    |
    /// | `STORAGE_ROOT`             | `./storage`             |
    /// | `STORAGE_PUBLIC_PREFIX`    | (empty)                 |
    /// | `DATABASE_URL`             | (unset)                 |
    /// | `CATALOG_PATH`             | (unset)                 |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs = env_u64("SHUTDOWN_TIMEOUT_SECS", 30);
        let job_timeout_secs = env_u64("JOB_TIMEOUT_SECS", 300);
        let media_fetch_timeout_secs = env_u64("MEDIA_FETCH_TIMEOUT_SECS", 30);
        let sse_heartbeat_secs = env_u64("SSE_HEARTBEAT_SECS", 15);

        let mailbox_capacity: usize = std::env::var("MAILBOX_CAPACITY")
            .unwrap_or_else(|_| "16".into())
            .parse()
            .expect("MAILBOX_CAPACITY must be a valid usize");

        let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./storage".into());
        let storage_public_prefix = std::env::var("STORAGE_PUBLIC_PREFIX").unwrap_or_default();

        let database_url = non_empty_var("DATABASE_URL");
        let catalog_path = non_empty_var("CATALOG_PATH");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            job_timeout_secs,
            media_fetch_timeout_secs,
            sse_heartbeat_secs,
            mailbox_capacity,
            storage_root,
            storage_public_prefix,
            database_url,
            catalog_path,
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn sse_heartbeat(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat_secs.max(1))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid u64")),
        Err(_) => default,
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
