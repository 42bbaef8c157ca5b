const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WS_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_DB_PATH: &str = "ripple.db";
const DEFAULT_AUTH_SECRET: &str = "ripple-dev-secret";

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub ws_addr: String,
    pub db_path: String,
    pub auth_secret: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            http_addr: std::env::var("RIPPLE_HTTP_ADDR")
                .unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string()),
            ws_addr: std::env::var("RIPPLE_WS_ADDR")
                .unwrap_or_else(|_| DEFAULT_WS_ADDR.to_string()),
            db_path: std::env::var("RIPPLE_DB_PATH")
                .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            auth_secret: std::env::var("RIPPLE_AUTH_SECRET")
                .unwrap_or_else(|_| DEFAULT_AUTH_SECRET.to_string()),
        }
    }
}
