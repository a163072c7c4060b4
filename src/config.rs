use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub report_dir: String,
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub expose_error_details: bool,
    // Mobile-money gateway (optional)
    pub mpesa_base_url: String,
    pub mpesa_consumer_key: Option<String>,
    pub mpesa_consumer_secret: Option<String>,
    pub mpesa_shortcode: Option<String>,
    pub mpesa_passkey: Option<String>,
    pub mpesa_callback_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "86400".into())
                .parse()?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (5 * 1024 * 1024).to_string())
                .parse()?,
            report_dir: env::var("REPORT_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| env::temp_dir().to_string_lossy().into_owned()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            expose_error_details: env::var("EXPOSE_ERROR_DETAILS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            mpesa_base_url: env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".into()),
            mpesa_consumer_key: optional("MPESA_CONSUMER_KEY"),
            mpesa_consumer_secret: optional("MPESA_CONSUMER_SECRET"),
            mpesa_shortcode: optional("MPESA_SHORTCODE"),
            mpesa_passkey: optional("MPESA_PASSKEY"),
            mpesa_callback_url: optional("MPESA_CALLBACK_URL"),
        })
    }

    /// Configuration used by tests and tooling that never touch the network.
    pub fn for_tests(upload_dir: &str) -> Self {
        Self {
            database_url: "postgres://localhost/funeral_home_test".into(),
            jwt_secret: "test-secret".into(),
            jwt_expiry_seconds: 3600,
            upload_dir: upload_dir.into(),
            max_upload_bytes: 5 * 1024 * 1024,
            report_dir: env::temp_dir().to_string_lossy().into_owned(),
            host: "127.0.0.1".into(),
            port: 0,
            cors_origin: None,
            expose_error_details: false,
            mpesa_base_url: "http://127.0.0.1:9".into(),
            mpesa_consumer_key: None,
            mpesa_consumer_secret: None,
            mpesa_shortcode: None,
            mpesa_passkey: None,
            mpesa_callback_url: None,
        }
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}
