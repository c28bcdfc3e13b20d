use std::env;
use std::path::PathBuf;

/// How orchestrator work is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Dispatch to a background task and return immediately (default)
    Background,
    /// Run to completion inside the request (small deployments, tests)
    Inline,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub allowed_origins: Vec<String>,
    /// Remote storage backend name (currently `local`)
    pub storage_backend: String,
    /// Root directory for the `local` storage backend
    pub storage_root: PathBuf,
    /// Scratch directory for artifacts in flight
    pub staging_dir: PathBuf,
    /// 32-byte AES-256-GCM key, hex encoded; required only when encryption is used
    pub encryption_key: Option<[u8; 32]>,
    pub job_mode: JobMode,
    /// Seconds before an advisory lock on a backup record expires
    pub lock_timeout_secs: i64,
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/healthrec.db?mode=rwc".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());

        let storage_root = env::var("STORAGE_ROOT")
            .unwrap_or_else(|_| "./data/remote".to_string())
            .into();

        let staging_dir = env::var("STAGING_DIR")
            .unwrap_or_else(|_| "./data/staging".to_string())
            .into();

        let encryption_key = match env::var("BACKUP_ENCRYPTION_KEY") {
            Ok(hex_key) => Some(Self::parse_key(&hex_key)?),
            Err(_) => None,
        };

        let job_mode = match env::var("JOB_MODE")
            .unwrap_or_else(|_| "background".to_string())
            .as_str()
        {
            "background" => JobMode::Background,
            "inline" => JobMode::Inline,
            other => return Err(format!("Invalid JOB_MODE: {}", other)),
        };

        let lock_timeout_secs = env::var("LOCK_TIMEOUT_SECS")
            .unwrap_or_else(|_| crate::constants::DEFAULT_LOCK_TIMEOUT_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid LOCK_TIMEOUT_SECS")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Config {
            server_host,
            server_port,
            database_url,
            allowed_origins,
            storage_backend,
            storage_root,
            staging_dir,
            encryption_key,
            job_mode,
            lock_timeout_secs,
            environment,
        })
    }

    /// Decode a hex-encoded 32-byte encryption key
    fn parse_key(hex_key: &str) -> Result<[u8; 32], String> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|_| "BACKUP_ENCRYPTION_KEY must be hex encoded".to_string())?;
        bytes
            .try_into()
            .map_err(|_| "BACKUP_ENCRYPTION_KEY must decode to exactly 32 bytes".to_string())
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
