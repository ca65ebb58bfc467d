use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub idle_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: String,
    pub upload_public_base: String,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
        let upload_public_base =
            std::env::var("UPLOAD_PUBLIC_BASE").unwrap_or_else(|_| "/uploads".into());
        let session = SessionConfig {
            idle_minutes: std::env::var("SESSION_IDLE_MINUTES")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        };
        Ok(Self {
            database_url,
            upload_dir,
            upload_public_base,
            session,
        })
    }
}
