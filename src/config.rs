use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Root node of every household subtree in the tree store.
    pub module: String,
    pub days: usize,
    pub min_visible_ms: u64,
    pub max_redraws: usize,
    pub preferences_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub planner: PlannerConfig,
    pub storage: StorageConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            module: "recipe_of_the_week".into(),
            days: 5,
            min_visible_ms: 800,
            max_redraws: 64,
            preferences_path: PathBuf::from("dishdash-prefs.json"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let defaults = PlannerConfig::default();
        let planner = PlannerConfig {
            module: std::env::var("WEEK_MODULE").unwrap_or(defaults.module),
            days: std::env::var("WEEK_DAYS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|d| *d > 0)
                .unwrap_or(defaults.days),
            min_visible_ms: std::env::var("GENERATION_MIN_VISIBLE_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.min_visible_ms),
            max_redraws: std::env::var("GENERATION_MAX_REDRAWS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.max_redraws),
            preferences_path: std::env::var("PREFERENCES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.preferences_path),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT")?,
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "dishdash".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY")?,
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        Ok(Self {
            database_url,
            planner,
            storage,
        })
    }
}
