use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

pub const HOUSEHOLD_CODE_KEY: &str = "household_code";
pub const IS_LOGGED_KEY: &str = "is_logged";

/// Small key/value settings store. Missing keys read as `""` / `false`.
#[async_trait]
pub trait Preferences: Send + Sync {
    async fn get_string(&self, key: &str) -> anyhow::Result<String>;
    async fn put_string(&self, value: &str, key: &str) -> anyhow::Result<()>;
    async fn get_bool(&self, key: &str) -> anyhow::Result<bool>;
    async fn put_bool(&self, value: bool, key: &str) -> anyhow::Result<()>;
}

/// JSON object on disk, rewritten on every put. `in_memory` skips the file.
pub struct JsonPreferences {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl JsonPreferences {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<Map<String, Value>>(&raw)
                .with_context(|| format!("parse preferences {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read preferences {}", path.display()))
            }
        };
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    /// Memory only changes once the file write succeeded.
    async fn put(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let mut values = self.values.lock().await;
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        if let Some(path) = &self.path {
            let raw = serde_json::to_vec_pretty(&next)?;
            tokio::fs::write(path, raw)
                .await
                .with_context(|| format!("write preferences {}", path.display()))?;
        }
        *values = next;
        Ok(())
    }
}

#[async_trait]
impl Preferences for JsonPreferences {
    async fn get_string(&self, key: &str) -> anyhow::Result<String> {
        let values = self.values.lock().await;
        Ok(values
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn put_string(&self, value: &str, key: &str) -> anyhow::Result<()> {
        self.put(key, Value::String(value.to_string())).await
    }

    async fn get_bool(&self, key: &str) -> anyhow::Result<bool> {
        let values = self.values.lock().await;
        Ok(values.get(key).and_then(Value::as_bool).unwrap_or(false))
    }

    async fn put_bool(&self, value: bool, key: &str) -> anyhow::Result<()> {
        self.put(key, Value::Bool(value)).await
    }
}
