use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DB_FILE: &str = "chicken.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chicken"),
            verbose: false,
        }
    }
}

impl CliConfig {
    pub fn resolve(data_dir: Option<PathBuf>, verbose: bool) -> Self {
        let mut config = Self::default();
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        config.verbose = verbose;
        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn log_filter(&self) -> String {
        let level = if self.verbose { "debug" } else { "info" };
        format!(
            "chicken={},chicken_pool={},chicken_core={}",
            level, level, level
        )
    }
}
