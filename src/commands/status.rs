//! Status command

use crate::config::Config;
use crate::db::{Db, GlobalStats};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// System status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub owner: String,
    pub model_backend: String,
    pub model_name: String,
    pub db_file: String,
    pub stats: GlobalStats,
}

/// Collect system status
pub async fn cmd_status(config: &Config, db: &Db) -> Result<SystemStatus> {
    let stats = db.get_global_stats().await?;

    Ok(SystemStatus {
        owner: config.owner.clone(),
        model_backend: config.model.backend_url.clone(),
        model_name: config.model.name.clone(),
        db_file: config.paths.db_file.display().to_string(),
        stats,
    })
}
