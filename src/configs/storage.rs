use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_resume_path")]
    pub resume_path: String,
    #[serde(default = "default_orphan_path")]
    pub orphan_path: String,
    #[serde(default = "default_resume_ttl_days")]
    pub resume_ttl_days: u64,
    /// Positions below this are never written.
    #[serde(default = "default_min_resume_ms")]
    pub min_resume_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            resume_path: default_resume_path(),
            orphan_path: default_orphan_path(),
            resume_ttl_days: default_resume_ttl_days(),
            min_resume_ms: default_min_resume_ms(),
        }
    }
}

fn default_resume_path() -> String {
    "data/resume.json".to_string()
}

fn default_orphan_path() -> String {
    "data/backend-sessions.json".to_string()
}

fn default_resume_ttl_days() -> u64 {
    7
}

fn default_min_resume_ms() -> u64 {
    30_000
}
