//! Filesystem layout configuration for the post-completion workflow.

/// Directory roots used when building paths for the classification
/// agent and the move step.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Where aria2 writes finished payloads.
    pub downloads_base_dir: String,
    /// Destination root for organized media.
    pub assets_base_dir: String,
}

impl SyncConfig {
    /// Load from `DOWNLOADS_BASE_DIR` and `ASSETS_BASE_DIR`.
    ///
    /// | Env Var              | Default          |
    /// |----------------------|------------------|
    /// | `DOWNLOADS_BASE_DIR` | `/downloads`     |
    /// | `ASSETS_BASE_DIR`    | `/media/library` |
    pub fn from_env() -> Self {
        Self {
            downloads_base_dir: std::env::var("DOWNLOADS_BASE_DIR")
                .unwrap_or_else(|_| "/downloads".into()),
            assets_base_dir: std::env::var("ASSETS_BASE_DIR")
                .unwrap_or_else(|_| "/media/library".into()),
        }
    }
}
