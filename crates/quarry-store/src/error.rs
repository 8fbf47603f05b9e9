#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("manifest for run {run_id} is corrupt: {source}")]
    ManifestCorrupt {
        run_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
