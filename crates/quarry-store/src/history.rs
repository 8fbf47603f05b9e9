//! File-based run history: one directory per run holding snapshots of both
//! workspace roots plus a pretty-printed JSON manifest.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use quarry_core::ids::RunId;
use quarry_core::manifest::{RunManifest, RunSummary};
use quarry_core::messages::ChatMessage;
use quarry_core::tools::WorkspaceRoots;

use crate::error::StoreError;

pub const MANIFEST_FILE: &str = "run_details.json";
const DATA_DIR: &str = "data";
const OUTPUTS_DIR: &str = "outputs";

/// Store rooted at a history directory. Run directories are written once at
/// save and only ever replaced wholesale, never merged.
pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }

    /// Persist a finished run: snapshot both workspace roots and write the
    /// manifest. Returns the id the run is stored under.
    #[instrument(skip(self, manifest, roots), fields(run_id = %manifest.id))]
    pub fn save(
        &self,
        manifest: &RunManifest,
        roots: &WorkspaceRoots,
    ) -> Result<RunId, StoreError> {
        let dir = self.run_dir(&manifest.id);
        fs::create_dir_all(&dir)?;

        copy_dir_recursive(&roots.data, &dir.join(DATA_DIR))?;
        copy_dir_recursive(&roots.outputs, &dir.join(OUTPUTS_DIR))?;

        let json = serde_json::to_string_pretty(manifest).map_err(|e| {
            StoreError::ManifestCorrupt {
                run_id: manifest.id.to_string(),
                source: e,
            }
        })?;
        fs::write(dir.join(MANIFEST_FILE), json)?;

        info!(path = %dir.display(), "run history saved");
        Ok(manifest.id.clone())
    }

    /// Summaries of every stored run, newest first. Unreadable or malformed
    /// manifests are skipped with a warning, never failing the listing.
    pub fn list(&self) -> Result<Vec<RunSummary>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let manifest_path = entry.path().join(MANIFEST_FILE);
            let raw = match fs::read_to_string(&manifest_path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "skipping run with unreadable manifest");
                    continue;
                }
            };
            match serde_json::from_str::<RunManifest>(&raw) {
                Ok(manifest) => summaries.push(RunSummary::from(&manifest)),
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "skipping run with malformed manifest");
                }
            }
        }

        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(summaries)
    }

    /// Read one run's manifest.
    pub fn load_manifest(&self, run_id: &RunId) -> Result<RunManifest, StoreError> {
        let path = self.run_dir(run_id).join(MANIFEST_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::ManifestCorrupt {
            run_id: run_id.to_string(),
            source: e,
        })
    }

    /// Make a stored run the active workspace: clear both active roots, then
    /// copy the run's snapshots back in. The manifest is parsed before
    /// anything is cleared, so a corrupt run never destroys the workspace.
    #[instrument(skip(self, roots), fields(run_id = %run_id))]
    pub fn load(&self, run_id: &RunId, roots: &WorkspaceRoots) -> Result<RunManifest, StoreError> {
        let manifest = self.load_manifest(run_id)?;
        let dir = self.run_dir(run_id);

        clear_dir(&roots.data)?;
        clear_dir(&roots.outputs)?;
        copy_dir_recursive(&dir.join(DATA_DIR), &roots.data)?;
        copy_dir_recursive(&dir.join(OUTPUTS_DIR), &roots.outputs)?;

        info!("run restored into the active workspace");
        Ok(manifest)
    }

    /// Reconstruct the message thread of a stored run, optionally filtered to
    /// one agent's messages.
    pub fn replay(
        &self,
        run_id: &RunId,
        agent: Option<&str>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let manifest = self.load_manifest(run_id)?;
        let thread = manifest.team_state.message_thread;
        Ok(match agent {
            None => thread,
            Some(name) => thread
                .into_iter()
                .filter(|msg| msg.source() == name)
                .collect(),
        })
    }
}

/// Recursively copy `src` into `dst`, creating `dst` first. A missing `src`
/// copies nothing but still yields the empty destination.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dst)?;
    if !src.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove every entry of `dir` (files and subtrees), creating the directory
/// if it does not exist yet.
pub fn clear_dir(dir: &Path) -> Result<(), StoreError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
