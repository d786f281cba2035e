use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::backend::{chain_matches, StateBackend};
use super::models::{ResourceIdentity, ResourceRecord};

/// JSON-file state store: one document per record, nested directories per
/// scope segment.
///
/// Layout: `<root>/<scope>/<scope>/<local_id>.json`. Writes go through a
/// temp file in the target directory followed by a rename, so a record is
/// always either the old snapshot or the new one, never a torn write.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, identity: &ResourceIdentity) -> PathBuf {
        let mut path = self.root.clone();
        for segment in &identity.scope_chain {
            path.push(segment);
        }
        path.push(format!("{}.json", identity.local_id));
        path
    }

    fn collect_records(dir: &Path, out: &mut Vec<ResourceRecord>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_records(&path, out)?;
            } else if path.extension().is_some_and(|ext| ext == "json") {
                let json = std::fs::read_to_string(&path)?;
                let record: ResourceRecord = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt state record at {}", path.display()))?;
                out.push(record);
            }
        }
        Ok(())
    }

    /// Remove now-empty scope directories after a delete, up to the root.
    fn prune_empty_dirs(&self, mut dir: PathBuf) {
        while dir.starts_with(&self.root) && dir != self.root {
            match std::fs::read_dir(&dir) {
                Ok(mut entries) => {
                    if entries.next().is_none() {
                        if std::fs::remove_dir(&dir).is_err() {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
            if !dir.pop() {
                break;
            }
        }
    }
}

#[async_trait]
impl StateBackend for FileBackend {
    async fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create state directory {}", self.root.display()))
    }

    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<ResourceRecord>> {
        let path = self.record_path(identity);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        let record = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt state record at {}", path.display()))?;
        Ok(Some(record))
    }

    async fn set(&self, record: &ResourceRecord) -> Result<()> {
        let path = self.record_path(&record.identity);
        let dir = path.parent().expect("record path always has a parent");
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(record)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to write state record {}", path.display()))?;
        Ok(())
    }

    async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        let path = self.record_path(identity);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(dir) = path.parent() {
            self.prune_empty_dirs(dir.to_path_buf());
        }
        Ok(())
    }

    async fn list(&self, scope_prefix: &[String]) -> Result<Vec<ResourceRecord>> {
        let mut dir = self.root.clone();
        for segment in scope_prefix {
            dir.push(segment);
        }
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        Self::collect_records(&dir, &mut records)?;
        // Directory walk already scoped us to the prefix; the filter guards
        // against records whose stored identity disagrees with their path.
        records.retain(|r| chain_matches(&r.identity.scope_chain, scope_prefix));
        records.sort_by(|a, b| a.address().cmp(&b.address()));
        Ok(records)
    }
}
