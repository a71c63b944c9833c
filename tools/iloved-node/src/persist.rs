use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use iloved_docstore::{Blob, MemoryBlobStore, MemoryStore, StoreSnapshot};
use serde::{Deserialize, Serialize};

/// Everything the node keeps between restarts.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub store: StoreSnapshot,
    #[serde(default)]
    pub blobs: BTreeMap<String, Blob>,
}

impl PersistedState {
    pub fn capture(store: &MemoryStore, blobs: &MemoryBlobStore) -> anyhow::Result<Self> {
        Ok(Self {
            store: store.export()?,
            blobs: blobs.export(),
        })
    }

    pub fn restore(self, blob_base_url: &str) -> anyhow::Result<(MemoryStore, MemoryBlobStore)> {
        let store = MemoryStore::from_snapshot(self.store)?;
        let blobs = MemoryBlobStore::new(blob_base_url);
        blobs.import(self.blobs);
        Ok((store, blobs))
    }
}

pub fn default_state_path() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    data.join("iloved").join("state.json")
}

/// Read the state file. A missing file is a fresh node, not an error.
pub fn load_state(path: &Path) -> anyhow::Result<Option<PersistedState>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let state: PersistedState = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        documents = state.store.len(),
        blobs = state.blobs.len(),
        "loaded state"
    );
    Ok(Some(state))
}

/// Write the state file through a temporary sibling so a crash mid-write
/// leaves the previous state intact.
pub fn save_state(path: &Path, state: &PersistedState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, data).with_context(|| format!("failed to write {}", staging.display()))?;
    std::fs::rename(&staging, path).with_context(|| format!("failed to replace {}", path.display()))?;
    tracing::debug!(path = %path.display(), revision = state.store.revision, "saved state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use iloved_docstore::{BlobStore, DocumentStore};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn state_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        assert!(load_state(&path).unwrap().is_none());

        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new("http://node/blobs");
        let users = iloved_docstore::CollectionPath::root("users").unwrap();
        let mut fields = iloved_docstore::Fields::new();
        fields.insert("name".into(), json!("Alice"));
        store.create_at(&users.doc("a@x.com").unwrap(), fields).await.unwrap();
        let url = blobs.upload("img/1", vec![1, 2, 3], "image/png").await.unwrap();

        save_state(&path, &PersistedState::capture(&store, &blobs).unwrap()).unwrap();
        let (store, blobs) = load_state(&path)
            .unwrap()
            .unwrap()
            .restore("http://node/blobs")
            .unwrap();

        let doc = store.get(&users.doc("a@x.com").unwrap()).await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("Alice"));
        assert_eq!(blobs.download(&url).await.unwrap().bytes, vec![1, 2, 3]);
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_state(&path).is_err());
    }
}
