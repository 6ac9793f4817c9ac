//! One JSON file per graph under a data directory.
//!
//! Saves write a sibling temp file and rename it into place, so a reader sees
//! either the previous or the new record. Writers are serialised per store;
//! concurrent saves of the same id resolve as last writer wins.

use crate::models::GraphConfig;
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, warn};

const EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("graph storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode graph: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid graph id '{0}'")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl GraphStore {
    /// Opens the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                dir,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Every readable graph, ordered by file name. Unreadable files are
    /// logged and skipped.
    pub fn list(&self) -> Result<Vec<GraphConfig>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.dir())?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
            .collect();
        paths.sort();

        let mut graphs = Vec::with_capacity(paths.len());
        for path in paths {
            match read_graph(&path) {
                Ok(graph) => graphs.push(graph),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable graph file"),
            }
        }

        Ok(graphs)
    }

    /// Looks up a graph. Unknown ids, malformed ids and corrupt records all
    /// read as absent; corrupt records are logged.
    pub fn get(&self, id: &str) -> Result<Option<GraphConfig>> {
        if !is_valid_id(id) {
            return Ok(None);
        }

        let path = self.path_for(id);
        match read_graph(&path) {
            Ok(graph) => Ok(Some(graph)),
            Err(StorageError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(StorageError::Encode(err)) => {
                warn!(%id, error = %err, "graph record is not valid JSON");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn save(&self, graph: &GraphConfig) -> Result<()> {
        if !is_valid_id(&graph.id) {
            return Err(StorageError::InvalidId(graph.id.clone()));
        }

        let encoded = serde_json::to_vec_pretty(graph)?;
        let path = self.path_for(&graph.id);
        let staging = path.with_extension(format!("{EXTENSION}.tmp"));

        let _guard = self.inner.write_lock.lock();
        fs::write(&staging, encoded)?;
        if let Err(err) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        debug!(id = %graph.id, "graph saved");
        Ok(())
    }

    /// Removes a graph; `false` when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !is_valid_id(id) {
            return Ok(false);
        }

        let _guard = self.inner.write_lock.lock();
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir().join(format!("{id}.{EXTENSION}"))
    }
}

fn read_graph(path: &Path) -> Result<GraphConfig> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// Ids double as file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// `graph_<unix millis>_<9 random lowercase alphanumerics>`.
pub fn generate_id() -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(9)
        .collect();
    format!("graph_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Aggregate;
    use crate::models::{ChartConfig, ChartType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn graph(id: &str, name: &str) -> GraphConfig {
        GraphConfig {
            id: id.to_string(),
            name: name.to_string(),
            query: "select day, n from t".to_string(),
            location: "EU".to_string(),
            chart_type: ChartType::Bar,
            chart_config: ChartConfig {
                x_axis: "day".to_string(),
                y_axis: "n".to_string(),
                aggregate: Aggregate::Sum,
                group_by: None,
                bar_layout: None,
            },
            parameters: None,
        }
    }

    fn store() -> (TempDir, GraphStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = GraphStore::open(dir.path().join("graphs")).expect("store should open");
        (dir, store)
    }

    #[test]
    fn failed_save_leaves_no_staging_file() {
        let (_dir, store) = store();
        let blocked = store.dir().join("graph_1.json");
        fs::create_dir(&blocked).expect("create blocking dir");
        fs::write(blocked.join("keep"), b"x").expect("fill blocking dir");

        let err = store.save(&graph("graph_1", "first")).expect_err("rename should fail");
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!store.dir().join("graph_1.json.tmp").exists());
    }

    #[test]
    fn save_get_list_delete() {
        let (_dir, store) = store();
        assert!(store.list().expect("list").is_empty());

        store.save(&graph("graph_2", "second")).expect("save");
        store.save(&graph("graph_1", "first")).expect("save");

        let fetched = store.get("graph_1").expect("get").expect("graph exists");
        assert_eq!(fetched, graph("graph_1", "first"));

        let names: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);

        assert!(store.delete("graph_1").expect("delete"));
        assert!(!store.delete("graph_1").expect("delete again"));
        assert_eq!(store.get("graph_1").expect("get"), None);
    }

    #[test]
    fn save_overwrites_existing_record() {
        let (_dir, store) = store();
        store.save(&graph("graph_1", "before")).expect("save");
        store.save(&graph("graph_1", "after")).expect("save");

        assert_eq!(store.list().expect("list").len(), 1);
        assert_eq!(store.get("graph_1").expect("get").map(|g| g.name), Some("after".into()));
    }

    #[test]
    fn corrupt_files_are_skipped() {
        let (_dir, store) = store();
        store.save(&graph("graph_ok", "ok")).expect("save");
        fs::write(store.dir().join("graph_bad.json"), b"{not json").expect("write");
        fs::write(store.dir().join("notes.txt"), b"ignored").expect("write");

        let graphs = store.list().expect("list");
        assert_eq!(graphs.len(), 1);
        assert_eq!(store.get("graph_bad").expect("get"), None);
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let (_dir, store) = store();
        assert_eq!(store.get("../secrets").expect("get"), None);
        assert!(!store.delete("../secrets").expect("delete"));
        assert!(matches!(
            store.save(&graph("a/b", "bad")),
            Err(StorageError::InvalidId(_))
        ));
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let first = generate_id();
        let second = generate_id();
        assert!(first.starts_with("graph_"));
        assert!(is_valid_id(&first));
        assert_ne!(first, second);
        let suffix = first.rsplit('_').next().expect("suffix");
        assert_eq!(suffix.len(), 9);
    }
}
