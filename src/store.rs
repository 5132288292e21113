//! Almacén de checkpoints de una sesión: `state.json`, `tree.json` y copias
//! de seguridad rotadas en `backups/`.
//!
//! Escritura: se serializa a `.<fichero>.tmp`, se hace `fsync`, la versión
//! anterior pasa a `backups/` y el temporal se renombra sobre el destino.
//! La versión anterior se enlaza (hard link) en `backups/` antes del
//! renombrado, de modo que el destino nunca desaparece; si el enlace no es
//! posible se mueve con `rename`.

use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::session::SessionState;
use crate::tree::{Tree, TreeDocument};

pub const STATE_FILE: &str = "state.json";
pub const TREE_FILE: &str = "tree.json";
pub const BACKUP_DIR: &str = "backups";

/// Prefijo del directorio de estado de una sesión.
pub const SESSION_DIR_PREFIX: &str = ".repo_synthesis_state_";

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    backup_keep: usize,
}

impl CheckpointStore {
    /// Almacén para `session_id` bajo `state_root`. No toca el disco.
    pub fn for_session(state_root: &Path, session_id: &str, backup_keep: usize) -> Self {
        Self::new(state_root.join(format!("{SESSION_DIR_PREFIX}{session_id}")), backup_keep)
    }

    pub fn new(dir: PathBuf, backup_keep: usize) -> Self {
        Self { dir, backup_keep }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn tree_path(&self) -> PathBuf {
        self.dir.join(TREE_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Guarda el estado de la sesión actualizando `last_checkpoint`.
    pub fn save_state(&self, state: &mut SessionState) -> Result<(), StoreError> {
        let previous = state.last_checkpoint;
        state.last_checkpoint = Some(Utc::now());
        if let Err(err) = self.write_json(STATE_FILE, "state", state) {
            state.last_checkpoint = previous;
            return Err(err);
        }
        debug!(
            "Estado guardado: {}/{} nodos procesados",
            state.processed_nodes, state.total_nodes
        );
        Ok(())
    }

    pub fn save_tree(&self, tree: &Tree) -> Result<(), StoreError> {
        self.write_json(TREE_FILE, "tree", &tree.to_document())?;
        debug!("Árbol guardado: {}/{} nodos", tree.processed_count(), tree.total_nodes());
        Ok(())
    }

    /// Guarda árbol y estado, en ese orden.
    pub fn checkpoint(&self, state: &mut SessionState, tree: &Tree) -> Result<(), StoreError> {
        self.save_tree(tree)?;
        self.save_state(state)?;
        debug!(
            "Checkpoint guardado: {}/{} nodos",
            state.processed_nodes, state.total_nodes
        );
        Ok(())
    }

    pub fn load_state(&self) -> Result<SessionState, StoreError> {
        let state: SessionState = self.read_json(&self.state_path())?;
        info!("Estado cargado para la sesión {}", state.session_id);
        Ok(state)
    }

    /// Carga el árbol reconstruyendo enlaces e índices desde cero.
    pub fn load_tree(&self) -> Result<Tree, StoreError> {
        let path = self.tree_path();
        let doc: TreeDocument = self.read_json(&path)?;
        let tree = Tree::from_document(doc).map_err(|reason| StoreError::CorruptTree {
            path: path.clone(),
            reason,
        })?;
        info!(
            "Árbol cargado: {}/{} nodos procesados",
            tree.processed_count(),
            tree.total_nodes()
        );
        Ok(tree)
    }

    /// Hay estado persistido para esa sesión y no está completada.
    pub fn can_resume(&self, session_id: &str) -> bool {
        match self.read_json::<SessionState>(&self.state_path()) {
            Ok(state) => state.session_id == session_id && state.completed_at.is_none(),
            Err(err) => {
                debug!("Sesión {session_id} no reanudable: {err}");
                false
            }
        }
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        if !path.exists() {
            return Err(StoreError::Missing {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_json<T: Serialize>(&self, file_name: &str, kind: &str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let target = self.dir.join(file_name);
        let tmp = self.dir.join(format!(".{file_name}.tmp"));
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: target.clone(),
            source,
        })?;

        let mut tmp_file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        tmp_file.write_all(&json).map_err(|e| StoreError::io(&tmp, e))?;
        tmp_file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        drop(tmp_file);

        if target.exists() {
            self.backup(&target, kind)?;
        }
        fs::rename(&tmp, &target).map_err(|e| StoreError::io(&target, e))?;

        self.prune_backups(kind);
        Ok(())
    }

    fn backup(&self, target: &Path, kind: &str) -> Result<PathBuf, StoreError> {
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir).map_err(|e| StoreError::io(&backup_dir, e))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let mut backup = backup_dir.join(format!("{kind}_{stamp}.json"));
        let mut n = 1;
        while backup.exists() {
            backup = backup_dir.join(format!("{kind}_{stamp}_{n}.json"));
            n += 1;
        }

        if fs::hard_link(target, &backup).is_err() {
            fs::rename(target, &backup).map_err(|e| StoreError::io(&backup, e))?;
        }
        Ok(backup)
    }

    /// Backups de un tipo, del más antiguo al más reciente.
    pub fn backups(&self, kind: &str) -> Vec<PathBuf> {
        let prefix = format!("{kind}_");
        let mut found: Vec<PathBuf> = match fs::read_dir(self.backup_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        found.sort();
        found
    }

    fn prune_backups(&self, kind: &str) {
        let backups = self.backups(kind);
        if backups.len() <= self.backup_keep {
            return;
        }
        let excess = backups.len() - self.backup_keep;
        for old in &backups[..excess] {
            if let Err(e) = fs::remove_file(old) {
                warn!("No se pudo eliminar el backup {}: {e}", old.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::models::{NodeKind, NodeOutcome};
    use crate::session::Phase;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::for_session(dir.path(), "abc12345", 5)
    }

    fn state() -> SessionState {
        SessionState::new("abc12345", "/r".into(), "tema", TreeConfig::default())
    }

    fn tree() -> Tree {
        let mut tree = Tree::new(PathBuf::from("/r"), 10);
        let root = tree.root_id();
        let a = tree.add_child(root, PathBuf::from("/r/a.rs"), NodeKind::File);
        let empty = tree.add_child(root, PathBuf::from("/r/empty"), NodeKind::Directory);
        let bad = tree.add_child(root, PathBuf::from("/r/bad.rs"), NodeKind::File);
        tree.complete(
            a,
            NodeOutcome::Generated {
                text: "síntesis".into(),
                key_insights: vec!["idea".into()],
            },
            Some("fn a() {}".into()),
        );
        tree.complete(empty, NodeOutcome::NoContent, None);
        tree.complete(bad, NodeOutcome::Failed { reason: "boom".into() }, None);
        tree
    }

    #[test]
    fn save_and_load_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut state = state();
        state.phase = Phase::Processing;

        store.save_state(&mut state).unwrap();
        assert!(state.last_checkpoint.is_some());

        let loaded = store.load_state().unwrap();
        assert_eq!(loaded, state);
        assert!(!store.dir().join(".state.json.tmp").exists());
    }

    #[test]
    fn checkpoint_round_trips_tree() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tree = tree();
        let mut state = state();

        store.checkpoint(&mut state, &tree).unwrap();
        let loaded = store.load_tree().unwrap();

        assert_eq!(loaded.total_nodes(), 4);
        assert_eq!(loaded.processed_count(), 3);
        for (left, right) in tree.iter().zip(loaded.iter()) {
            assert_eq!(left.path(), right.path());
            assert_eq!(left.synthesis(), right.synthesis());
            assert_eq!(left.error(), right.error());
            assert_eq!(left.key_insights(), right.key_insights());
        }
    }

    #[test]
    fn previous_versions_rotate_into_bounded_backups() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::for_session(dir.path(), "abc12345", 3);
        let mut state = state();

        for i in 0..8 {
            state.processed_nodes = i;
            store.save_state(&mut state).unwrap();
        }

        let backups = store.backups("state");
        assert_eq!(backups.len(), 3);
        assert!(store.backups("tree").is_empty());

        // El más reciente de los backups es la penúltima versión.
        let newest: SessionState =
            serde_json::from_slice(&fs::read(backups.last().unwrap()).unwrap()).unwrap();
        assert_eq!(newest.processed_nodes, 6);
        assert_eq!(store.load_state().unwrap().processed_nodes, 7);
    }

    #[test]
    fn can_resume_requires_matching_incomplete_session() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.can_resume("abc12345"));

        let mut state = state();
        store.save_state(&mut state).unwrap();
        assert!(store.can_resume("abc12345"));
        assert!(!store.can_resume("otra"));

        state.mark_completed();
        store.save_state(&mut state).unwrap();
        assert!(!store.can_resume("abc12345"));
    }

    #[test]
    fn missing_and_corrupt_files_are_errors() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(store.load_state(), Err(StoreError::Missing { .. })));
        assert!(matches!(store.load_tree(), Err(StoreError::Missing { .. })));

        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.state_path(), "{ no es json").unwrap();
        assert!(matches!(store.load_state(), Err(StoreError::Json { .. })));
        assert!(!store.can_resume("abc12345"));

        let mut doc = tree().to_document();
        doc.root = PathBuf::from("/desconocida");
        fs::write(store.tree_path(), serde_json::to_vec(&doc).unwrap()).unwrap();
        assert!(matches!(store.load_tree(), Err(StoreError::CorruptTree { .. })));
    }

    #[test]
    fn write_failure_is_propagated() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "no soy un directorio").unwrap();
        let store = CheckpointStore::new(blocker.join("session"), 5);

        let mut state = state();
        let err = store.save_state(&mut state).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(state.last_checkpoint.is_none());
    }
}
