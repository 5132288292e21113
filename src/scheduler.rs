//! Selección del siguiente lote de nodos listos, de las hojas a la raíz.
//!
//! Se recorren las profundidades ocupadas de la más profunda a la raíz. En
//! cada una, un fichero sin procesar siempre está listo y un directorio sin
//! procesar lo está solo si todos sus hijos ya están procesados. Se devuelve
//! el primer conjunto no vacío; un vector vacío significa que no queda nada
//! que hacer (o que el árbol está atascado, ver [`is_stalled`]).

use crate::models::NodeId;
use crate::tree::Tree;

pub fn next_batch(tree: &Tree) -> Vec<NodeId> {
    for depth in tree.depths_deepest_first() {
        let ready: Vec<NodeId> = tree
            .nodes_at_depth(depth)
            .iter()
            .copied()
            .filter(|&id| is_ready(tree, id))
            .collect();
        if !ready.is_empty() {
            return ready;
        }
    }
    Vec::new()
}

/// Un nodo sin procesar cuyos hijos (si los tiene) están todos procesados.
pub fn is_ready(tree: &Tree, id: NodeId) -> bool {
    let node = tree.node(id);
    if node.processed() {
        return false;
    }
    node.is_file() || node.children().iter().all(|&c| tree.node(c).processed())
}

/// No hay lote disponible pero quedan nodos sin procesar.
pub fn is_stalled(tree: &Tree) -> bool {
    !tree.is_complete() && next_batch(tree).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeKind, NodeOutcome};
    use std::path::{Path, PathBuf};

    fn done(tree: &mut Tree, path: &str) {
        let id = tree.get(Path::new(path)).unwrap();
        tree.complete(
            id,
            NodeOutcome::Generated {
                text: path.to_string(),
                key_insights: Vec::new(),
            },
            None,
        );
    }

    fn paths(tree: &Tree, batch: &[NodeId]) -> Vec<String> {
        batch
            .iter()
            .map(|&id| tree.node(id).path().display().to_string())
            .collect()
    }

    fn fixture() -> Tree {
        // /r
        // ├── a/
        // │   ├── deep/
        // │   │   └── z.rs
        // │   └── y.rs
        // ├── empty/
        // └── top.md
        let mut tree = Tree::new(PathBuf::from("/r"), 10);
        let root = tree.root_id();
        let a = tree.add_child(root, PathBuf::from("/r/a"), NodeKind::Directory);
        let deep = tree.add_child(a, PathBuf::from("/r/a/deep"), NodeKind::Directory);
        tree.add_child(deep, PathBuf::from("/r/a/deep/z.rs"), NodeKind::File);
        tree.add_child(a, PathBuf::from("/r/a/y.rs"), NodeKind::File);
        tree.add_child(root, PathBuf::from("/r/empty"), NodeKind::Directory);
        tree.add_child(root, PathBuf::from("/r/top.md"), NodeKind::File);
        tree
    }

    #[test]
    fn deepest_level_comes_first() {
        let tree = fixture();
        let batch = next_batch(&tree);
        assert_eq!(paths(&tree, &batch), vec!["/r/a/deep/z.rs"]);
    }

    #[test]
    fn directory_waits_for_all_children() {
        let mut tree = fixture();
        done(&mut tree, "/r/a/deep/z.rs");

        // deep/ está listo; y.rs también, ambos a profundidad 2.
        let batch = next_batch(&tree);
        assert_eq!(paths(&tree, &batch), vec!["/r/a/deep", "/r/a/y.rs"]);

        done(&mut tree, "/r/a/deep");
        let batch = next_batch(&tree);
        assert_eq!(paths(&tree, &batch), vec!["/r/a/y.rs"]);

        done(&mut tree, "/r/a/y.rs");
        let batch = next_batch(&tree);
        assert_eq!(paths(&tree, &batch), vec!["/r/a", "/r/empty", "/r/top.md"]);
    }

    #[test]
    fn never_schedules_directory_with_pending_child() {
        let mut tree = fixture();
        while !tree.is_complete() {
            let batch = next_batch(&tree);
            assert!(!batch.is_empty());
            for &id in &batch {
                let node = tree.node(id);
                if node.is_directory() {
                    assert!(node.children().iter().all(|&c| tree.node(c).processed()));
                }
            }
            for id in batch {
                tree.complete(id, NodeOutcome::NoContent, None);
            }
        }
        assert!(next_batch(&tree).is_empty());
        assert!(!is_stalled(&tree));
    }

    #[test]
    fn empty_directory_is_ready_immediately() {
        let mut tree = Tree::new(PathBuf::from("/r"), 10);
        let root = tree.root_id();
        let empty = tree.add_child(root, PathBuf::from("/r/empty"), NodeKind::Directory);
        assert!(is_ready(&tree, empty));
        assert_eq!(next_batch(&tree), vec![empty]);
    }

    #[test]
    fn lone_root_is_ready() {
        let tree = Tree::new(PathBuf::from("/r"), 0);
        assert_eq!(next_batch(&tree), vec![tree.root_id()]);
    }
}
