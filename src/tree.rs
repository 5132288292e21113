//! Árbol de síntesis: dueño de todos los nodos, con índices por ruta y por
//! profundidad y contadores derivados.
//!
//! Los nodos viven en un arena (`Vec<Node>`); el padre es un índice, nunca
//! una referencia con propiedad. La forma del árbol solo cambia durante la
//! construcción (`add_child`); después únicamente cambian los campos de
//! estado a través de `complete`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Node, NodeId, NodeKind, NodeOutcome, Synthesis};

/// Longitud máxima de la vista previa de contenido que se persiste.
pub const CONTENT_PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    max_depth: usize,

    by_path: HashMap<PathBuf, NodeId>,
    by_depth: BTreeMap<usize, Vec<NodeId>>,

    processed_count: usize,
    file_count: usize,
    directory_count: usize,
}

impl Tree {
    /// Crea un árbol con solo el directorio raíz.
    pub fn new(root_path: PathBuf, max_depth: usize) -> Self {
        let root = NodeId(0);
        let mut tree = Self {
            nodes: vec![Node::new(root, root_path, NodeKind::Directory, 0)],
            root,
            max_depth,
            by_path: HashMap::new(),
            by_depth: BTreeMap::new(),
            processed_count: 0,
            file_count: 0,
            directory_count: 0,
        };
        tree.rebuild_indices();
        tree
    }

    /// Añade un hijo al directorio `parent` y devuelve su índice.
    ///
    /// Si la ruta ya existe se devuelve el nodo existente sin duplicarlo.
    pub fn add_child(&mut self, parent: NodeId, path: PathBuf, kind: NodeKind) -> NodeId {
        if let Some(&existing) = self.by_path.get(&path) {
            return existing;
        }
        let id = NodeId(self.nodes.len());
        let depth = self.nodes[parent.0].depth + 1;
        let mut node = Node::new(id, path.clone(), kind, depth);
        node.parent = Some(parent);

        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        self.by_path.insert(path, id);
        self.by_depth.entry(depth).or_default().push(id);
        match kind {
            NodeKind::File => self.file_count += 1,
            NodeKind::Directory => self.directory_count += 1,
        }
        id
    }

    /// Registra un error de listado ocurrido durante la construcción.
    pub fn record_build_error(&mut self, id: NodeId, message: impl Into<String>) {
        self.nodes[id.0].error = Some(message.into());
    }

    /// Marca un nodo como procesado con su resultado.
    ///
    /// Devuelve `false` (sin tocar nada) si el nodo ya estaba procesado.
    pub fn complete(&mut self, id: NodeId, outcome: NodeOutcome, content: Option<String>) -> bool {
        let node = &mut self.nodes[id.0];
        if node.processed {
            return false;
        }

        match outcome {
            NodeOutcome::Generated { text, key_insights } => {
                node.synthesis = Some(Synthesis::Generated { text });
                node.key_insights = key_insights;
            }
            NodeOutcome::NoContent => node.synthesis = Some(Synthesis::NoContent),
            NodeOutcome::TooLarge { bytes } => node.synthesis = Some(Synthesis::TooLarge { bytes }),
            NodeOutcome::Failed { reason } => {
                node.synthesis = None;
                node.key_insights.clear();
                node.error = Some(reason);
            }
        }
        if content.is_some() {
            node.content = content.map(|c| preview(&c));
        }
        node.processed = true;
        node.processed_at = Some(Utc::now());
        self.processed_count += 1;
        true
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &Node {
        &self.nodes[self.root.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn get_node(&self, path: &Path) -> Option<&Node> {
        self.get(path).map(|id| self.node(id))
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn nodes_at_depth(&self, depth: usize) -> &[NodeId] {
        self.by_depth.get(&depth).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Profundidades ocupadas, de la más profunda a la raíz.
    pub fn depths_deepest_first(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_depth.keys().rev().copied()
    }

    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.nodes[parent.0].parent;
        }
        out
    }

    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        match self.nodes[id.0].parent {
            Some(parent) => self.nodes[parent.0]
                .children
                .iter()
                .copied()
                .filter(|&c| c != id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Recorrido en pre-orden desde la raíz, en orden de listado.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .map(move |id| &self.nodes[id.0])
    }

    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn directory_count(&self) -> usize {
        self.directory_count
    }

    pub fn is_complete(&self) -> bool {
        self.processed_count == self.nodes.len()
    }

    /// Progreso en porcentaje.
    pub fn progress(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.processed_count as f64 / self.nodes.len() as f64 * 100.0
    }

    pub fn nodes_with_synthesis(&self) -> usize {
        self.nodes.iter().filter(|n| n.has_generated_synthesis()).count()
    }

    /// Todas las ideas clave del árbol, en pre-orden.
    pub fn all_insights(&self) -> Vec<String> {
        self.iter()
            .flat_map(|n| n.key_insights.iter().cloned())
            .collect()
    }

    pub fn failures(&self) -> Vec<(PathBuf, String)> {
        self.iter()
            .filter_map(|n| n.error.as_ref().map(|e| (n.path.clone(), e.clone())))
            .collect()
    }

    /// Recalcula índices y contadores recorriendo el árbol desde la raíz.
    fn rebuild_indices(&mut self) {
        self.by_path.clear();
        self.by_depth.clear();
        self.processed_count = 0;
        self.file_count = 0;
        self.directory_count = 0;

        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            self.by_path.insert(node.path.clone(), id);
            self.by_depth.entry(node.depth).or_default().push(id);
            match node.kind {
                NodeKind::File => self.file_count += 1,
                NodeKind::Directory => self.directory_count += 1,
            }
            if node.processed {
                self.processed_count += 1;
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    pub fn to_document(&self) -> TreeDocument {
        TreeDocument {
            version: TreeDocument::VERSION,
            root: self.root().path.clone(),
            max_depth: self.max_depth,
            total_nodes: self.total_nodes(),
            processed_nodes: self.processed_count,
            file_count: self.file_count,
            directory_count: self.directory_count,
            nodes: self.iter().map(|n| NodeRecord::from_node(n, self)).collect(),
        }
    }

    /// Reconstruye el árbol desde un documento persistido.
    ///
    /// Primero se crean todos los nodos, luego se reenlazan padres e hijos,
    /// se localiza la raíz y por último se recalculan índices y contadores.
    /// Los contadores guardados en el documento se ignoran.
    pub fn from_document(doc: TreeDocument) -> Result<Self, String> {
        let mut ids: HashMap<PathBuf, NodeId> = HashMap::with_capacity(doc.nodes.len());
        let mut nodes = Vec::with_capacity(doc.nodes.len());
        let mut child_lists = Vec::with_capacity(doc.nodes.len());

        for (index, record) in doc.nodes.into_iter().enumerate() {
            let id = NodeId(index);
            if ids.insert(record.path.clone(), id).is_some() {
                return Err(format!("ruta duplicada: {}", record.path.display()));
            }
            child_lists.push(record.children.clone());
            nodes.push(record.into_node(id));
        }

        let root = *ids
            .get(&doc.root)
            .ok_or_else(|| format!("la raíz {} no está entre los nodos", doc.root.display()))?;

        for (index, children) in child_lists.into_iter().enumerate() {
            let parent = NodeId(index);
            for child_path in children {
                let child = *ids.get(&child_path).ok_or_else(|| {
                    format!("hijo desconocido {} de {}", child_path.display(), nodes[index].path.display())
                })?;
                if child == root || nodes[child.0].parent.is_some() {
                    return Err(format!("{} tiene más de un padre", child_path.display()));
                }
                if nodes[child.0].depth != nodes[index].depth + 1 {
                    return Err(format!("profundidad incoherente en {}", child_path.display()));
                }
                nodes[child.0].parent = Some(parent);
                nodes[index].children.push(child);
            }
        }

        if nodes[root.0].depth != 0 {
            return Err("la raíz no tiene profundidad 0".to_string());
        }

        let mut tree = Self {
            nodes,
            root,
            max_depth: doc.max_depth,
            by_path: HashMap::new(),
            by_depth: BTreeMap::new(),
            processed_count: 0,
            file_count: 0,
            directory_count: 0,
        };
        tree.rebuild_indices();

        if tree.by_path.len() != tree.nodes.len() {
            let reachable: HashSet<&PathBuf> = tree.by_path.keys().collect();
            let orphan = tree
                .nodes
                .iter()
                .find(|n| !reachable.contains(&n.path))
                .map(|n| n.path.display().to_string())
                .unwrap_or_default();
            return Err(format!("nodo inalcanzable desde la raíz: {orphan}"));
        }
        Ok(tree)
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(CONTENT_PREVIEW_CHARS) {
        Some((cut, _)) => content[..cut].to_string(),
        None => content.to_string(),
    }
}

/// Documento serializado del árbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    pub version: u32,
    pub root: PathBuf,
    pub max_depth: usize,
    pub total_nodes: usize,
    pub processed_nodes: usize,
    pub file_count: usize,
    pub directory_count: usize,
    pub nodes: Vec<NodeRecord>,
}

impl TreeDocument {
    pub const VERSION: u32 = 1;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub depth: usize,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub synthesis: Option<Synthesis>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: Vec<PathBuf>,
}

impl NodeRecord {
    fn from_node(node: &Node, tree: &Tree) -> Self {
        Self {
            path: node.path.clone(),
            name: node.name.clone(),
            kind: node.kind,
            depth: node.depth,
            content: node.content.clone(),
            synthesis: node.synthesis.clone(),
            key_insights: node.key_insights.clone(),
            processed: node.processed,
            error: node.error.clone(),
            processed_at: node.processed_at,
            children: node
                .children
                .iter()
                .map(|&c| tree.nodes[c.0].path.clone())
                .collect(),
        }
    }

    fn into_node(self, id: NodeId) -> Node {
        let mut node = Node::new(id, self.path, self.kind, self.depth);
        node.name = self.name;
        node.content = self.content;
        node.synthesis = self.synthesis;
        node.key_insights = self.key_insights;
        node.processed = self.processed;
        node.error = self.error;
        node.processed_at = self.processed_at;
        node
    }
}
