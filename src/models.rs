//! Modelos de dominio: nodos del árbol de síntesis y sus resultados.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Texto con el que se presenta un directorio sin contenido procesable.
pub const NO_CONTENT_TEXT: &str = "Directorio vacío o sin contenido procesable";

/// Texto con el que se presenta un fichero que supera el umbral de tamaño.
pub const TOO_LARGE_TEXT: &str = "Fichero demasiado grande para un análisis detallado";

/// Índice de un nodo dentro del árbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

/// Resultado de síntesis de un nodo ya procesado.
///
/// Los centinelas son variantes propias, nunca texto comparado, de modo que
/// una síntesis real cuyo texto coincida con un centinela sigue contando
/// como real.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Synthesis {
    Generated { text: String },
    NoContent,
    TooLarge { bytes: u64 },
}

impl Synthesis {
    /// Solo las síntesis generadas por el colaborador son utilizables.
    pub fn is_generated(&self) -> bool {
        matches!(self, Synthesis::Generated { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            Synthesis::Generated { text } => text,
            Synthesis::NoContent => NO_CONTENT_TEXT,
            Synthesis::TooLarge { .. } => TOO_LARGE_TEXT,
        }
    }
}

/// Lo que el orquestador entrega al árbol al terminar un nodo.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Generated {
        text: String,
        key_insights: Vec<String>,
    },
    NoContent,
    TooLarge {
        bytes: u64,
    },
    Failed {
        reason: String,
    },
}

/// Una entrada del sistema de archivos dentro del árbol de síntesis.
///
/// Los campos solo se modifican a través de [`crate::tree::Tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) depth: usize,

    pub(crate) content: Option<String>,
    pub(crate) synthesis: Option<Synthesis>,
    pub(crate) key_insights: Vec<String>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,

    pub(crate) processed: bool,
    pub(crate) error: Option<String>,
    pub(crate) processed_at: Option<DateTime<Utc>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, path: PathBuf, kind: NodeKind, depth: usize) -> Self {
        let name = display_name(&path);
        Self {
            id,
            path,
            name,
            kind,
            depth,
            content: None,
            synthesis: None,
            key_insights: Vec::new(),
            parent: None,
            children: Vec::new(),
            processed: false,
            error: None,
            processed_at: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Vista previa del contenido leído (solo ficheros).
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn synthesis(&self) -> Option<&Synthesis> {
        self.synthesis.as_ref()
    }

    pub fn key_insights(&self) -> &[String] {
        &self.key_insights
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn processed(&self) -> bool {
        self.processed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn has_generated_synthesis(&self) -> bool {
        self.synthesis.as_ref().is_some_and(Synthesis::is_generated)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
