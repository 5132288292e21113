//! Recorrido del sistema de archivos y construcción del árbol de síntesis.

use std::io::ErrorKind;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::TreeConfig;
use crate::error::{Result, SynthError};
use crate::models::NodeKind;
use crate::tree::Tree;

/// Construye el árbol de síntesis a partir de un directorio raíz.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    config: TreeConfig,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl TreeBuilder {
    pub fn new(config: TreeConfig) -> Result<Self> {
        let include = if config.include.is_empty() {
            None
        } else {
            Some(compile_patterns(&config.include)?)
        };
        let exclude = compile_patterns(&config.exclude)?;
        Ok(Self {
            config,
            include,
            exclude,
        })
    }

    /// Recorre `root` en orden lexicográfico y devuelve el árbol completo.
    ///
    /// Los errores al listar un directorio se anotan en ese nodo y su
    /// subárbol queda vacío; el recorrido continúa con el resto.
    pub fn build(&self, root: &Path) -> Result<Tree> {
        let root = root.canonicalize().map_err(|_| SynthError::InvalidRoot {
            path: root.to_path_buf(),
        })?;
        if !root.is_dir() {
            return Err(SynthError::InvalidRoot { path: root });
        }

        info!("Construyendo árbol de síntesis para: {}", root.display());
        let mut tree = Tree::new(root.clone(), self.config.max_depth);

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(self.config.max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e.path()));

        for entry in walker {
            match entry {
                Ok(entry) => self.add_entry(&mut tree, &entry),
                Err(err) => {
                    let message = match err.io_error().map(|e| e.kind()) {
                        Some(ErrorKind::PermissionDenied) => "Permiso denegado".to_string(),
                        _ => err.to_string(),
                    };
                    match err.path().and_then(|p| tree.get(p)) {
                        Some(id) => {
                            warn!("Error listando {}: {message}", tree.node(id).path().display());
                            tree.record_build_error(id, message);
                        }
                        None => warn!("Entrada ilegible ignorada: {err}"),
                    }
                }
            }
        }

        info!(
            "Árbol construido: {} nodos, {} ficheros, {} directorios",
            tree.total_nodes(),
            tree.file_count(),
            tree.directory_count()
        );
        Ok(tree)
    }

    fn add_entry(&self, tree: &mut Tree, entry: &DirEntry) {
        let path = entry.path();
        let Some(parent) = path.parent().and_then(|p| tree.get(p)) else {
            debug!("Entrada sin padre en el árbol: {}", path.display());
            return;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            tree.add_child(parent, path.to_path_buf(), NodeKind::Directory);
            if entry.depth() >= self.config.max_depth {
                debug!("Profundidad máxima {} alcanzada en: {}", self.config.max_depth, path.display());
            }
        } else if file_type.is_file() {
            if self.is_included(path) {
                tree.add_child(parent, path.to_path_buf(), NodeKind::File);
            } else {
                debug!("Omitiendo fichero: {}", path.display());
            }
        } else {
            debug!("Omitiendo enlace o entrada especial: {}", path.display());
        }
    }

    /// Excluida si el nombre base o la ruta completa coinciden con algún patrón.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let by_name = path.file_name().is_some_and(|name| self.exclude.is_match(name));
        by_name || self.exclude.is_match(path)
    }

    /// Solo aplica a ficheros; sin patrones de inclusión se incluye todo.
    pub fn is_included(&self, path: &Path) -> bool {
        match &self.include {
            None => true,
            Some(set) => path.file_name().is_some_and(|name| set.is_match(name)) || set.is_match(path),
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| SynthError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| SynthError::InvalidPattern {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

/// Estimación (mínimo, máximo) en minutos del tiempo de procesamiento.
///
/// Unos 3,5 s por fichero y 5,5 s por directorio, más un 20 % de margen.
pub fn estimate_processing_minutes(tree: &Tree) -> (u64, u64) {
    let base = tree.file_count() as f64 * 3.5 + tree.directory_count() as f64 * 5.5;
    let total_seconds = base * 1.2;
    let min = (total_seconds * 0.8 / 60.0) as u64;
    let max = (total_seconds * 1.2 / 60.0) as u64;
    (min.max(1), max.max(2))
}
