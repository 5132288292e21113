//! Tipos de error de la canalización de síntesis.
//!
//! Los errores de construcción del árbol y de procesamiento de nodos se
//! registran sobre el propio nodo y no llegan aquí. Lo que sí llega aquí son
//! los errores que el llamante tiene que decidir: checkpoints que no se
//! pudieron escribir, reanudaciones imposibles y ejecuciones sin resultado.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::Phase;

/// Errores del almacén de checkpoints.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("error de E/S en {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON inválido en {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no existe el fichero de checkpoint {}", path.display())]
    Missing { path: PathBuf },

    #[error("árbol corrupto en {}: {reason}", path.display())]
    CorruptTree { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errores fatales de una ejecución.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("la ruta raíz no es un directorio válido: {}", path.display())]
    InvalidRoot { path: PathBuf },

    #[error("patrón glob inválido '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("no se pudo guardar el checkpoint de la sesión {session_id} (fase {phase}): {source}")]
    Checkpoint {
        session_id: String,
        phase: Phase,
        #[source]
        source: StoreError,
    },

    #[error("no se puede reanudar la sesión {session_id}: {source}")]
    Resume {
        session_id: String,
        #[source]
        source: StoreError,
    },

    #[error("la sesión {session_id} no es reanudable: {reason}")]
    ResumeRefused { session_id: String, reason: String },

    #[error("ningún nodo produjo una síntesis utilizable (0/{total} nodos) en la sesión {session_id}")]
    NoSynthesis { session_id: String, total: usize },

    #[error("falló la síntesis final de la sesión {session_id}: {reason}")]
    Aggregation { session_id: String, reason: String },

    #[error("sesión {session_id} interrumpida durante la fase {phase}")]
    Cancelled { session_id: String, phase: Phase },

    #[error("no se pudo escribir el informe {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SynthError {
    /// Indica si la sesión puede continuarse más tarde con una reanudación.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            SynthError::Checkpoint { .. }
                | SynthError::Cancelled { .. }
                | SynthError::Aggregation { .. }
                | SynthError::Report { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;
