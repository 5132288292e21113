//! Estado de la sesión: metadatos de una ejecución, independientes del árbol.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TreeConfig;

/// Fase de una ejecución.
///
/// `initializing → processing → finalizing → completed`; `failed` es
/// alcanzable desde cualquier fase ante un error no recuperado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Processing,
    Finalizing,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Initializing => "initializing",
            Phase::Processing => "processing",
            Phase::Finalizing => "finalizing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Entrada del registro de errores o avisos de la sesión.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub message: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub repo_path: PathBuf,
    pub topic: String,

    /// Copia de los contadores del árbol, solo para mostrar el estado.
    pub total_nodes: usize,
    pub processed_nodes: usize,
    pub phase: Phase,

    pub config: TreeConfig,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub paper_trail_dir: Option<PathBuf>,

    #[serde(default)]
    pub errors: Vec<LogEntry>,
    #[serde(default)]
    pub warnings: Vec<LogEntry>,

    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checkpoint: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, repo_path: PathBuf, topic: impl Into<String>, config: TreeConfig) -> Self {
        Self {
            session_id: session_id.into(),
            repo_path,
            topic: topic.into(),
            total_nodes: 0,
            processed_nodes: 0,
            phase: Phase::Initializing,
            config,
            output_path: None,
            paper_trail_dir: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            last_checkpoint: None,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn record_error(&mut self, path: Option<PathBuf>, message: impl Into<String>) {
        self.errors.push(LogEntry {
            path,
            message: message.into(),
            phase: self.phase,
            timestamp: Utc::now(),
        });
    }

    pub fn record_warning(&mut self, path: Option<PathBuf>, message: impl Into<String>) {
        self.warnings.push(LogEntry {
            path,
            message: message.into(),
            phase: self.phase,
            timestamp: Utc::now(),
        });
    }

    pub fn mark_completed(&mut self) {
        self.phase = Phase::Completed;
        self.completed_at = Some(Utc::now());
    }
}

/// Identificador corto de sesión (8 caracteres de un UUID v4).
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_short_and_distinct() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn log_entries_carry_current_phase() {
        let mut state = SessionState::new("abc", "/r".into(), "tema", TreeConfig::default());
        state.phase = Phase::Processing;
        state.record_error(Some("/r/x".into()), "fallo");
        state.record_warning(None, "aviso");

        assert_eq!(state.errors[0].phase, Phase::Processing);
        assert_eq!(state.errors[0].path.as_deref(), Some(std::path::Path::new("/r/x")));
        assert_eq!(state.warnings.len(), 1);
    }

    #[test]
    fn completion_sets_phase_and_timestamp() {
        let mut state = SessionState::new("abc", "/r".into(), "tema", TreeConfig::default());
        assert!(!state.is_completed());
        state.mark_completed();
        assert!(state.is_completed());
        assert_eq!(state.phase, Phase::Completed);
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Phase::Finalizing).unwrap(), "\"finalizing\"");
    }
}
