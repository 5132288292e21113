// Utilidades compartidas por los tests de integración.
#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use repo_synthesizer::config::RunConfig;
use repo_synthesizer::synthesis::{ChildSummary, SynthesisResult, Synthesizer};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const TOPIC: &str = "¿Cómo está organizado el proyecto?";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    File { path: PathBuf, content: String },
    Directory { path: PathBuf, children: Vec<String> },
    Overall { insights: Vec<String> },
}

/// Sintetizador con guion: respuestas deterministas a partir del nombre del
/// nodo, fallos en los nodos indicados y registro de todas las llamadas.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    calls: Mutex<Vec<Call>>,
    failing: HashSet<String>,
    fail_overall: bool,
    cancel_on: Option<(String, CancellationToken)>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn failing_overall(mut self) -> Self {
        self.fail_overall = true;
        self
    }

    /// Cancela `token` al sintetizar `name` (el nodo en sí termina bien).
    pub fn cancelling_on(mut self, name: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((name.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn file_calls(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::File { path, .. } => Some(file_name(&path)),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    pub fn directory_calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Directory { path, children } => Some((file_name(&path), children)),
                _ => None,
            })
            .collect()
    }

    pub fn overall_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Overall { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn respond(&self, path: &Path) -> Result<SynthesisResult> {
        let name = file_name(path);
        if let Some((target, token)) = &self.cancel_on {
            if *target == name {
                token.cancel();
            }
        }
        if self.failing.contains(&name) {
            return Err(anyhow!("fallo simulado en {name}"));
        }
        Ok(result(json!({
            "summary": format!("resumen de {name}"),
            "key_insights": [format!("idea de {name}")],
        })))
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize_file(&self, path: &Path, content: &str, _topic: &str) -> Result<SynthesisResult> {
        self.record(Call::File {
            path: path.to_path_buf(),
            content: content.to_string(),
        });
        self.respond(path)
    }

    async fn synthesize_directory(
        &self,
        path: &Path,
        children: &[ChildSummary],
        _topic: &str,
    ) -> Result<SynthesisResult> {
        self.record(Call::Directory {
            path: path.to_path_buf(),
            children: children.iter().map(|c| c.name.clone()).collect(),
        });
        self.respond(path)
    }

    async fn synthesize_overall(
        &self,
        _root_summary: &str,
        insights: &[String],
        _topic: &str,
    ) -> Result<SynthesisResult> {
        self.record(Call::Overall {
            insights: insights.to_vec(),
        });
        if self.fail_overall {
            return Err(anyhow!("fallo simulado en la síntesis final"));
        }
        Ok(result(json!({
            "executive_summary": "Un repositorio de prueba.",
            "answer_to_topic": "Está organizado por módulos.",
            "key_takeaways": insights,
        })))
    }
}

fn result(value: Value) -> SynthesisResult {
    let document = value.as_object().cloned().unwrap_or_default();
    SynthesisResult::from_document(document)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Crea los ficheros indicados (y sus directorios) bajo `root`.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
}

/// Configuración de prueba: el estado, el rastro y el informe van a `work`,
/// fuera del repositorio analizado.
pub fn run_config(repo: &Path, work: &Path) -> RunConfig {
    let mut config = RunConfig::new(repo, TOPIC);
    config.output_path = work.join("informe.md");
    config.state_root = work.join("state");
    config.paper_trail_dir = Some(work.join("trail"));
    config.concurrency = 2;
    config
}

/// Ruta canónica de `rel` dentro del repositorio, como la guarda el árbol.
pub fn node_path(repo: &Path, rel: &str) -> PathBuf {
    repo.canonicalize().unwrap().join(rel)
}
