//! Rastro en papel: ficheros intermedios para revisión humana.
//!
//! Nada de lo que ocurre aquí afecta a la canalización; cualquier fallo de
//! escritura se registra como aviso y se ignora.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub const NODES_DIR: &str = "nodes";
pub const PROMPTS_DIR: &str = "prompts";
pub const RESPONSES_DIR: &str = "responses";
pub const SYNTHESES_DIR: &str = "syntheses";
pub const FINAL_REPORT: &str = "final_synthesis.md";

#[derive(Debug, Clone)]
pub struct PaperTrail {
    dir: PathBuf,
}

impl PaperTrail {
    /// Crea el directorio y sus subdirectorios.
    pub fn new(dir: PathBuf) -> Self {
        for sub in [NODES_DIR, PROMPTS_DIR, RESPONSES_DIR, SYNTHESES_DIR] {
            if let Err(e) = fs::create_dir_all(dir.join(sub)) {
                warn!("No se pudo crear {}: {e}", dir.join(sub).display());
            }
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_node_content(&self, node_path: &Path, content: &str) -> Option<PathBuf> {
        let target = self
            .dir
            .join(NODES_DIR)
            .join(format!("{}.txt", safe_name(node_path, 100)));
        self.write(target, content)
    }

    pub fn save_prompt(&self, node_path: &Path, prompt: &str, kind: &str) -> Option<PathBuf> {
        let target = self.dir.join(PROMPTS_DIR).join(format!(
            "{}_{kind}_{}.txt",
            timestamp(),
            safe_name(node_path, 80)
        ));
        self.write(target, prompt)
    }

    /// Guarda la respuesta en bruto y, si existe, el documento interpretado.
    pub fn save_response(
        &self,
        node_path: &Path,
        raw: &str,
        parsed: &Map<String, Value>,
        kind: &str,
    ) -> Option<PathBuf> {
        let stem = format!("{}_{kind}_{}", timestamp(), safe_name(node_path, 80));
        self.write(self.dir.join(RESPONSES_DIR).join(format!("{stem}.raw.txt")), raw);
        let pretty = serde_json::to_string_pretty(parsed).unwrap_or_default();
        self.write(self.dir.join(RESPONSES_DIR).join(format!("{stem}.json")), &pretty)
    }

    pub fn save_synthesis(&self, node_path: &Path, synthesis: &str, depth: usize) -> Option<PathBuf> {
        let target = self.dir.join(SYNTHESES_DIR).join(format!(
            "depth_{depth:02}_{}.md",
            safe_name(node_path, 100)
        ));
        let name = crate::models::display_name(node_path);
        let formatted = format!(
            "# Síntesis: {name}\n\n**Ruta**: {}\n**Profundidad**: {depth}\n**Generado**: {}\n\n---\n\n{synthesis}\n",
            node_path.display(),
            Utc::now().to_rfc3339(),
        );
        self.write(target, &formatted)
    }

    pub fn save_final_report(&self, report: &str) -> Option<PathBuf> {
        let path = self.write(self.dir.join(FINAL_REPORT), report)?;
        info!("Informe final guardado en el rastro: {}", path.display());
        Some(path)
    }

    /// Elimina el rastro; con `keep_final` conserva solo el informe final.
    pub fn cleanup(&self, keep_final: bool) {
        if !self.dir.exists() {
            return;
        }
        let result = if keep_final {
            [NODES_DIR, PROMPTS_DIR, RESPONSES_DIR, SYNTHESES_DIR]
                .iter()
                .map(|sub| self.dir.join(sub))
                .filter(|p| p.exists())
                .try_for_each(fs::remove_dir_all)
        } else {
            fs::remove_dir_all(&self.dir)
        };
        match result {
            Ok(()) => info!("Rastro en papel limpiado: {}", self.dir.display()),
            Err(e) => warn!("No se pudo limpiar el rastro en papel: {e}"),
        }
    }

    fn write(&self, target: PathBuf, content: &str) -> Option<PathBuf> {
        match fs::write(&target, content) {
            Ok(()) => {
                debug!("Rastro guardado: {}", target.display());
                Some(target)
            }
            Err(e) => {
                warn!("No se pudo guardar {}: {e}", target.display());
                None
            }
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Nombre de fichero plano a partir de una ruta, acortado por el centro.
fn safe_name(path: &Path, max_chars: usize) -> String {
    let flat: String = path
        .to_string_lossy()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let count = flat.chars().count();
    if count <= max_chars {
        return flat;
    }
    let head = max_chars / 2;
    let tail = max_chars - head - 3;
    let start: String = flat.chars().take(head).collect();
    let end: String = flat.chars().skip(count - tail).collect();
    format!("{start}...{end}")
}
