//! Informe final de una sesión, en Markdown.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::synthesis::SynthesisResult;

/// Un nodo que terminó con error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct FinalReport {
    pub repo_path: PathBuf,
    pub topic: String,
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub overall: SynthesisResult,
    pub total_nodes: usize,
    pub file_count: usize,
    pub directory_count: usize,
    pub max_depth: usize,
    pub nodes_with_synthesis: usize,
    pub failures: Vec<NodeFailure>,
}

impl FinalReport {
    pub fn to_markdown(&self) -> String {
        let repo_name = crate::models::display_name(&self.repo_path);
        let mut out = String::new();

        let _ = writeln!(out, "# Síntesis del repositorio: {repo_name}\n");
        let _ = writeln!(out, "**Tema**: {}", self.topic);
        let _ = writeln!(out, "**Repositorio**: {}", self.repo_path.display());
        let _ = writeln!(out, "**Generado**: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "**Sesión**: {}\n", self.session_id);
        out.push_str("---\n\n");

        let summary = self
            .overall
            .text_field("executive_summary")
            .unwrap_or(self.overall.summary.as_str());
        section(&mut out, "Resumen ejecutivo", or_placeholder(summary, "No se generó resumen"));
        section(
            &mut out,
            "Respuesta al tema",
            self.overall
                .text_field("answer_to_topic")
                .unwrap_or("No se generó una respuesta específica"),
        );

        self.capabilities(&mut out);
        list_section(&mut out, "Arquitectura", &self.overall.list_field("architecture_insights"), "-");
        if let Some(philosophy) = self.overall.text_field("design_philosophy") {
            section(&mut out, "Filosofía de diseño", philosophy);
        }
        list_section(&mut out, "Enfoques singulares", &self.overall.list_field("unique_approaches"), "-");
        list_section(&mut out, "Aplicaciones potenciales", &self.overall.list_field("potential_applications"), "-");
        list_section(&mut out, "Conclusiones clave", &self.overall.list_field("key_takeaways"), "1.");

        if !self.failures.is_empty() {
            let lines: Vec<String> = self
                .failures
                .iter()
                .map(|f| format!("`{}`: {}", f.path.display(), f.error))
                .collect();
            list_section(&mut out, "Nodos con errores", &lines, "-");
        }

        out.push_str("---\n\n## Estructura del repositorio\n\n");
        let _ = writeln!(out, "- **Nodos totales**: {}", self.total_nodes);
        let _ = writeln!(out, "- **Ficheros**: {}", self.file_count);
        let _ = writeln!(out, "- **Directorios**: {}", self.directory_count);
        let _ = writeln!(out, "- **Nodos con síntesis**: {}", self.nodes_with_synthesis);
        let _ = writeln!(out, "- **Profundidad máxima**: {}", self.max_depth);
        out
    }

    fn capabilities(&self, out: &mut String) {
        let Some(Value::Array(items)) = self.overall.document.get("novel_capabilities") else {
            return;
        };
        if items.is_empty() {
            return;
        }
        out.push_str("## Capacidades novedosas\n\n");
        for item in items {
            match item {
                Value::Object(cap) => {
                    let field = |k: &str| cap.get(k).and_then(Value::as_str).unwrap_or("N/D");
                    let _ = writeln!(out, "### {}\n", cap.get("capability").and_then(Value::as_str).unwrap_or("Desconocida"));
                    let _ = writeln!(out, "**Relevancia**: {}\n", field("significance"));
                    let _ = writeln!(out, "**Implementación**: {}\n", field("implementation"));
                }
                Value::String(s) => {
                    let _ = writeln!(out, "- {s}\n");
                }
                other => {
                    let _ = writeln!(out, "- {other}\n");
                }
            }
        }
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.trim().is_empty() {
        placeholder
    } else {
        text
    }
}

fn section(out: &mut String, title: &str, body: &str) {
    let _ = write!(out, "## {title}\n\n{body}\n\n");
}

fn list_section(out: &mut String, title: &str, items: &[String], bullet: &str) {
    if items.is_empty() {
        return;
    }
    let _ = write!(out, "## {title}\n\n");
    for item in items {
        let _ = writeln!(out, "{bullet} {item}");
    }
    out.push('\n');
}
