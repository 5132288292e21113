//! Colaborador de síntesis: la capacidad externa que analiza ficheros,
//! directorios y el conjunto final.
//!
//! La canalización solo depende de [`Synthesizer`]; la implementación real
//! sobre Rig está en [`crate::llm`].

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Texto usado cuando la respuesta no es un objeto JSON.
pub const UNSTRUCTURED_SUMMARY: &str = "No se generó una síntesis estructurada";

/// Síntesis de un hijo que se pasa al sintetizar su directorio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSummary {
    pub name: String,
    pub synthesis: String,
}

/// Texto enviado y respuesta en bruto, para el rastro en papel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub prompt: String,
    pub raw_response: String,
}

/// Resultado estructurado devuelto por el colaborador.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub summary: String,
    pub key_insights: Vec<String>,
    /// Documento completo tal como lo devolvió el colaborador.
    pub document: Map<String, Value>,
    #[serde(skip)]
    pub transcript: Option<Transcript>,
}

impl SynthesisResult {
    pub fn from_document(document: Map<String, Value>) -> Self {
        let summary = ["summary", "overview", "executive_summary"]
            .iter()
            .find_map(|key| document.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        let key_insights = string_list(document.get("key_insights"));
        Self {
            summary,
            key_insights,
            document,
            transcript: None,
        }
    }

    /// Interpreta la respuesta de un LLM. Nunca falla: una respuesta que no
    /// sea un objeto JSON produce un resultado explicativo sin ideas clave.
    pub fn from_llm_response(raw: &str) -> Self {
        let cleaned = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let parsed = serde_json::from_str::<Value>(cleaned).ok().or_else(|| {
            let start = cleaned.find('{')?;
            let end = cleaned.rfind('}')?;
            if end <= start {
                return None;
            }
            serde_json::from_str::<Value>(&cleaned[start..=end]).ok()
        });

        match parsed {
            Some(Value::Object(document)) => Self::from_document(document),
            _ => {
                warn!(
                    "Respuesta del LLM sin JSON estructurado ({} caracteres); se usa un resultado vacío",
                    raw.len()
                );
                Self {
                    summary: UNSTRUCTURED_SUMMARY.to_string(),
                    ..Self::default()
                }
            }
        }
    }

    pub fn with_transcript(mut self, prompt: String, raw_response: String) -> Self {
        self.transcript = Some(Transcript {
            prompt,
            raw_response,
        });
        self
    }

    /// Texto que se guarda como síntesis del nodo.
    pub fn synthesis_text(&self) -> String {
        if self.document.is_empty() {
            return self.summary.clone();
        }
        serde_json::to_string_pretty(&self.document).unwrap_or_else(|_| self.summary.clone())
    }

    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.document.get(key).and_then(Value::as_str)
    }

    pub fn list_field(&self, key: &str) -> Vec<String> {
        string_list(self.document.get(key))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Capacidad externa de análisis.
///
/// Cualquier error devuelto por `synthesize_file` o `synthesize_directory`
/// se registra en el nodo y la canalización sigue; un error en
/// `synthesize_overall` es fatal para la ejecución.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize_file(&self, path: &Path, content: &str, topic: &str) -> Result<SynthesisResult>;

    async fn synthesize_directory(
        &self,
        path: &Path,
        children: &[ChildSummary],
        topic: &str,
    ) -> Result<SynthesisResult>;

    async fn synthesize_overall(
        &self,
        root_summary: &str,
        insights: &[String],
        topic: &str,
    ) -> Result<SynthesisResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"summary\": \"hace X\", \"key_insights\": [\"a\", \"b\"]}\n```";
        let result = SynthesisResult::from_llm_response(raw);
        assert_eq!(result.summary, "hace X");
        assert_eq!(result.key_insights, vec!["a", "b"]);
        assert!(result.synthesis_text().contains("hace X"));
    }

    #[test]
    fn extracts_object_embedded_in_prose() {
        let raw = "Aquí tienes el análisis:\n{\"overview\": \"vista\", \"key_insights\": []}\nSaludos.";
        let result = SynthesisResult::from_llm_response(raw);
        assert_eq!(result.summary, "vista");
        assert!(result.key_insights.is_empty());
    }

    #[test]
    fn non_object_degrades_gracefully() {
        for raw in ["[1, 2, 3]", "sin json", "\"cadena\"", ""] {
            let result = SynthesisResult::from_llm_response(raw);
            assert_eq!(result.summary, UNSTRUCTURED_SUMMARY);
            assert!(result.key_insights.is_empty());
            assert!(result.document.is_empty());
        }
    }

    #[test]
    fn non_string_insights_are_stringified() {
        let raw = r#"{"summary": "s", "key_insights": ["a", 3, null, {"k": 1}]}"#;
        let result = SynthesisResult::from_llm_response(raw);
        assert_eq!(result.key_insights, vec!["a", "3", "{\"k\":1}"]);
    }
}
