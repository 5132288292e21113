//! Carga y gestión de configuración de la aplicación (árbol, sesión y LLM).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Patrones excluidos por defecto: artefactos de compilación, VCS, cachés y
/// los directorios de estado de la propia herramienta.
pub const DEFAULT_EXCLUDE: &[&str] = &[
    "__pycache__",
    "*.pyc",
    ".git",
    ".venv",
    "venv",
    "node_modules",
    "target",
    ".idea",
    ".vscode",
    "*.egg-info",
    "dist",
    "build",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".coverage",
    "*.so",
    "*.dylib",
    "*.dll",
    ".DS_Store",
    "Thumbs.db",
    ".env",
    ".env.local",
    ".repo_synthesis",
    ".repo_synthesis_state_*",
    ".repo_synthesis_temp*",
    ".data",
    "data",
    "cache",
    "tmp",
    "temp",
];

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_FILE_CHARS: usize = 50_000;
pub const DEFAULT_BACKUP_KEEP: usize = 5;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Parámetros que determinan la forma del árbol. Se guardan en la sesión.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Vacío significa "todo lo que no esté excluido".
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            include: Vec::new(),
            exclude: DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Configuración de una ejecución de la canalización.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub repo_path: PathBuf,
    pub topic: String,
    pub output_path: PathBuf,
    pub tree: TreeConfig,
    /// Sesión a reanudar; `None` inicia una sesión nueva.
    pub resume: Option<String>,
    /// Directorio bajo el que se crea `.repo_synthesis_state_<id>`.
    pub state_root: PathBuf,
    /// `None` desactiva el rastro en papel.
    pub paper_trail_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub max_file_chars: usize,
    pub backup_keep: usize,
}

impl RunConfig {
    pub fn new(repo_path: impl Into<PathBuf>, topic: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            topic: topic.into(),
            output_path: PathBuf::from("repository_synthesis.md"),
            tree: TreeConfig::default(),
            resume: None,
            state_root: PathBuf::from("."),
            paper_trail_dir: Some(PathBuf::from(".repo_synthesis")),
            concurrency: DEFAULT_CONCURRENCY,
            max_file_chars: DEFAULT_MAX_FILE_CHARS,
            backup_keep: DEFAULT_BACKUP_KEEP,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub run: RunConfig,
    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let topic = env::var("SYNTH_TOPIC").map_err(|_| anyhow!("Falta SYNTH_TOPIC en el entorno"))?;
        let repo_path = env::var("SYNTH_REPO_PATH").unwrap_or_else(|_| ".".to_string());

        let mut run = RunConfig::new(repo_path, topic);

        if let Ok(output) = env::var("SYNTH_OUTPUT") {
            run.output_path = PathBuf::from(output);
        }
        run.tree.max_depth = parse_var("SYNTH_MAX_DEPTH", DEFAULT_MAX_DEPTH)?;
        if let Ok(include) = env::var("SYNTH_INCLUDE") {
            run.tree.include = split_patterns(&include);
        }
        if let Ok(exclude) = env::var("SYNTH_EXCLUDE") {
            run.tree.exclude = split_patterns(&exclude);
        }
        run.resume = env::var("SYNTH_RESUME").ok().filter(|s| !s.trim().is_empty());
        if let Ok(state_root) = env::var("SYNTH_STATE_DIR") {
            run.state_root = PathBuf::from(state_root);
        }

        let paper_trail = parse_var("SYNTH_PAPER_TRAIL", true)?;
        run.paper_trail_dir = if paper_trail {
            Some(PathBuf::from(
                env::var("SYNTH_PAPER_TRAIL_DIR").unwrap_or_else(|_| ".repo_synthesis".to_string()),
            ))
        } else {
            None
        };

        run.concurrency = parse_var("SYNTH_CONCURRENCY", DEFAULT_CONCURRENCY)?.max(1);
        run.max_file_chars = parse_var("SYNTH_MAX_FILE_CHARS", DEFAULT_MAX_FILE_CHARS)?;
        run.backup_keep = parse_var("SYNTH_BACKUP_KEEP", DEFAULT_BACKUP_KEEP)?;

        let llm_provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model = env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self {
            run,
            llm_provider,
            llm_chat_model,
        })
    }
}

/// Lista separada por comas, sin entradas vacías.
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido en {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_patterns_trims_and_drops_empty() {
        assert_eq!(split_patterns("*.rs, *.md,,"), vec!["*.rs", "*.md"]);
        assert!(split_patterns("").is_empty());
    }

    #[test]
    fn default_tree_config_excludes_vcs_and_build_dirs() {
        let cfg = TreeConfig::default();
        assert!(cfg.include.is_empty());
        assert!(cfg.exclude.iter().any(|p| p == ".git"));
        assert!(cfg.exclude.iter().any(|p| p == "node_modules"));
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert!(matches!(LlmProvider::from_str("OpenAI").unwrap(), LlmProvider::OpenAI));
        assert!(LlmProvider::from_str("otro").is_err());
    }
}
