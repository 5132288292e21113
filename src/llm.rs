//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento solo se implementa OpenAI; cualquier otro proveedor se rechaza
//! al arrancar.

use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};
use crate::prompts;
use crate::synthesis::{ChildSummary, SynthesisResult, Synthesizer};

/// Modelo de chat por defecto si no se ha configurado otro.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Gestor de LLMs. El cliente se crea una sola vez al arrancar.
pub struct LlmManager {
    client: openai::Client,
    chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    ///
    /// Falla si el proveedor no está implementado o falta `OPENAI_API_KEY`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        ensure_supported(&cfg.llm_provider)?;
        let api_key = require_api_key(env::var("OPENAI_API_KEY"))?;

        let chat_model = if cfg.llm_chat_model.trim().is_empty() {
            DEFAULT_CHAT_MODEL.to_string()
        } else {
            cfg.llm_chat_model.clone()
        };
        Ok(Self {
            client: openai::Client::new(&api_key),
            chat_model,
        })
    }

    /// Envía un mensaje con el preámbulo dado y devuelve el resultado
    /// interpretado junto con el texto enviado y recibido.
    async fn complete(&self, preamble: &str, prompt: String) -> Result<SynthesisResult> {
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let agent = self.client.agent(&self.chat_model).preamble(preamble).build();
        let response = agent.prompt(prompt.as_str()).await?;

        debug!("Respuesta del LLM recibida ({} caracteres)", response.len());
        Ok(SynthesisResult::from_llm_response(&response).with_transcript(prompt, response))
    }
}

fn ensure_supported(provider: &LlmProvider) -> Result<()> {
    match provider {
        LlmProvider::OpenAI => Ok(()),
        other => Err(anyhow!("Proveedor LLM {:?} aún no implementado para chat", other)),
    }
}

fn require_api_key(raw: Result<String, env::VarError>) -> Result<String> {
    match raw {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(anyhow!("Falta OPENAI_API_KEY en el entorno")),
    }
}

#[async_trait]
impl Synthesizer for LlmManager {
    async fn synthesize_file(&self, path: &Path, content: &str, topic: &str) -> Result<SynthesisResult> {
        let prompt = prompts::file_prompt(path, content, topic);
        self.complete(prompts::FILE_PREAMBLE, prompt).await
    }

    async fn synthesize_directory(
        &self,
        path: &Path,
        children: &[ChildSummary],
        topic: &str,
    ) -> Result<SynthesisResult> {
        let prompt = prompts::directory_prompt(path, children, topic);
        self.complete(prompts::FILE_PREAMBLE, prompt).await
    }

    async fn synthesize_overall(
        &self,
        root_summary: &str,
        insights: &[String],
        topic: &str,
    ) -> Result<SynthesisResult> {
        let prompt = prompts::final_prompt(root_summary, insights, topic);
        self.complete(prompts::FINAL_PREAMBLE, prompt).await
    }
}
