use std::sync::Arc;

use repo_synthesizer::config::AppConfig;
use repo_synthesizer::llm::LlmManager;
use repo_synthesizer::orchestrator::Orchestrator;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env()?;
    info!(
        "Repositorio: {} | Tema: {}",
        cfg.run.repo_path.display(),
        cfg.run.topic
    );

    // 3. Inicializar gestor de LLMs
    let llm_manager = LlmManager::from_config(&cfg)?;

    // 4. Crear el orquestador
    let orchestrator = Orchestrator::new(cfg.run.clone(), Arc::new(llm_manager));

    // Ctrl-C: cancela la ejecución; lo ya guardado sigue siendo reanudable.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Señal de interrupción recibida: se descartan los nodos sin terminar y se conserva el último checkpoint.");
            cancel.cancel();
        }
    });

    // 5. Ejecutar la síntesis
    match orchestrator.run().await {
        Ok(report) => {
            if !report.failures.is_empty() {
                warn!("{} nodos terminaron con error", report.failures.len());
            }
            info!("✅ Informe escrito en {}", report.output_path.display());
            Ok(())
        }
        Err(err) => {
            error!("❌ {err}");
            if err.is_resumable() {
                info!("Para reanudar: SYNTH_RESUME={}", orchestrator.session_id());
            }
            Err(err.into())
        }
    }
}
