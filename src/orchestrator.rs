//! Orquestador de la canalización: construir o reanudar, procesar lotes de
//! las hojas a la raíz con un checkpoint por nodo y agregar el resultado
//! final.
//!
//! El árbol y el estado de la sesión pertenecen al bucle principal. Los
//! nodos de un lote se ejecutan de forma concurrente sobre datos propios
//! (`NodeJob`) y sus resultados se aplican y se guardan de uno en uno desde
//! ese mismo bucle.

use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::error::{Result, SynthError};
use crate::models::{NodeId, NodeOutcome, Synthesis};
use crate::paper_trail::PaperTrail;
use crate::report::{FinalReport, NodeFailure};
use crate::scheduler;
use crate::session::{new_session_id, Phase, SessionState};
use crate::store::CheckpointStore;
use crate::synthesis::{ChildSummary, SynthesisResult, Synthesizer};
use crate::traversal::{estimate_processing_minutes, TreeBuilder};
use crate::tree::Tree;

/// Texto que recibe el colaborador cuando la raíz no tiene síntesis propia.
const MISSING_ROOT_SUMMARY: &str = "No hay síntesis de la raíz disponible";

/// Resultado de una ejecución completa.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: String,
    pub output_path: PathBuf,
    pub report: FinalReport,
    pub failures: Vec<NodeFailure>,
}

pub struct Orchestrator {
    config: RunConfig,
    synthesizer: Arc<dyn Synthesizer>,
    session_id: String,
    store: CheckpointStore,
    paper_trail: Option<PaperTrail>,
    cancel: CancellationToken,
}

/// Lo que necesita un nodo para procesarse sin tocar el árbol.
struct NodeJob {
    id: NodeId,
    path: PathBuf,
    name: String,
    depth: usize,
    input: JobInput,
}

enum JobInput {
    File,
    Directory { children: Vec<ChildSummary> },
}

impl NodeJob {
    fn prepare(tree: &Tree, id: NodeId) -> Self {
        let node = tree.node(id);
        let input = if node.is_file() {
            JobInput::File
        } else {
            // Solo los hijos con síntesis generada; centinelas y errores no
            // se envían al colaborador.
            let children = node
                .children()
                .iter()
                .map(|&c| tree.node(c))
                .filter_map(|child| match child.synthesis() {
                    Some(Synthesis::Generated { text }) => Some(ChildSummary {
                        name: child.name().to_string(),
                        synthesis: text.clone(),
                    }),
                    _ => None,
                })
                .collect();
            JobInput::Directory { children }
        };
        Self {
            id,
            path: node.path().to_path_buf(),
            name: node.name().to_string(),
            depth: node.depth(),
            input,
        }
    }
}

struct CompletedNode {
    id: NodeId,
    path: PathBuf,
    name: String,
    outcome: NodeOutcome,
    content: Option<String>,
}

enum FileContent {
    Text(String),
    TooLarge { bytes: u64 },
}

impl Orchestrator {
    /// Prepara una ejecución. Con `config.resume` se reutiliza ese id de
    /// sesión; si no, se genera uno nuevo.
    pub fn new(config: RunConfig, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let session_id = config.resume.clone().unwrap_or_else(new_session_id);
        let store = CheckpointStore::for_session(&config.state_root, &session_id, config.backup_keep);
        let paper_trail = config.paper_trail_dir.clone().map(PaperTrail::new);
        Self {
            config,
            synthesizer,
            session_id,
            store,
            paper_trail,
            cancel: CancellationToken::new(),
        }
    }

    /// Usa un token de cancelación externo en lugar del propio.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ejecuta la canalización completa.
    pub async fn run(&self) -> Result<RunReport> {
        info!("🚀 Iniciando síntesis (sesión {})", self.session_id);

        let (mut session, mut tree) = match self.config.resume.as_deref() {
            Some(id) => self.resume(id)?,
            None => self.initialize()?,
        };

        match self.drive(&mut session, &mut tree).await {
            Ok(report) => Ok(report),
            Err(err) => {
                self.record_failure(&mut session, &err);
                Err(err)
            }
        }
    }

    fn initialize(&self) -> Result<(SessionState, Tree)> {
        let builder = TreeBuilder::new(self.config.tree.clone())?;
        let tree = builder.build(&self.config.repo_path)?;

        let (min, max) = estimate_processing_minutes(&tree);
        info!(
            "Árbol construido: {} ficheros, {} directorios. Tiempo estimado: {min}-{max} minutos",
            tree.file_count(),
            tree.directory_count()
        );

        let mut session = SessionState::new(
            self.session_id.clone(),
            tree.root().path().to_path_buf(),
            self.config.topic.clone(),
            self.config.tree.clone(),
        );
        session.total_nodes = tree.total_nodes();
        session.output_path = Some(self.config.output_path.clone());
        session.paper_trail_dir = self.paper_trail.as_ref().map(|t| t.dir().to_path_buf());
        for (path, message) in tree.failures() {
            session.record_warning(Some(path), message);
        }

        self.checkpoint(&mut session, &tree)?;
        info!("Estado de la sesión en {}", self.store.dir().display());
        Ok((session, tree))
    }

    fn resume(&self, session_id: &str) -> Result<(SessionState, Tree)> {
        info!("Reanudando la sesión {session_id}");
        if !self.store.can_resume(session_id) {
            return Err(match self.store.load_state() {
                Err(source) => SynthError::Resume {
                    session_id: session_id.to_string(),
                    source,
                },
                Ok(state) if state.is_completed() => SynthError::ResumeRefused {
                    session_id: session_id.to_string(),
                    reason: "la sesión ya está completada".into(),
                },
                Ok(state) => SynthError::ResumeRefused {
                    session_id: session_id.to_string(),
                    reason: format!("el estado guardado pertenece a la sesión {}", state.session_id),
                },
            });
        }

        let resume_err = |source| SynthError::Resume {
            session_id: session_id.to_string(),
            source,
        };
        let mut session = self.store.load_state().map_err(resume_err)?;
        let tree = self.store.load_tree().map_err(resume_err)?;

        if session.topic != self.config.topic {
            warn!(
                "El tema configurado difiere del de la sesión; se usa el de la sesión: {}",
                session.topic
            );
        }
        session.total_nodes = tree.total_nodes();
        session.processed_nodes = tree.processed_count();
        info!(
            "Sesión reanudada: {}/{} nodos ya procesados",
            session.processed_nodes, session.total_nodes
        );
        Ok((session, tree))
    }

    async fn drive(&self, session: &mut SessionState, tree: &mut Tree) -> Result<RunReport> {
        session.phase = Phase::Processing;
        self.save_state(session)?;
        self.process_nodes(session, tree).await?;
        self.finalize(session, tree).await
    }

    async fn process_nodes(&self, session: &mut SessionState, tree: &mut Tree) -> Result<()> {
        info!("Procesando nodos de las hojas a la raíz...");
        let topic: Arc<str> = Arc::from(session.topic.as_str());
        let concurrency = self.config.concurrency.max(1);

        loop {
            self.ensure_not_cancelled(session.phase)?;

            let batch = scheduler::next_batch(tree);
            if batch.is_empty() {
                if scheduler::is_stalled(tree) {
                    let pending = tree.total_nodes() - tree.processed_count();
                    warn!("No hay nodos listos pero quedan {pending} sin procesar");
                    session.record_warning(None, format!("Procesamiento atascado con {pending} nodos pendientes"));
                }
                break;
            }
            debug!("Lote de {} nodos", batch.len());

            let jobs: Vec<NodeJob> = batch.into_iter().map(|id| NodeJob::prepare(tree, id)).collect();
            let mut pending = pin!(stream::iter(jobs)
                .map(|job| self.execute(job, Arc::clone(&topic)))
                .buffer_unordered(concurrency));

            loop {
                // Un nodo ya terminado se aplica antes de atender la
                // cancelación; los que siguen en curso se abandonan.
                let completed = tokio::select! {
                    biased;
                    next = pending.next() => match next {
                        Some(completed) => completed,
                        None => break,
                    },
                    _ = self.cancel.cancelled() => return Err(self.cancelled(session.phase)),
                };
                self.apply(session, tree, completed)?;
                self.ensure_not_cancelled(session.phase)?;
            }
        }

        info!("✅ Procesamiento de nodos terminado");
        Ok(())
    }

    async fn execute(&self, job: NodeJob, topic: Arc<str>) -> CompletedNode {
        debug!("Procesando nodo: {}", job.path.display());
        let (outcome, content) = match &job.input {
            JobInput::File => self.process_file(&job, &topic).await,
            JobInput::Directory { children } => (self.process_directory(&job, children, &topic).await, None),
        };
        CompletedNode {
            id: job.id,
            path: job.path,
            name: job.name,
            outcome,
            content,
        }
    }

    async fn process_file(&self, job: &NodeJob, topic: &str) -> (NodeOutcome, Option<String>) {
        let content = match read_file_content(&job.path, self.config.max_file_chars).await {
            Ok(FileContent::Text(content)) => content,
            Ok(FileContent::TooLarge { bytes }) => {
                debug!("Fichero demasiado grande ({bytes} bytes): {}", job.path.display());
                return (NodeOutcome::TooLarge { bytes }, None);
            }
            Err(e) => {
                warn!("No se pudo leer {}: {e}", job.path.display());
                return (
                    NodeOutcome::Failed {
                        reason: format!("No se pudo leer el fichero: {e}"),
                    },
                    None,
                );
            }
        };

        if let Some(trail) = &self.paper_trail {
            trail.save_node_content(&job.path, &content);
        }

        let outcome = match self.synthesizer.synthesize_file(&job.path, &content, topic).await {
            Ok(result) => self.accept(job, result, "file"),
            Err(e) => {
                warn!("Error sintetizando el fichero {}: {e:#}", job.path.display());
                NodeOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        };
        (outcome, Some(content))
    }

    async fn process_directory(&self, job: &NodeJob, children: &[ChildSummary], topic: &str) -> NodeOutcome {
        if children.is_empty() {
            debug!("Directorio sin síntesis de hijos: {}", job.path.display());
            return NodeOutcome::NoContent;
        }
        match self.synthesizer.synthesize_directory(&job.path, children, topic).await {
            Ok(result) => self.accept(job, result, "directory"),
            Err(e) => {
                warn!("Error sintetizando el directorio {}: {e:#}", job.path.display());
                NodeOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }

    fn accept(&self, job: &NodeJob, result: SynthesisResult, kind: &str) -> NodeOutcome {
        let text = result.synthesis_text();
        if let Some(trail) = &self.paper_trail {
            if let Some(transcript) = &result.transcript {
                trail.save_prompt(&job.path, &transcript.prompt, kind);
                trail.save_response(&job.path, &transcript.raw_response, &result.document, kind);
            }
            trail.save_synthesis(&job.path, &text, job.depth);
        }
        NodeOutcome::Generated {
            text,
            key_insights: result.key_insights,
        }
    }

    /// Aplica un resultado al árbol y guarda el checkpoint.
    fn apply(&self, session: &mut SessionState, tree: &mut Tree, completed: CompletedNode) -> Result<()> {
        if let NodeOutcome::Failed { reason } = &completed.outcome {
            error!("Fallo al procesar {}: {reason}", completed.path.display());
            session.record_error(Some(completed.path.clone()), reason.clone());
        }
        if !tree.complete(completed.id, completed.outcome, completed.content) {
            warn!("Nodo ya procesado, se ignora: {}", completed.path.display());
            return Ok(());
        }

        session.processed_nodes = tree.processed_count();
        self.checkpoint(session, tree)?;
        info!(
            "[{}/{}] {:.1}% - Procesado: {}",
            tree.processed_count(),
            tree.total_nodes(),
            tree.progress(),
            completed.name
        );
        Ok(())
    }

    async fn finalize(&self, session: &mut SessionState, tree: &Tree) -> Result<RunReport> {
        info!("Generando síntesis final...");
        session.phase = Phase::Finalizing;
        self.save_state(session)?;

        let with_synthesis = tree.nodes_with_synthesis();
        if with_synthesis == 0 {
            return Err(SynthError::NoSynthesis {
                session_id: self.session_id.clone(),
                total: tree.total_nodes(),
            });
        }
        info!("{with_synthesis}/{} nodos con síntesis", tree.total_nodes());

        let root = tree.root();
        let root_summary = root
            .synthesis()
            .map(|s| s.text().to_string())
            .unwrap_or_else(|| MISSING_ROOT_SUMMARY.to_string());
        let insights = tree.all_insights();

        let overall = self
            .synthesizer
            .synthesize_overall(&root_summary, &insights, &session.topic)
            .await
            .map_err(|e| SynthError::Aggregation {
                session_id: self.session_id.clone(),
                reason: format!("{e:#}"),
            })?;
        if let (Some(trail), Some(transcript)) = (&self.paper_trail, &overall.transcript) {
            trail.save_prompt(root.path(), &transcript.prompt, "final");
            trail.save_response(root.path(), &transcript.raw_response, &overall.document, "final");
        }

        let failures: Vec<NodeFailure> = tree
            .failures()
            .into_iter()
            .map(|(path, error)| NodeFailure { path, error })
            .collect();
        let report = FinalReport {
            repo_path: session.repo_path.clone(),
            topic: session.topic.clone(),
            session_id: self.session_id.clone(),
            generated_at: Utc::now(),
            overall,
            total_nodes: tree.total_nodes(),
            file_count: tree.file_count(),
            directory_count: tree.directory_count(),
            max_depth: tree.max_depth(),
            nodes_with_synthesis: with_synthesis,
            failures: failures.clone(),
        };

        let output_path = session
            .output_path
            .clone()
            .unwrap_or_else(|| self.config.output_path.clone());
        let markdown = report.to_markdown();
        write_report(&output_path, &markdown)?;
        if let Some(trail) = &self.paper_trail {
            trail.save_final_report(&markdown);
        }

        session.mark_completed();
        self.save_state(session)?;
        info!("✅ Síntesis completada. Informe en {}", output_path.display());

        Ok(RunReport {
            session_id: self.session_id.clone(),
            output_path,
            report,
            failures,
        })
    }

    fn record_failure(&self, session: &mut SessionState, err: &SynthError) {
        match err {
            SynthError::Cancelled { .. } => {
                warn!(
                    "Síntesis interrumpida; progreso guardado. Reanudar con SYNTH_RESUME={}",
                    self.session_id
                );
                session.record_warning(None, err.to_string());
            }
            _ => {
                error!("La síntesis falló: {err}");
                session.record_error(None, err.to_string());
                session.phase = Phase::Failed;
            }
        }
        if let Err(e) = self.store.save_state(session) {
            error!("No se pudo guardar el estado tras el fallo: {e}");
        }
    }

    fn checkpoint(&self, session: &mut SessionState, tree: &Tree) -> Result<()> {
        self.store
            .checkpoint(session, tree)
            .map_err(|source| SynthError::Checkpoint {
                session_id: self.session_id.clone(),
                phase: session.phase,
                source,
            })
    }

    fn save_state(&self, session: &mut SessionState) -> Result<()> {
        self.store
            .save_state(session)
            .map_err(|source| SynthError::Checkpoint {
                session_id: self.session_id.clone(),
                phase: session.phase,
                source,
            })
    }

    fn ensure_not_cancelled(&self, phase: Phase) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(phase));
        }
        Ok(())
    }

    fn cancelled(&self, phase: Phase) -> SynthError {
        SynthError::Cancelled {
            session_id: self.session_id.clone(),
            phase,
        }
    }
}

/// Lee un fichero como UTF-8 con sustitución, sin leerlo si ya por tamaño en
/// bytes no puede quedar por debajo del umbral.
async fn read_file_content(path: &Path, max_chars: usize) -> std::io::Result<FileContent> {
    let bytes = tokio::fs::metadata(path).await?.len();
    if bytes > (max_chars as u64).saturating_mul(4) {
        return Ok(FileContent::TooLarge { bytes });
    }
    let raw = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&raw).into_owned();
    if text.chars().count() > max_chars {
        return Ok(FileContent::TooLarge { bytes });
    }
    Ok(FileContent::Text(text))
}

fn write_report(path: &Path, markdown: &str) -> Result<()> {
    let report_err = |source| SynthError::Report {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(report_err)?;
    }
    std::fs::write(path, markdown).map_err(report_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn small_file_is_read_lossily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, [b'o', b'k', 0xff]).unwrap();

        match read_file_content(&path, 100).await.unwrap() {
            FileContent::Text(text) => assert_eq!(text, "ok\u{fffd}"),
            FileContent::TooLarge { .. } => panic!("no debería superar el umbral"),
        }
    }

    #[tokio::test]
    async fn file_over_threshold_is_too_large() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(11)).unwrap();

        assert!(matches!(
            read_file_content(&path, 10).await.unwrap(),
            FileContent::TooLarge { bytes: 11 }
        ));
        // Muy por encima del umbral: ni siquiera se lee.
        fs::write(&path, "x".repeat(100)).unwrap();
        assert!(matches!(
            read_file_content(&path, 10).await.unwrap(),
            FileContent::TooLarge { bytes: 100 }
        ));
    }

    #[test]
    fn directory_job_only_carries_generated_children() {
        let mut tree = Tree::new(PathBuf::from("/r"), 10);
        let root = tree.root_id();
        let a = tree.add_child(root, PathBuf::from("/r/a.rs"), NodeKind::File);
        let b = tree.add_child(root, PathBuf::from("/r/b.rs"), NodeKind::File);
        let c = tree.add_child(root, PathBuf::from("/r/c.rs"), NodeKind::File);
        tree.complete(
            a,
            NodeOutcome::Generated {
                text: "síntesis a".into(),
                key_insights: vec![],
            },
            None,
        );
        tree.complete(b, NodeOutcome::TooLarge { bytes: 1 }, None);
        tree.complete(c, NodeOutcome::Failed { reason: "x".into() }, None);

        let job = NodeJob::prepare(&tree, root);
        match job.input {
            JobInput::Directory { children } => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name, "a.rs");
                assert_eq!(children[0].synthesis, "síntesis a");
            }
            JobInput::File => panic!("la raíz es un directorio"),
        }
    }

    #[test]
    fn report_is_written_creating_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/informe.md");
        write_report(&path, "# hola").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "# hola");
    }
}
