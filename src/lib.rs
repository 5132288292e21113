//! Síntesis jerárquica de repositorios: se construye un árbol del sistema de
//! archivos, se procesa de las hojas a la raíz con un colaborador de síntesis
//! y se guarda un checkpoint tras cada nodo para poder reanudar.

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod paper_trail;
pub mod prompts;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod synthesis;
pub mod traversal;
pub mod tree;

pub use error::{Result, StoreError, SynthError};
pub use orchestrator::{Orchestrator, RunReport};
pub use synthesis::{ChildSummary, SynthesisResult, Synthesizer};
