//! Errores del core: fallas capturadas por nodo y errores fatales del run.
//!
//! La distinción importa para la propagación (ver taxonomía en DESIGN.md):
//! - `NodeFault` queda registrado en el nodo (`exception`) y el run continúa.
//! - `EngineError` aborta el run y llega al caller (envelope 404/500).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Falla capturada durante el ciclo de vida de un nodo. Nunca detiene el run
/// por sí sola: el nodo queda `processed` con `exception` poblada.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum NodeFault {
    #[error("execute is not implemented for this node")]
    NotImplemented,
    #[error("can't configure '{attribute}': existing type is {shape}, not a map")]
    Binding { attribute: String, shape: String },
    #[error("template rendering failed: {0}")]
    Template(String),
    #[error("{0}")]
    Execution(String),
}

impl NodeFault {
    /// Nombre estable de la clase de error, persistido como `error_type` en el
    /// registro del nodo.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeFault::NotImplemented => "NotImplemented",
            NodeFault::Binding { .. } => "BindingError",
            NodeFault::Template(_) => "TemplateError",
            NodeFault::Execution(_) => "ExecutionError",
        }
    }
}

/// Errores fatales de un run: entrada desconocida, definición inválida o
/// precondiciones de resolución ausentes. Se propagan al caller sin tocar el
/// estado de nodos.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("node id {0} not found")]
    UnknownNode(String),
    #[error("no valid entry node found (expected Route or Schedule)")]
    MissingEntryNode,
    #[error("PROJECT_ID environment variable is not set")]
    MissingProjectId,
    #[error("no saved state found for run {0}")]
    MissingRunState(String),
    #[error("run {0} was already resumed, cannot resume twice")]
    AlreadyResumed(String),
    #[error("unknown node type '{0}' in workflow definition")]
    UnknownNodeType(String),
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Código de estado del envelope de respuesta para este error.
    /// Entradas inexistentes se reportan como 404; el resto como 500.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::UnknownNode(_)
            | EngineError::MissingEntryNode
            | EngineError::MissingRunState(_)
            | EngineError::AlreadyResumed(_) => 404,
            _ => 500,
        }
    }
}
