//! Formas persistidas por el recorder.
//!
//! Dos shapes, particionadas por `flow_id` y ordenadas por sort key:
//! - snapshot de conexiones: `{run_id}#connections`
//! - resultado de nodo: `{run_id}#{node_id}#{order}#{stage}#{sub_stage}`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Resultado persistido de la ejecución de un nodo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub timestamp: String,
    /// Atributos públicos serializados, ya truncados y con secretos
    /// redactados.
    pub variables: Value,
    pub error_type: Option<String>,
    pub error: Option<String>,
    pub killed: bool,
    pub processed: bool,
    pub node_id: String,
    pub order: usize,
    pub handle: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_number: Option<u64>,
    pub stage: String,
    pub sub_stage: String,
}

impl NodeRecord {
    /// Sort key dentro de la partición del flow.
    pub fn sort_key(&self) -> String {
        format!("{}#{}#{}#{}#{}", self.run_id, self.node_id, self.order, self.stage, self.sub_stage)
    }
}

/// Sort key del snapshot de conexiones de un run.
pub fn connections_sort_key(run_id: &str) -> String {
    format!("{run_id}#connections")
}

/// Run retenido, con un timestamp best-effort para listados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub timestamp: String,
}
