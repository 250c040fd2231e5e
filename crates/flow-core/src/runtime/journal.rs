//! Journal de ejecución: orden de nodos ejecutados + snapshot de conexiones.
//!
//! `nodes_order` es append-only: cada `execute` agrega exactamente una entrada
//! con `order` creciente desde 0. Un kill posterior marca `killed` sobre las
//! entradas ya escritas (el nodo ejecutó, pero quedó deshabilitado después).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::ConnectionSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub handle: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub order: usize,
    #[serde(default)]
    pub killed: bool,
    // Campos presentes sólo al reconstruir un journal desde registros
    // persistidos (resume): la UI los usa para re-pintar el run previo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
}

impl JournalEntry {
    pub fn new(id: impl Into<String>, handle: impl Into<String>, type_name: impl Into<String>, order: usize) -> Self {
        Self { id: id.into(),
               handle: handle.into(),
               type_name: type_name.into(),
               order,
               killed: false,
               variables: None,
               error: None,
               error_type: None,
               processed: None }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ExecutionJournal {
    pub run_id: String,
    pub nodes_order: Vec<JournalEntry>,
    pub connections: Vec<ConnectionSnapshot>,
}

impl ExecutionJournal {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self { run_id: run_id.into(), nodes_order: Vec::new(), connections: Vec::new() }
    }

    /// Próximo `order` a asignar.
    pub fn next_order(&self) -> usize {
        self.nodes_order.len()
    }

    pub fn push(&mut self, entry: JournalEntry) {
        self.nodes_order.push(entry);
    }

    /// Marca como killed todas las entradas de un nodo.
    pub fn mark_killed(&mut self, node_id: &str) {
        for entry in self.nodes_order.iter_mut().filter(|e| e.id == node_id) {
            entry.killed = true;
        }
    }
}
