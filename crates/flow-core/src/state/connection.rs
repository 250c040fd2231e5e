//! Conexiones dirigidas entre (nodo, handle) y su snapshot serializable.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// Handles de destino reservados que marcan una conexión como "driving"
/// (control de flujo). Todo otro handle de destino es "incoming" (datos).
pub(crate) const DRIVING_HANDLES: [&str; 3] = ["node", "a", "b"];

/// Arista dirigida del grafo. La identidad y los endpoints son inmutables;
/// `touched` y `killer` mutan durante el run (por eso `Cell`).
#[derive(Debug)]
pub struct Connection {
    pub uuid: String,
    pub source_node_id: String,
    pub source_handle: String,
    pub target_node_id: String,
    pub target_handle: String,
    touched: Cell<bool>,
    killer: Cell<bool>,
}

impl Connection {
    pub fn new(uuid: impl Into<String>,
               source_node_id: impl Into<String>,
               source_handle: impl Into<String>,
               target_node_id: impl Into<String>,
               target_handle: impl Into<String>)
               -> Self {
        Self { uuid: uuid.into(),
               source_node_id: source_node_id.into(),
               source_handle: source_handle.into(),
               target_node_id: target_node_id.into(),
               target_handle: target_handle.into(),
               touched: Cell::new(false),
               killer: Cell::new(false) }
    }

    /// Marca la conexión como recorrida (en cualquier dirección).
    pub fn touch(&self) {
        self.touched.set(true);
    }

    pub fn is_touched(&self) -> bool {
        self.touched.get()
    }

    /// Deshabilita semánticamente la conexión: su destino no puede consumir el
    /// payload. Sticky hasta `resurrect`.
    pub fn make_killer(&self) {
        log::debug!("making killer {}", self.uuid);
        self.killer.set(true);
    }

    pub fn is_killer(&self) -> bool {
        self.killer.get()
    }

    /// Limpia el bit killer (protocolo de resurrección en loops).
    pub fn resurrect(&self) {
        self.killer.set(false);
    }

    /// Una conexión es driving según el vocabulario reservado de su handle de
    /// destino.
    pub fn is_driving(&self) -> bool {
        DRIVING_HANDLES.contains(&self.target_handle.as_str())
    }

    pub fn to_snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot { uuid: self.uuid.clone(),
                             source_node_id: self.source_node_id.clone(),
                             source_handle: self.source_handle.clone(),
                             target_node_id: self.target_node_id.clone(),
                             target_handle: self.target_handle.clone(),
                             touched: self.is_touched(),
                             killer: self.is_killer() }
    }
}

/// Forma serializable de una conexión, tal como se persiste al final del run
/// y se restaura en un resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub uuid: String,
    pub source_node_id: String,
    pub source_handle: String,
    pub target_node_id: String,
    pub target_handle: String,
    pub touched: bool,
    pub killer: bool,
}
