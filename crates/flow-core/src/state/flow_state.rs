//! Estado de flujo por nodo: gobierna cómo se aplican las conexiones driving.

use serde::{Deserialize, Serialize};

/// Estado de flujo de un nodo.
///
/// - `Enabled`: binding normal (idéntico a una conexión incoming).
/// - `FlowIn`: copia todos los atributos públicos del nodo fuente que existan
///   con el mismo nombre en el destino.
/// - `FlowStop`: la conexión driving no aplica nada.
/// - `Pending`: el nodo espera un evento externo (human-in-the-loop); el
///   scheduler no lo ejecuta ni avanza desde él.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "flowIn")]
    FlowIn,
    #[serde(rename = "flowStop")]
    FlowStop,
    #[serde(rename = "pending")]
    Pending,
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState::Enabled
    }
}
