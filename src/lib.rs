//! nodeflow: motor de ejecución de workflows de nodos y conexiones.
//!
//! Fachada del workspace: re-exporta el core de ejecución (`flow-core`) y la
//! biblioteca de nodos built-in (`flow-nodes`). El backend Postgres vive en
//! `flow-persistence` y se enchufa por los mismos traits.

pub use flow_core::*;
pub use flow_nodes::{builtin_registry, register_builtin_nodes};
