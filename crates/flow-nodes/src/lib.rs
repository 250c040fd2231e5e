//! flow-nodes: biblioteca de clases de nodo built-in.
//!
//! Cada clase se declara con la macro `node_type!` de flow-core y se registra
//! por su nombre de tipo para que el loader de blueprints pueda instanciarla.
//!
//! Módulos:
//! - `entry`: nodos de entrada de producción (Route, Schedule).
//! - `branching`: comparación con salidas true_path/false_path.
//! - `variables`: variables templadas y resolución de secretos/entorno.
//! - `looping`: protocolo Loop/LoopEnd, ListLoop y Jump.
//! - `http`: armado del envelope de respuesta HTTP.
//! - `interaction`: pausa human-in-the-loop.
//! - `transform`: transformaciones simples de datos.

pub mod branching;
pub mod entry;
pub mod http;
pub mod interaction;
pub mod looping;
pub mod transform;
pub mod variables;

use std::rc::Rc;

use flow_core::state::NodeRegistry;

pub use branching::Condition;
pub use entry::{Route, Schedule};
pub use http::HttpResponse;
pub use interaction::HumanGate;
pub use looping::{Jump, ListLoop, Loop, LoopEnd};
pub use transform::Multiply;
pub use variables::{VariableEnvironment, VariableJson, VariableSecret, VariableString};

/// Registra todas las clases built-in en un registro de nodos.
pub fn register_builtin_nodes(registry: &mut NodeRegistry) {
    registry.register(Rc::new(Route));
    registry.register(Rc::new(Schedule));
    registry.register(Rc::new(Condition));
    registry.register(Rc::new(VariableString));
    registry.register(Rc::new(VariableJson));
    registry.register(Rc::new(VariableSecret));
    registry.register(Rc::new(VariableEnvironment));
    registry.register(Rc::new(Loop));
    registry.register(Rc::new(LoopEnd));
    registry.register(Rc::new(ListLoop));
    registry.register(Rc::new(Jump));
    registry.register(Rc::new(HttpResponse));
    registry.register(Rc::new(HumanGate));
    registry.register(Rc::new(Multiply));
}

/// Registro con todos los built-in ya cargados.
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtin_nodes(&mut registry);
    registry
}
