//! Modelo de grafo: nodos, conexiones, registro de ejecución y blueprints.
//!
//! Rol en el flujo:
//! - `Node` guarda los atributos públicos (árbol JSON con orden estable) y los
//!   bits de ciclo de vida que el scheduler observa.
//! - `Connection` es un value object inmutable salvo por sus bits `touched` y
//!   `killer`.
//! - `ExecutionState` es el único dueño de nodos y conexiones; los nodos se
//!   refieren entre sí por id/handle y se resuelven en tiempo de traversal.
//! - `blueprint` deserializa un workflow JSON y lo instancia contra el
//!   registro de constructores por clase.

mod behavior;
mod binding;
mod blueprint;
mod connection;
mod flow_state;
mod macros;
mod node;
mod registry;

pub use behavior::{AttrDef, NodeBehavior};
pub use blueprint::{ConnectionBlueprint, NodeBlueprint, NodeRegistry, WorkflowBlueprint};
pub use connection::{Connection, ConnectionSnapshot};
pub use flow_state::FlowState;
pub use node::{Node, NodeFactory};
pub use registry::ExecutionState;
