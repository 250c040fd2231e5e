//! Blueprint de workflow: deserialización del JSON y armado del estado de
//! ejecución contra el registro de constructores por clase.
//!
//! Cada `type` del JSON se resuelve contra el `NodeRegistry`. Las instancias
//! quedan registradas (antes de cualquier traversal) y cada una recibe una
//! factory que permite reconstruirla con sus valores iniciales (resurrección
//! stateless).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::state::{Connection, ExecutionState, FlowState, Node, NodeBehavior, NodeFactory};

fn default_stateful() -> bool {
    true
}

/// Declaración de un nodo en el workflow serializado.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeBlueprint {
    pub id: String,
    pub handle: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Overrides sobre los defaults declarados por la clase.
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
    #[serde(default = "default_stateful")]
    pub stateful: bool,
    #[serde(default)]
    pub flow_state: Option<FlowState>,
}

/// Declaración de una conexión en el workflow serializado.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionBlueprint {
    #[serde(default)]
    pub uuid: Option<String>,
    pub source_node_id: String,
    pub source_handle: String,
    pub target_node_id: String,
    pub target_handle: String,
}

/// Workflow completo: nodos + conexiones.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowBlueprint {
    pub nodes: Vec<NodeBlueprint>,
    pub connections: Vec<ConnectionBlueprint>,
}

impl WorkflowBlueprint {
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        serde_json::from_str(raw).map_err(|e| EngineError::InvalidDefinition(e.to_string()))
    }
}

/// Registro de constructores por clase. La instanciación JSON busca acá el
/// comportamiento para cada `type`.
#[derive(Default)]
pub struct NodeRegistry {
    behaviors: HashMap<String, Rc<dyn NodeBehavior>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una clase bajo su `kind()`.
    pub fn register(&mut self, behavior: Rc<dyn NodeBehavior>) {
        self.behaviors.insert(behavior.kind().to_string(), behavior);
    }

    pub fn get(&self, type_name: &str) -> Option<Rc<dyn NodeBehavior>> {
        self.behaviors.get(type_name).cloned()
    }

    /// Construye el estado de ejecución completo a partir de un blueprint.
    /// Todos los nodos quedan registrados antes de cualquier traversal.
    pub fn instantiate(&self, blueprint: &WorkflowBlueprint) -> Result<Rc<ExecutionState>, EngineError> {
        let state = Rc::new(ExecutionState::new());

        for node_bp in &blueprint.nodes {
            let behavior = self.get(&node_bp.type_name)
                               .ok_or_else(|| EngineError::UnknownNodeType(node_bp.type_name.clone()))?;
            let node = build_node(node_bp, &behavior);
            install_factory(&node, node_bp.clone(), Rc::clone(&behavior));
            state.register_node(node);
        }

        for conn_bp in &blueprint.connections {
            let uuid = conn_bp.uuid.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
            state.add_connection(Rc::new(Connection::new(uuid,
                                                         conn_bp.source_node_id.clone(),
                                                         conn_bp.source_handle.clone(),
                                                         conn_bp.target_node_id.clone(),
                                                         conn_bp.target_handle.clone())));
        }

        Ok(state)
    }
}

/// Instancia un nodo con defaults de clase + overrides del blueprint.
fn build_node(bp: &NodeBlueprint, behavior: &Rc<dyn NodeBehavior>) -> Rc<Node> {
    let node = Node::new(bp.id.clone(), bp.handle.clone(), Rc::clone(behavior), bp.stateful);
    for (name, value) in &bp.attributes {
        node.set_attr(name, value.clone());
    }
    if let Some(fs) = bp.flow_state {
        node.set_flow_state(fs);
    }
    Rc::new(node)
}

/// Instala la factory de resurrección: produce instancias frescas que a su vez
/// llevan la misma factory (un loop puede resucitar el mismo nodo varias
/// veces).
fn install_factory(node: &Rc<Node>, bp: NodeBlueprint, behavior: Rc<dyn NodeBehavior>) {
    let holder: Rc<RefCell<Option<NodeFactory>>> = Rc::new(RefCell::new(None));
    let inner = Rc::clone(&holder);
    let factory: NodeFactory = Rc::new(move || {
        let fresh = build_node(&bp, &behavior);
        if let Some(f) = inner.borrow().as_ref() {
            fresh.set_factory(Rc::clone(f));
        }
        fresh
    });
    *holder.borrow_mut() = Some(Rc::clone(&factory));
    node.set_factory(factory);
}
