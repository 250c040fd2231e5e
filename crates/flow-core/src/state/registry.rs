//! Registro de ejecución: índices de nodos y vistas derivadas de conexiones.
//!
//! Rol en el flujo:
//! - Único dueño de nodos (`Rc<Node>`) y conexiones (`Rc<Connection>`); los
//!   nodos nunca se referencian directamente entre sí.
//! - Las vistas driving/incoming/outgoing se recomputan on demand: la lista de
//!   conexiones está acotada por el tamaño del grafo y no amerita caché.
//! - `should_kill_node` implementa la regla de slots: un grupo de handle con
//!   todos sus feeders deshabilitados no puede satisfacerse.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::state::{Connection, Node};

#[derive(Debug, Default)]
pub struct ExecutionState {
    nodes_by_id: RefCell<HashMap<String, Rc<Node>>>,
    nodes_by_handle: RefCell<HashMap<String, Rc<Node>>>,
    nodes: RefCell<Vec<Rc<Node>>>,
    connections: RefCell<Vec<Rc<Connection>>>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza, en una resurrección stateless) un nodo en los
    /// índices por id y por handle.
    pub fn register_node(&self, node: Rc<Node>) {
        self.nodes_by_id.borrow_mut().insert(node.id.clone(), Rc::clone(&node));
        self.nodes_by_handle.borrow_mut().insert(node.handle.clone(), Rc::clone(&node));
        let mut nodes = self.nodes.borrow_mut();
        if let Some(existing) = nodes.iter_mut().find(|n| n.id == node.id) {
            *existing = node;
        } else {
            nodes.push(node);
        }
    }

    pub fn add_connection(&self, connection: Rc<Connection>) {
        self.connections.borrow_mut().push(connection);
    }

    pub fn get_node_by_id(&self, node_id: &str) -> Option<Rc<Node>> {
        self.nodes_by_id.borrow().get(node_id).cloned()
    }

    pub fn get_node_by_handle(&self, handle: &str) -> Option<Rc<Node>> {
        self.nodes_by_handle.borrow().get(handle).cloned()
    }

    /// Nodos en orden de registro.
    pub fn nodes(&self) -> Vec<Rc<Node>> {
        self.nodes.borrow().clone()
    }

    /// Conexiones en orden de declaración (orden determinista del blueprint).
    pub fn connections(&self) -> Vec<Rc<Connection>> {
        self.connections.borrow().clone()
    }

    // ── vistas derivadas (clasificador) ────────────────────────────────────

    pub fn driving_connections(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.connections
            .borrow()
            .iter()
            .filter(|c| c.target_node_id == node_id && c.is_driving())
            .cloned()
            .collect()
    }

    pub fn in_connections(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.connections
            .borrow()
            .iter()
            .filter(|c| c.target_node_id == node_id && !c.is_driving())
            .cloned()
            .collect()
    }

    pub fn alive_in_connections(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.in_connections(node_id).into_iter().filter(|c| !c.is_killer()).collect()
    }

    pub fn out_connections(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.connections
            .borrow()
            .iter()
            .filter(|c| c.source_node_id == node_id)
            .cloned()
            .collect()
    }

    pub fn out_connections_on_true_path(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.out_connections(node_id)
            .into_iter()
            .filter(|c| c.source_handle == "true_path")
            .collect()
    }

    pub fn out_connections_on_false_path(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.out_connections(node_id)
            .into_iter()
            .filter(|c| c.source_handle == "false_path")
            .collect()
    }

    pub fn out_connections_except_on_false_path(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.out_connections(node_id)
            .into_iter()
            .filter(|c| c.source_handle != "false_path")
            .collect()
    }

    /// Entrantes + salientes (resurrección de un nodo).
    pub fn in_and_out_connections(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.connections
            .borrow()
            .iter()
            .filter(|c| (c.target_node_id == node_id && !c.is_driving()) || c.source_node_id == node_id)
            .cloned()
            .collect()
    }

    /// Toda conexión incidente: salientes, entrantes y driving (snipe).
    pub fn incident_connections(&self, node_id: &str) -> Vec<Rc<Connection>> {
        self.connections
            .borrow()
            .iter()
            .filter(|c| c.source_node_id == node_id || c.target_node_id == node_id)
            .cloned()
            .collect()
    }

    // ── predicados y lecturas del binder ───────────────────────────────────

    /// Regla de kill por slots:
    /// 1. Con conexiones driving, todas killer ⇒ matar.
    /// 2. Con exactamente una incoming, su bit killer decide.
    /// 3. Agrupando incoming por handle de destino, un grupo completamente
    ///    killer ⇒ matar (basta un slot insatisfacible).
    pub fn should_kill_node(&self, node: &Node) -> bool {
        let driving = self.driving_connections(&node.id);
        if !driving.is_empty() && driving.iter().all(|c| c.is_killer()) {
            return true;
        }

        let in_conns = self.in_connections(&node.id);
        if in_conns.len() == 1 {
            return in_conns[0].is_killer();
        }

        let mut handle_groups: IndexMap<&str, Vec<&Rc<Connection>>> = IndexMap::new();
        for conn in &in_conns {
            handle_groups.entry(conn.target_handle.as_str()).or_default().push(conn);
        }

        for (handle, conns) in &handle_groups {
            if conns.iter().all(|c| c.is_killer()) {
                log::debug!("killing node, all feeders of '{}' are killer: {} {}",
                            handle,
                            node.handle,
                            node.type_name());
                return true;
            }
        }

        false
    }

    /// Resuelve el payload que transporta una conexión: desde el nodo fuente,
    /// sigue el handle de origen segmentado por puntos. El primer segmento lee
    /// un atributo; los siguientes descienden por claves de mapas. Se detiene
    /// en el primer null.
    pub fn get_connection_source_variable(&self, connection: &Connection) -> Value {
        let source = match self.get_node_by_id(&connection.source_node_id) {
            Some(n) => n,
            None => return Value::Null,
        };

        let mut parts = connection.source_handle.split('.');
        let mut current = match parts.next() {
            Some(first) => source.get_attr(first),
            None => Value::Null,
        };

        for part in parts {
            if current.is_null() {
                break;
            }
            current = match current {
                Value::Object(map) => map.get(part).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::state::behavior::{AttrDef, NodeBehavior};

    struct Probe;
    impl NodeBehavior for Probe {
        fn kind(&self) -> &str {
            "Probe"
        }
        fn defaults(&self) -> Vec<AttrDef> {
            vec![AttrDef::new("payload", json!(null))]
        }
    }

    fn node(state: &ExecutionState, id: &str) -> Rc<Node> {
        let n = Rc::new(Node::new(id, id, Rc::new(Probe), true));
        state.register_node(Rc::clone(&n));
        n
    }

    #[test]
    fn source_variable_follows_dotted_handle() {
        let state = ExecutionState::new();
        let a = node(&state, "a");
        a.set_attr("payload", json!({"user": {"name": "dion"}}));
        let conn = Connection::new("c1", "a", "payload.user.name", "b", "value");

        assert_eq!(state.get_connection_source_variable(&conn), json!("dion"));
    }

    #[test]
    fn source_variable_stops_at_first_null() {
        let state = ExecutionState::new();
        let a = node(&state, "a");
        a.set_attr("payload", json!({"user": null}));
        let conn = Connection::new("c1", "a", "payload.user.name", "b", "value");

        assert_eq!(state.get_connection_source_variable(&conn), json!(null));
    }

    #[test]
    fn should_kill_when_single_incoming_is_killer() {
        let state = ExecutionState::new();
        let _a = node(&state, "a");
        let b = node(&state, "b");
        let conn = Rc::new(Connection::new("c1", "a", "payload", "b", "value"));
        state.add_connection(Rc::clone(&conn));

        assert!(!state.should_kill_node(&b));
        conn.make_killer();
        assert!(state.should_kill_node(&b));
    }

    #[test]
    fn should_kill_groups_by_target_handle() {
        let state = ExecutionState::new();
        let _a = node(&state, "a");
        let _b = node(&state, "b");
        let c = node(&state, "c");
        let left = Rc::new(Connection::new("c1", "a", "payload", "c", "value"));
        let right = Rc::new(Connection::new("c2", "b", "payload", "c", "value"));
        let other = Rc::new(Connection::new("c3", "b", "payload", "c", "extra"));
        state.add_connection(Rc::clone(&left));
        state.add_connection(Rc::clone(&right));
        state.add_connection(Rc::clone(&other));

        left.make_killer();
        assert!(!state.should_kill_node(&c), "group 'value' still has a live feeder");
        right.make_killer();
        assert!(state.should_kill_node(&c), "group 'value' fully killer kills the node");
    }

    #[test]
    fn node_without_connections_is_never_killed_by_rule() {
        let state = ExecutionState::new();
        let a = node(&state, "a");
        assert!(!state.should_kill_node(&a));
    }
}
