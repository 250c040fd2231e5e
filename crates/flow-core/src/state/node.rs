//! Nodo ejecutable: atributos públicos + bits de ciclo de vida.
//!
//! El estado muta durante el run (binding, `execute`, kills), por eso vive en
//! un `RefCell` interno; los nodos se comparten como `Rc<Node>` a través del
//! registro. Ningún borrow se mantiene a través de un `await`: todos los
//! accesos son scoped dentro de cada método.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::errors::NodeFault;
use crate::runtime::RunContext;
use crate::state::behavior::NodeBehavior;
use crate::state::{ExecutionState, FlowState};

/// Constructor de una instancia fresca (con los valores iniciales del
/// blueprint). Se usa para resucitar nodos stateless dentro de un loop.
pub type NodeFactory = Rc<dyn Fn() -> Rc<Node>>;

#[derive(Debug, Default)]
struct NodeCell {
    flow_state: FlowState,
    killed: bool,
    processed: bool,
    blocking: bool,
    found_by: Vec<String>,
    in_loop: Option<String>,
    exception: Option<NodeFault>,
    run_id: Option<String>,
    attributes: IndexMap<String, Value>,
    /// Atributos que el motor de templates debe saltar.
    skip_template: Vec<String>,
}

pub struct Node {
    pub id: String,
    pub handle: String,
    kind: String,
    stateful: bool,
    behavior: Rc<dyn NodeBehavior>,
    cell: RefCell<NodeCell>,
    factory: RefCell<Option<NodeFactory>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
         .field("id", &self.id)
         .field("handle", &self.handle)
         .field("kind", &self.kind)
         .field("killed", &self.is_killed())
         .field("processed", &self.is_processed())
         .finish()
    }
}

impl Node {
    /// Crea un nodo con la tabla de atributos declarada por su clase.
    pub fn new(id: impl Into<String>, handle: impl Into<String>, behavior: Rc<dyn NodeBehavior>, stateful: bool) -> Self {
        let mut attributes = IndexMap::new();
        let mut skip_template = Vec::new();
        for def in behavior.defaults() {
            attributes.insert(def.name.to_string(), def.default.clone());
            if def.skip_template {
                skip_template.push(def.name.to_string());
            }
        }
        let kind = behavior.kind().to_string();
        Self { id: id.into(),
               handle: handle.into(),
               kind,
               stateful,
               behavior,
               cell: RefCell::new(NodeCell { attributes, skip_template, ..NodeCell::default() }),
               factory: RefCell::new(None) }
    }

    /// Nombre de clase del nodo (`type` en journal y registros).
    pub fn type_name(&self) -> String {
        self.kind.clone()
    }

    pub fn behavior(&self) -> Rc<dyn NodeBehavior> {
        Rc::clone(&self.behavior)
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    pub fn set_factory(&self, factory: NodeFactory) {
        *self.factory.borrow_mut() = Some(factory);
    }

    // ── atributos ──────────────────────────────────────────────────────────

    /// Valor de un atributo por nombre (Null si no existe).
    pub fn get_attr(&self, name: &str) -> Value {
        self.cell.borrow().attributes.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.cell.borrow().attributes.contains_key(name)
    }

    /// Asigna (o crea) un atributo por nombre.
    pub fn set_attr(&self, name: &str, value: Value) {
        self.cell.borrow_mut().attributes.insert(name.to_string(), value);
    }

    /// Nombres de atributos públicos en orden de declaración (los que empiezan
    /// con `_` son internos y no se exponen).
    pub fn attribute_names(&self) -> Vec<String> {
        self.cell
            .borrow()
            .attributes
            .keys()
            .filter(|k| !k.starts_with('_'))
            .cloned()
            .collect()
    }

    pub fn skips_template(&self, name: &str) -> bool {
        self.cell.borrow().skip_template.iter().any(|s| s == name)
    }

    /// Serializa los atributos públicos como objeto JSON (contrato `to_dict`).
    pub fn to_dict(&self) -> Value {
        let cell = self.cell.borrow();
        let mut map = serde_json::Map::new();
        for (k, v) in cell.attributes.iter() {
            if !k.starts_with('_') {
                map.insert(k.clone(), v.clone());
            }
        }
        Value::Object(map)
    }

    // ── ciclo de vida ──────────────────────────────────────────────────────

    pub fn flow_state(&self) -> FlowState {
        self.cell.borrow().flow_state
    }

    pub fn set_flow_state(&self, fs: FlowState) {
        self.cell.borrow_mut().flow_state = fs;
    }

    pub fn is_pending(&self) -> bool {
        self.cell.borrow().flow_state == FlowState::Pending
    }

    pub fn set_pending(&self) {
        self.cell.borrow_mut().flow_state = FlowState::Pending;
    }

    pub fn is_blocking(&self) -> bool {
        self.cell.borrow().blocking
    }

    pub fn make_blocking(&self) {
        self.cell.borrow_mut().blocking = true;
    }

    pub fn unblock(&self) {
        self.cell.borrow_mut().blocking = false;
    }

    pub fn is_killed(&self) -> bool {
        self.cell.borrow().killed
    }

    pub fn is_processed(&self) -> bool {
        self.cell.borrow().processed
    }

    pub fn mark_processed(&self, processed: bool) {
        self.cell.borrow_mut().processed = processed;
    }

    pub fn run_id(&self) -> Option<String> {
        self.cell.borrow().run_id.clone()
    }

    pub fn set_run_id(&self, run_id: &str) {
        self.cell.borrow_mut().run_id = Some(run_id.to_string());
    }

    pub fn exception(&self) -> Option<NodeFault> {
        self.cell.borrow().exception.clone()
    }

    pub fn set_exception(&self, fault: Option<NodeFault>) {
        self.cell.borrow_mut().exception = fault;
    }

    /// Registra la conexión que descubrió este nodo. Cada uuid aparece a lo
    /// sumo una vez.
    pub fn add_found_by(&self, connection_uuid: &str) {
        let mut cell = self.cell.borrow_mut();
        if !cell.found_by.iter().any(|u| u == connection_uuid) {
            cell.found_by.push(connection_uuid.to_string());
        }
    }

    pub fn was_found_by(&self, connection_uuid: &str) -> bool {
        self.cell.borrow().found_by.iter().any(|u| u == connection_uuid)
    }

    pub fn found_by(&self) -> Vec<String> {
        self.cell.borrow().found_by.clone()
    }

    pub fn in_loop(&self) -> Option<String> {
        self.cell.borrow().in_loop.clone()
    }

    pub fn set_in_loop(&self, loop_node_id: Option<String>) {
        self.cell.borrow_mut().in_loop = loop_node_id;
    }

    // ── kill / snipe / resurrect ───────────────────────────────────────────

    /// Mata el nodo: marca sus entradas del journal, hace killer cada conexión
    /// saliente y propaga el kill a los destinos que queden sin slots vivos.
    /// La propagación es síncrona y completa antes de que el traversal siga.
    pub fn kill(&self, ctx: &RunContext) {
        self.cell.borrow_mut().killed = true;
        log::debug!("killed: {} {} {}", self.handle, self.id, self.kind);
        ctx.journal.borrow_mut().mark_killed(&self.id);

        for conn in ctx.state.out_connections(&self.id) {
            conn.make_killer();
            if let Some(target) = ctx.state.get_node_by_id(&conn.target_node_id) {
                if !target.is_killed() && ctx.state.should_kill_node(&target) {
                    target.kill(ctx);
                }
            }
        }
    }

    /// Variante fuerte de `kill`: además deshabilita las conexiones entrantes
    /// y driving. Se usa cuando una decisión externa retira el nodo completo.
    pub fn snipe(&self, ctx: &RunContext) {
        self.cell.borrow_mut().killed = true;
        log::debug!("sniped: {} {} {}", self.handle, self.id, self.kind);
        ctx.journal.borrow_mut().mark_killed(&self.id);

        for conn in ctx.state.incident_connections(&self.id) {
            conn.make_killer();
        }
    }

    /// Limpia los campos transitorios del run (la parte "stateful" de la
    /// resurrección).
    pub fn reset(&self) {
        let mut cell = self.cell.borrow_mut();
        cell.killed = false;
        cell.processed = false;
        cell.found_by.clear();
        cell.exception = None;
    }

    /// Prepara el nodo para re-ejecutarse dentro de un loop.
    ///
    /// - Stateful: resetea in place y limpia el bit killer de sus conexiones.
    /// - Stateless: construye una instancia fresca vía factory, la re-registra
    ///   en el estado de ejecución y resucita las conexiones sobre ella.
    pub fn resurrect(self: Rc<Self>, state: &ExecutionState) -> Rc<Node> {
        if self.stateful {
            self.reset();
            for conn in state.in_and_out_connections(&self.id) {
                conn.resurrect();
            }
            return self;
        }

        let factory = self.factory.borrow().clone();
        let new_node = match factory {
            Some(f) => f(),
            // Sin factory registrada no hay forma de reconstruir: degradar a reset.
            None => {
                self.reset();
                Rc::clone(&self)
            }
        };
        state.register_node(Rc::clone(&new_node));
        for conn in state.in_and_out_connections(&new_node.id) {
            conn.resurrect();
        }
        new_node
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::behavior::AttrDef;

    struct WithPrivate;
    impl NodeBehavior for WithPrivate {
        fn kind(&self) -> &str {
            "WithPrivate"
        }
        fn defaults(&self) -> Vec<AttrDef> {
            vec![AttrDef::new("visible", json!("v")), AttrDef::new("_internal", json!("hidden"))]
        }
    }

    fn node() -> Node {
        Node::new("n1", "n1", Rc::new(WithPrivate), true)
    }

    #[test]
    fn to_dict_exposes_only_public_attributes() {
        let n = node();
        assert_eq!(n.to_dict(), json!({"visible": "v"}));
        assert!(n.has_attr("_internal"));
    }

    #[test]
    fn found_by_registers_each_connection_once() {
        let n = node();
        n.add_found_by("c1");
        n.add_found_by("c1");
        n.add_found_by("c2");
        assert_eq!(n.found_by(), vec!["c1".to_string(), "c2".to_string()]);
        assert!(n.was_found_by("c1"));
        assert!(!n.was_found_by("c3"));
    }

    #[test]
    fn reset_clears_only_transient_fields() {
        let n = node();
        n.set_attr("visible", json!("changed"));
        n.mark_processed(true);
        n.add_found_by("c1");
        n.set_exception(Some(crate::errors::NodeFault::NotImplemented));

        n.reset();
        assert!(!n.is_processed());
        assert!(!n.is_killed());
        assert!(n.found_by().is_empty());
        assert!(n.exception().is_none());
        // Los atributos sobreviven a un reset (la resurrección stateful no
        // pierde el estado de datos).
        assert_eq!(n.get_attr("visible"), json!("changed"));
    }
}
