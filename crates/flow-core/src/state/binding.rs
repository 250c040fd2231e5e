//! Binder de datos: mueve payloads de conexiones hacia atributos del destino.
//!
//! Reglas:
//! - Conexión incoming: el payload resuelto del handle de origen se escribe en
//!   el atributo nombrado por el handle de destino. Un handle con punto
//!   (`parent.sub`) escribe la entrada `sub` dentro del mapa `parent`.
//! - Conexión driving: depende del `flow_state` del destino. `Enabled` aplica
//!   como incoming; `FlowIn` copia todos los atributos públicos homónimos del
//!   nodo fuente; cualquier otro estado no hace nada.

use serde_json::Value;

use crate::errors::NodeFault;
use crate::state::{Connection, ExecutionState, FlowState, Node};

/// Nombre legible de la forma de un valor JSON, usado en errores de binding.
fn value_shape(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

impl Node {
    /// Aplica el payload de una conexión incoming sobre este nodo.
    pub fn apply_from_incoming_connection(&self, state: &ExecutionState, connection: &Connection) -> Result<(), NodeFault> {
        let var = state.get_connection_source_variable(connection);
        self.apply_attribute(&connection.target_handle, var)
    }

    /// Aplica una conexión driving según el `flow_state` del destino.
    pub fn apply_from_driving_connection(&self, state: &ExecutionState, connection: &Connection) -> Result<(), NodeFault> {
        if self.flow_state() == FlowState::Enabled {
            return self.apply_from_incoming_connection(state, connection);
        }

        // Flow in: copiar los atributos del fuente que existan con el mismo
        // nombre en el destino.
        if self.flow_state() != FlowState::FlowIn {
            return Ok(());
        }

        let source = match state.get_node_by_id(&connection.source_node_id) {
            Some(n) => n,
            None => return Ok(()),
        };

        for attr in source.attribute_names() {
            if self.has_attr(&attr) {
                self.set_attr(&attr, source.get_attr(&attr));
            }
        }
        Ok(())
    }

    /// Escribe `value` en el atributo `property_name`. Con un handle punteado,
    /// el padre debe ser un mapa (o no existir aún); cualquier otra forma es un
    /// error de binding estructurado.
    pub(crate) fn apply_attribute(&self, property_name: &str, value: Value) -> Result<(), NodeFault> {
        if let Some((parent_attr, sub_key)) = property_name.split_once('.') {
            let parent = self.get_attr(parent_attr);
            let mut map = match parent {
                Value::Object(map) => map,
                Value::Null if !self.has_attr(parent_attr) => serde_json::Map::new(),
                other => {
                    return Err(NodeFault::Binding { attribute: parent_attr.to_string(),
                                                    shape: value_shape(&other).to_string() })
                }
            };
            map.insert(sub_key.to_string(), value);
            self.set_attr(parent_attr, Value::Object(map));
        } else {
            self.set_attr(property_name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::state::behavior::{AttrDef, NodeBehavior};

    struct Target;
    impl NodeBehavior for Target {
        fn kind(&self) -> &str {
            "Target"
        }
        fn defaults(&self) -> Vec<AttrDef> {
            vec![AttrDef::new("config", json!({})), AttrDef::new("plain", json!("x"))]
        }
    }

    fn target() -> Node {
        Node::new("t", "t", Rc::new(Target), true)
    }

    #[test]
    fn dotted_target_handle_sets_map_entry() {
        let node = target();
        node.apply_attribute("config.name", json!("x")).unwrap();
        assert_eq!(node.get_attr("config"), json!({"name": "x"}));
    }

    #[test]
    fn dotted_target_handle_on_non_map_is_a_binding_error() {
        let node = target();
        let err = node.apply_attribute("plain.sub", json!(1)).unwrap_err();
        match err {
            NodeFault::Binding { attribute, shape } => {
                assert_eq!(attribute, "plain");
                assert_eq!(shape, "string");
            }
            other => panic!("expected binding fault, got {:?}", other),
        }
    }

    #[test]
    fn missing_parent_starts_as_fresh_map() {
        let node = target();
        node.apply_attribute("extra.key", json!(true)).unwrap();
        assert_eq!(node.get_attr("extra"), json!({"key": true}));
    }

    #[test]
    fn plain_handle_sets_attribute_directly() {
        let node = target();
        node.apply_attribute("plain", json!(42)).unwrap();
        assert_eq!(node.get_attr("plain"), json!(42));
    }
}
