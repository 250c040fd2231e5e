//! Nodo de comparación con salidas true_path/false_path.
//!
//! El fan-out de branch del scheduler hace el resto: la rama cuyo flag quede
//! falsy pierde sus conexiones salientes.

use flow_core::flow::is_truthy;
use flow_core::node_type;
use serde_json::{json, Value};

fn compare(operator: &str, left: &Value, right: &Value) -> bool {
    match operator {
        "equals" => left == right,
        "not_equals" => left != right,
        "greater_than" => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l > r,
            _ => false,
        },
        "less_than" => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l < r,
            _ => false,
        },
        "contains" => match (left, right) {
            (Value::String(l), Value::String(r)) => l.contains(r.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            (Value::Object(map), Value::String(key)) => map.contains_key(key),
            _ => false,
        },
        "truthy" => is_truthy(left),
        _ => false,
    }
}

node_type! {
    node Condition {
        kind: "Condition",
        attrs {
            left: json!(null),
            right: json!(null),
            operator: json!("equals"),
            true_path: json!(false),
            false_path: json!(false),
        },
        execute(node, _ctx) {
            let operator = match node.get_attr("operator") {
                Value::String(op) => op,
                _ => "equals".to_string(),
            };
            let outcome = compare(&operator, &node.get_attr("left"), &node.get_attr("right"));
            node.set_attr("true_path", json!(outcome));
            node.set_attr("false_path", json!(!outcome));
            Ok(())
        }
    }
}
