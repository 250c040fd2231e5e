//! Transformaciones simples de datos.

use flow_core::node_type;
use serde_json::json;

node_type! {
    node Multiply {
        kind: "Multiply",
        attrs {
            value: json!(null),
            factor: json!(2),
            result: json!(null),
        },
        execute(node, _ctx) {
            let value = node.get_attr("value").as_f64().unwrap_or(0.0);
            let factor = node.get_attr("factor").as_f64().unwrap_or(1.0);
            let result = value * factor;
            // Resultados enteros se guardan como enteros (binding aguas abajo
            // compara por igualdad JSON).
            if result.fract() == 0.0 {
                node.set_attr("result", json!(result as i64));
            } else {
                node.set_attr("result", json!(result));
            }
            Ok(())
        }
    }
}
