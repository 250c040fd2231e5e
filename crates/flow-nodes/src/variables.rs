//! Nodos de variable: exponen un valor por `true_path`.
//!
//! `VariableString` / `VariableJson` son templadas (el pase `{{ ... }}` corre
//! antes de `execute`) y stateless en la práctica: dentro de un loop conviene
//! declararlas `stateful: false` en el blueprint para que re-evalúen sus
//! placeholders en cada iteración.
//!
//! `VariableSecret` / `VariableEnvironment` no ejecutan nada por sí mismas:
//! el prefijo de su nombre de clase hace que el pase de resolución trate su
//! `true_path` como clave literal contra el store del stage efectivo.

use flow_core::node_type;
use serde_json::json;

node_type! {
    node VariableString {
        kind: "VariableString",
        attrs {
            value: json!(""),
            true_path: json!(null),
        },
        templated: true,
        execute(node, _ctx) {
            node.set_attr("true_path", node.get_attr("value"));
            Ok(())
        }
    }
}

node_type! {
    node VariableJson {
        kind: "VariableJson",
        attrs {
            value: json!({}),
            true_path: json!(null),
        },
        templated: true,
        execute(node, _ctx) {
            node.set_attr("true_path", node.get_attr("value"));
            Ok(())
        }
    }
}

node_type! {
    node VariableSecret {
        kind: "VariableSecret",
        attrs {
            true_path: json!(null),
        },
        execute(_node, _ctx) {
            // true_path ya fue resuelto (clave → valor) por el pase de
            // secretos; un secreto inexistente queda como sentinela.
            Ok(())
        }
    }
}

node_type! {
    node VariableEnvironment {
        kind: "VariableEnvironment",
        attrs {
            true_path: json!(null),
        },
        execute(_node, _ctx) {
            Ok(())
        }
    }
}
