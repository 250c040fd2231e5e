//! Nodos de entrada de producción.
//!
//! El runner inyecta los campos HTTP del envelope sobre el `Route` antes de
//! ejecutar; el `Schedule` sólo marca el arranque de un flujo agendado.

use flow_core::node_type;
use serde_json::json;

node_type! {
    node Route {
        kind: "Route",
        attrs {
            method: json!("GET"),
            headers: json!({}),
            body: json!(""),
            query: json!({}),
            cookies: json!({}),
            route_variables: json!({}),
        },
        execute(_node, _ctx) {
            // Los atributos ya llegan poblados por el runner; el nodo sólo
            // expone la request al resto del grafo.
            Ok(())
        }
    }
}

node_type! {
    node Schedule {
        kind: "Schedule",
        attrs {
            interval: json!(null),
        },
        execute(_node, _ctx) {
            Ok(())
        }
    }
}
