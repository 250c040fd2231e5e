//! Armado del envelope de respuesta HTTP.
//!
//! El runner toma el `response` del último nodo `HttpResponse*` procesado
//! para construir `{statusCode, headers, body}`.

use flow_core::node_type;
use serde_json::json;

node_type! {
    node HttpResponse {
        kind: "HttpResponse",
        attrs {
            status: json!(200),
            headers: json!({"Content-Type": "application/json"}),
            body: json!(""),
            response: json!({}),
        },
        templated: true,
        skip_template: [response],
        execute(node, _ctx) {
            node.set_attr("response",
                          json!({
                              "statusCode": node.get_attr("status"),
                              "headers": node.get_attr("headers"),
                              "body": node.get_attr("body"),
                          }));
            Ok(())
        }
    }
}
