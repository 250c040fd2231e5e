//! Pausa human-in-the-loop.
//!
//! Sin respuesta del usuario, el nodo queda `pending` y publica un evento de
//! interacción; el scheduler no avanza desde un nodo pending. El resume llega
//! con `user_response` (texto), un mapa de atributos o una confirmación
//! booleana en `user_input_data`, y el nodo re-ejecuta con esos valores.

use flow_core::events::send_interaction_event;
use flow_core::flow::is_truthy;
use flow_core::node_type;
use serde_json::json;

node_type! {
    node HumanGate {
        kind: "HumanGate",
        attrs {
            prompt: json!(""),
            user_response: json!(null),
            user_input_data: json!(null),
        },
        execute(node, ctx) {
            let response = node.get_attr("user_response");
            let confirmation = node.get_attr("user_input_data");

            if !is_truthy(&response) && confirmation.is_null() {
                node.set_pending();
                send_interaction_event(ctx.publisher.as_ref(),
                                       &ctx.flow_id,
                                       &ctx.run_id,
                                       &node.id,
                                       "user_input_required",
                                       json!({ "prompt": node.get_attr("prompt") }),
                                       ctx.config.tenant_id.as_deref()).await;
            }

            // Con input presente no hay nada que computar: las salidas se
            // consumen directo de user_response / user_input_data.
            Ok(())
        }
    }
}
