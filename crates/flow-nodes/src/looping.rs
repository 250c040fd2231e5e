//! Protocolo de loop: el par Loop/LoopEnd y los marcadores ListLoop y Jump.
//!
//! El `Loop` descubre su cuerpo con el walk dedicado (terminador `LoopEnd*`,
//! subárboles `ListLoop*` podados, cada visitado etiquetado con `in_loop`) y
//! maneja las iteraciones él mismo: antes de cada iteración posterior a la
//! primera resucita el cuerpo (reset stateful / rebuild stateless, bits
//! killer limpiados) y vuelve a entrar por el scheduler. El `LoopEnd` no es
//! parte del cuerpo, así que ejecuta una única vez.

use std::rc::Rc;

use flow_core::errors::NodeFault;
use flow_core::flow::{find_nodes_in_loop, Flow};
use flow_core::node_type;
use serde_json::{json, Value};

node_type! {
    node Loop {
        kind: "Loop",
        attrs {
            items: json!([]),
            item: json!(null),
            index: json!(null),
        },
        execute(node, ctx) {
            let (body, _terminator) = find_nodes_in_loop(node, &ctx.state);
            let body_ids: Vec<String> = body.iter().map(|n| n.id.clone()).collect();

            let items = match node.get_attr("items") {
                Value::Array(items) => items,
                _ => vec![],
            };

            if items.is_empty() {
                // Sin items no hay iteraciones: el cuerpo queda deshabilitado.
                for conn in ctx.state.out_connections(&node.id) {
                    if body_ids.iter().any(|id| *id == conn.target_node_id) {
                        conn.make_killer();
                    }
                }
                return Ok(());
            }

            let flow = Flow::new(Rc::clone(ctx));
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    // Revisita: cada nodo del cuerpo vuelve a estado virgen.
                    for id in &body_ids {
                        if let Some(member) = ctx.state.get_node_by_id(id) {
                            member.resurrect(&ctx.state);
                        }
                    }
                }

                node.set_attr("item", item.clone());
                node.set_attr("index", json!(index));

                for conn in ctx.state.out_connections(&node.id) {
                    if conn.is_killer() {
                        continue;
                    }
                    if !body_ids.iter().any(|id| *id == conn.target_node_id) {
                        continue;
                    }
                    if let Some(target) = ctx.state.get_node_by_id(&conn.target_node_id) {
                        flow.execute_node(&target)
                            .await
                            .map_err(|e| NodeFault::Execution(e.to_string()))?;
                    }
                }
            }
            Ok(())
        }
    }
}

node_type! {
    node LoopEnd {
        kind: "LoopEnd",
        attrs {},
        execute(_node, _ctx) {
            Ok(())
        }
    }
}

node_type! {
    node ListLoop {
        kind: "ListLoop",
        attrs {
            items: json!([]),
        },
        execute(_node, _ctx) {
            Ok(())
        }
    }
}

node_type! {
    node Jump {
        kind: "Jump",
        attrs {
            target: json!(null),
        },
        execute(_node, _ctx) {
            Ok(())
        }
    }
}
