//! Protocolo de loop: etiquetado del cuerpo, iteraciones y resurrección (S6).

mod support;

use std::rc::Rc;

use flow_core::Flow;
use serde_json::json;
use support::TestEnv;

const LOOP_BLUEPRINT: &str = r#"{
    "nodes": [
        {"id": "loop", "handle": "loop", "type": "Loop",
         "attributes": {"items": [1, 2, 3]}},
        {"id": "b", "handle": "b", "type": "Multiply", "attributes": {"factor": 2}},
        {"id": "c", "handle": "c", "type": "Multiply", "attributes": {"factor": 10}},
        {"id": "end", "handle": "end", "type": "LoopEnd"}
    ],
    "connections": [
        {"uuid": "l1", "source_node_id": "loop", "source_handle": "item",
         "target_node_id": "b", "target_handle": "value"},
        {"uuid": "l2", "source_node_id": "b", "source_handle": "result",
         "target_node_id": "c", "target_handle": "value"},
        {"uuid": "l3", "source_node_id": "c", "source_handle": "result",
         "target_node_id": "end", "target_handle": "value"}
    ]
}"#;

#[tokio::test]
async fn s6_loop_tags_body_and_iterates_per_item() {
    let env = TestEnv::new();
    let ctx = env.context(LOOP_BLUEPRINT, "flow-s6", "run-s6");
    let flow = Flow::new(Rc::clone(&ctx));

    let looper = ctx.state.get_node_by_id("loop").unwrap();
    flow.execute_node(&looper).await.unwrap();

    let b = ctx.state.get_node_by_id("b").unwrap();
    let c = ctx.state.get_node_by_id("c").unwrap();
    let end = ctx.state.get_node_by_id("end").unwrap();

    // Membresía del loop: el cuerpo quedó etiquetado con el nodo de origen.
    assert_eq!(b.in_loop().as_deref(), Some("loop"));
    assert_eq!(c.in_loop().as_deref(), Some("loop"));
    assert!(end.in_loop().is_none(), "the terminator is not part of the body");

    // Última iteración: item=3 → b=6 → c=60.
    assert_eq!(looper.get_attr("item"), json!(3));
    assert_eq!(looper.get_attr("index"), json!(2));
    assert_eq!(b.get_attr("result"), json!(6));
    assert_eq!(c.get_attr("result"), json!(60));
    assert!(b.is_processed() && c.is_processed() && end.is_processed());

    // El cuerpo corrió una vez por item; el LoopEnd una sola vez.
    let journal = ctx.journal.borrow();
    let runs_of = |id: &str| journal.nodes_order.iter().filter(|e| e.id == id).count();
    assert_eq!(runs_of("b"), 3);
    assert_eq!(runs_of("c"), 3);
    assert_eq!(runs_of("end"), 1);
    assert_eq!(runs_of("loop"), 1);

    // P2 también bajo resurrecciones: orders estrictos.
    let orders: Vec<usize> = journal.nodes_order.iter().map(|e| e.order).collect();
    let mut sorted = orders.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(orders.len(), sorted.len(), "orders must not repeat");
}

#[tokio::test]
async fn s6_resurrection_clears_transient_state_and_killer_bits() {
    let env = TestEnv::new();
    let ctx = env.context(LOOP_BLUEPRINT, "flow-res", "run-res");

    let b = ctx.state.get_node_by_id("b").unwrap();
    b.mark_processed(true);
    b.add_found_by("l1");
    for conn in ctx.state.connections() {
        conn.make_killer();
    }
    b.kill(&ctx);
    assert!(b.is_killed());

    let revived = b.resurrect(&ctx.state);
    assert!(!revived.is_killed());
    assert!(!revived.is_processed());
    assert!(!revived.was_found_by("l1"));
    assert!(revived.exception().is_none());

    // Las conexiones incidentes del nodo quedaron vivas de nuevo.
    let connections = ctx.state.connections();
    let l1 = connections.iter().find(|c| c.uuid == "l1").unwrap();
    let l2 = connections.iter().find(|c| c.uuid == "l2").unwrap();
    let l3 = connections.iter().find(|c| c.uuid == "l3").unwrap();
    assert!(!l1.is_killer() && !l2.is_killer());
    assert!(l3.is_killer(), "connections not touching the node stay killer");
}

#[tokio::test]
async fn empty_items_disable_the_loop_body() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "loop", "handle": "loop", "type": "Loop", "attributes": {"items": []}},
            {"id": "b", "handle": "b", "type": "Multiply"},
            {"id": "end", "handle": "end", "type": "LoopEnd"}
        ],
        "connections": [
            {"uuid": "l1", "source_node_id": "loop", "source_handle": "item",
             "target_node_id": "b", "target_handle": "value"},
            {"uuid": "l2", "source_node_id": "b", "source_handle": "result",
             "target_node_id": "end", "target_handle": "value"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-empty", "run-empty");
    let flow = Flow::new(Rc::clone(&ctx));

    let looper = ctx.state.get_node_by_id("loop").unwrap();
    flow.execute_node(&looper).await.unwrap();

    let b = ctx.state.get_node_by_id("b").unwrap();
    assert!(b.is_killed(), "body disabled when there is nothing to iterate");
    assert!(looper.is_processed());
}
