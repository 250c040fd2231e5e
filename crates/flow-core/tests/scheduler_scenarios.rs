//! Escenarios end-to-end del scheduler sobre grafos chicos.

mod support;

use std::rc::Rc;

use flow_core::node_type;
use flow_core::{ExecutionStorage, Flow};
use serde_json::json;
use support::TestEnv;

// Nodo de prueba: flags de branch preseteables y sin lógica propia.
node_type! {
    node TestFork {
        kind: "TestFork",
        attrs {
            true_path: json!(false),
            false_path: json!(false),
        },
        execute(_node, _ctx) {
            Ok(())
        }
    }
}

// Nodo de prueba: recibe datos por binding y no hace nada más.
node_type! {
    node TestSink {
        kind: "TestSink",
        attrs {
            config: json!({}),
            value: json!(null),
        },
        execute(_node, _ctx) {
            Ok(())
        }
    }
}

#[tokio::test]
async fn s1_linear_pass_through() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "a", "handle": "a", "type": "VariableJson", "attributes": {"value": 42}},
            {"id": "b", "handle": "b", "type": "Multiply", "attributes": {"factor": 2}}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "a", "source_handle": "true_path",
             "target_node_id": "b", "target_handle": "value"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-s1", "run-s1");
    let flow = Flow::new(Rc::clone(&ctx));

    let a = ctx.state.get_node_by_id("a").unwrap();
    flow.execute_node(&a).await.unwrap();

    let b = ctx.state.get_node_by_id("b").unwrap();
    assert!(a.is_processed() && b.is_processed());
    assert!(!a.is_killed() && !b.is_killed());
    assert_eq!(b.get_attr("result"), json!(84));

    // La conexión quedó recorrida y viva.
    let conn = &ctx.state.connections()[0];
    assert!(conn.is_touched());
    assert!(!conn.is_killer());

    // Registro persistido de B con el resultado.
    let record = env.storage
                    .get_node_result("flow-s1", "run-s1", "b", 1, "mock", "mock")
                    .await
                    .unwrap()
                    .expect("record for b");
    assert_eq!(record.variables["result"], json!(84));
    assert!(record.processed);
    assert!(record.error.is_none());

    // P2: orders estrictamente crecientes, sin duplicados.
    let journal = ctx.journal.borrow();
    let orders: Vec<usize> = journal.nodes_order.iter().map(|e| e.order).collect();
    assert_eq!(orders, vec![0, 1]);
}

#[tokio::test]
async fn s2_both_branch_flags_falsy_kill_both_targets() {
    let env = TestEnv::new();
    let mut registry = env.registry();
    registry.register(Rc::new(TestFork));
    registry.register(Rc::new(TestSink));

    let blueprint = r#"{
        "nodes": [
            {"id": "cond", "handle": "cond", "type": "TestFork"},
            {"id": "t", "handle": "t", "type": "TestSink"},
            {"id": "f", "handle": "f", "type": "TestSink"}
        ],
        "connections": [
            {"uuid": "ct", "source_node_id": "cond", "source_handle": "true_path",
             "target_node_id": "t", "target_handle": "value"},
            {"uuid": "cf", "source_node_id": "cond", "source_handle": "false_path",
             "target_node_id": "f", "target_handle": "value"}
        ]
    }"#;
    let ctx = env.context_with_registry(registry, blueprint, "flow-s2", "run-s2");
    let flow = Flow::new(Rc::clone(&ctx));

    let cond = ctx.state.get_node_by_id("cond").unwrap();
    flow.execute_node(&cond).await.unwrap();

    let connections = ctx.state.connections();
    assert!(connections.iter().all(|c| c.is_killer()), "both branch edges end killer");

    let t = ctx.state.get_node_by_id("t").unwrap();
    let f = ctx.state.get_node_by_id("f").unwrap();
    assert!(cond.is_processed());
    assert!(t.is_killed() && f.is_killed());
    assert!(!t.is_processed() && !f.is_processed());

    // P1: todo nodo termina processed o killed, nunca ambos en falso.
    for node in ctx.state.nodes() {
        assert!(node.is_processed() || node.is_killed(), "node {} in limbo", node.id);
    }
}

#[tokio::test]
async fn s3_dotted_target_handle_sets_map_entry() {
    let env = TestEnv::new();
    let mut registry = env.registry();
    registry.register(Rc::new(TestSink));

    let blueprint = r#"{
        "nodes": [
            {"id": "src", "handle": "src", "type": "VariableJson", "attributes": {"value": "x"}},
            {"id": "dst", "handle": "dst", "type": "TestSink"}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "src", "source_handle": "value",
             "target_node_id": "dst", "target_handle": "config.name"}
        ]
    }"#;
    let ctx = env.context_with_registry(registry, blueprint, "flow-s3", "run-s3");
    let flow = Flow::new(Rc::clone(&ctx));

    let src = ctx.state.get_node_by_id("src").unwrap();
    flow.execute_node(&src).await.unwrap();

    let dst = ctx.state.get_node_by_id("dst").unwrap();
    assert_eq!(dst.get_attr("config"), json!({"name": "x"}));
    assert!(dst.exception().is_none(), "no binding error expected");
    assert!(dst.is_processed());
}

#[tokio::test]
async fn b1_node_without_inputs_executes_when_reached() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [{"id": "solo", "handle": "solo", "type": "VariableJson", "attributes": {"value": 1}}],
        "connections": []
    }"#;
    let ctx = env.context(blueprint, "flow-b1", "run-b1");
    let flow = Flow::new(Rc::clone(&ctx));

    let solo = ctx.state.get_node_by_id("solo").unwrap();
    flow.execute_node(&solo).await.unwrap();
    assert!(solo.is_processed());
    assert!(!solo.is_killed());
}

#[tokio::test]
async fn b2_target_of_a_killed_source_is_killed() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "x", "handle": "x", "type": "VariableJson"},
            {"id": "y", "handle": "y", "type": "Multiply"}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "x", "source_handle": "true_path",
             "target_node_id": "y", "target_handle": "value"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-b2", "run-b2");
    let flow = Flow::new(Rc::clone(&ctx));

    let x = ctx.state.get_node_by_id("x").unwrap();
    let y = ctx.state.get_node_by_id("y").unwrap();

    x.kill(&ctx);
    assert!(x.is_killed());

    flow.execute_node(&y).await.unwrap();
    assert!(y.is_killed());
    assert!(!y.is_processed());
}

#[tokio::test]
async fn i1_execute_node_is_a_noop_on_terminal_or_waiting_nodes() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "p", "handle": "p", "type": "VariableJson"},
            {"id": "q", "handle": "q", "type": "VariableJson"},
            {"id": "r", "handle": "r", "type": "VariableJson", "flow_state": "pending"}
        ],
        "connections": []
    }"#;
    let ctx = env.context(blueprint, "flow-i1", "run-i1");
    let flow = Flow::new(Rc::clone(&ctx));

    let p = ctx.state.get_node_by_id("p").unwrap();
    p.mark_processed(true);
    flow.execute_node(&p).await.unwrap();

    let q = ctx.state.get_node_by_id("q").unwrap();
    q.make_blocking();
    flow.execute_node(&q).await.unwrap();

    let r = ctx.state.get_node_by_id("r").unwrap();
    flow.execute_node(&r).await.unwrap();

    assert!(ctx.journal.borrow().nodes_order.is_empty(), "no node actually executed");
    assert!(!q.is_processed() && !r.is_processed());
}

#[tokio::test]
async fn i2_kill_is_idempotent() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "x", "handle": "x", "type": "VariableJson"},
            {"id": "y", "handle": "y", "type": "Multiply"}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "x", "source_handle": "true_path",
             "target_node_id": "y", "target_handle": "value"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-i2", "run-i2");

    let x = ctx.state.get_node_by_id("x").unwrap();
    x.kill(&ctx);
    let after_first: Vec<bool> = ctx.state.connections().iter().map(|c| c.is_killer()).collect();
    let y_killed = ctx.state.get_node_by_id("y").unwrap().is_killed();

    x.kill(&ctx);
    let after_second: Vec<bool> = ctx.state.connections().iter().map(|c| c.is_killer()).collect();
    assert_eq!(after_first, after_second);
    assert_eq!(y_killed, ctx.state.get_node_by_id("y").unwrap().is_killed());
    assert!(x.is_killed());
}

#[tokio::test]
async fn snipe_disables_incoming_edges_too() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "x", "handle": "x", "type": "VariableJson"},
            {"id": "y", "handle": "y", "type": "Multiply"},
            {"id": "z", "handle": "z", "type": "Multiply"}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "x", "source_handle": "true_path",
             "target_node_id": "y", "target_handle": "value"},
            {"uuid": "c2", "source_node_id": "y", "source_handle": "result",
             "target_node_id": "z", "target_handle": "value"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-snipe", "run-snipe");

    let y = ctx.state.get_node_by_id("y").unwrap();
    y.snipe(&ctx);

    assert!(y.is_killed());
    // A diferencia de kill, snipe también deshabilita las entrantes.
    let connections = ctx.state.connections();
    assert!(connections.iter().all(|c| c.is_killer()));
}

#[tokio::test]
async fn binding_error_is_captured_and_the_run_continues() {
    let env = TestEnv::new();
    let mut registry = env.registry();
    registry.register(Rc::new(TestSink));

    // value (string) no es un mapa: el handle punteado debe fallar el binding
    // del destino sin frenar el run.
    let blueprint = r#"{
        "nodes": [
            {"id": "src", "handle": "src", "type": "VariableJson", "attributes": {"value": 7}},
            {"id": "dst", "handle": "dst", "type": "TestSink", "attributes": {"value": "plain"}}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "src", "source_handle": "value",
             "target_node_id": "dst", "target_handle": "value.sub"}
        ]
    }"#;
    let ctx = env.context_with_registry(registry, blueprint, "flow-bind", "run-bind");
    let flow = Flow::new(Rc::clone(&ctx));

    let src = ctx.state.get_node_by_id("src").unwrap();
    flow.execute_node(&src).await.unwrap();

    let dst = ctx.state.get_node_by_id("dst").unwrap();
    assert!(dst.is_processed(), "faulted node still terminates");
    let fault = dst.exception().expect("binding fault");
    assert_eq!(fault.kind_name(), "BindingError");

    let record = env.storage
                    .get_node_result("flow-bind", "run-bind", "dst", 1, "mock", "mock")
                    .await
                    .unwrap()
                    .expect("record");
    assert_eq!(record.error_type.as_deref(), Some("BindingError"));
}
