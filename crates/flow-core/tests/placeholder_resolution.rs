//! Resolución de secretos/variables de entorno y templating con lookup hacia
//! atrás (escenarios S4 y S5).

mod support;

use std::rc::Rc;

use flow_core::placeholder::replace_placeholders;
use flow_core::{EngineError, ExecutionStorage, Flow};
use serde_json::json;
use support::TestEnv;

#[tokio::test]
async fn s4_resolved_secret_is_redacted_in_the_stored_record() {
    let env = TestEnv::with_project("proj");
    env.secrets.put("proj", "mock", "API_KEY", "s3cr3t-value");

    let blueprint = r#"{
        "nodes": [
            {"id": "sec", "handle": "sec", "type": "VariableSecret",
             "attributes": {"true_path": "API_KEY"}},
            {"id": "hdr", "handle": "hdr", "type": "VariableString",
             "attributes": {"value": "Bearer <secret:API_KEY>"}}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "sec", "source_handle": "true_path",
             "target_node_id": "hdr", "target_handle": "node"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-s4", "run-s4");
    let flow = Flow::new(Rc::clone(&ctx));

    let sec = ctx.state.get_node_by_id("sec").unwrap();
    flow.execute_node(&sec).await.unwrap();

    // En memoria: el valor real quedó en los atributos.
    assert_eq!(sec.get_attr("true_path"), json!("s3cr3t-value"));
    let hdr = ctx.state.get_node_by_id("hdr").unwrap();
    assert_eq!(hdr.get_attr("value"), json!("Bearer s3cr3t-value"));

    // Persistido: toda ocurrencia literal del secreto queda redactada.
    let sec_record = env.storage
                        .get_node_result("flow-s4", "run-s4", "sec", 0, "mock", "mock")
                        .await
                        .unwrap()
                        .expect("sec record");
    assert_eq!(sec_record.variables["true_path"], json!("<secret::API_KEY>"));

    let hdr_record = env.storage
                        .get_node_result("flow-s4", "run-s4", "hdr", 1, "mock", "mock")
                        .await
                        .unwrap()
                        .expect("hdr record");
    assert_eq!(hdr_record.variables["value"], json!("Bearer <secret::API_KEY>"));
}

#[tokio::test]
async fn missing_secret_and_env_var_expand_to_sentinels() {
    let env = TestEnv::with_project("proj");
    env.env_vars.put("proj", "mock", "HOST", "db.internal");

    let blueprint = r#"{
        "nodes": [
            {"id": "cfg", "handle": "cfg", "type": "VariableString",
             "attributes": {"value": "<secret:NOPE> @ <environment:HOST> / <environment:MISSING>"}}
        ],
        "connections": []
    }"#;
    let ctx = env.context(blueprint, "flow-sent", "run-sent");
    let flow = Flow::new(Rc::clone(&ctx));

    let cfg = ctx.state.get_node_by_id("cfg").unwrap();
    flow.execute_node(&cfg).await.unwrap();

    assert_eq!(cfg.get_attr("value"),
               json!("<SECRET::NOT::FOUND> @ db.internal / <ENV_VAR::NOT::FOUND>"));
    assert!(cfg.exception().is_none(), "missing keys are not node faults");
}

#[tokio::test]
async fn sec_prefix_is_a_synonym_and_maps_resolve_in_place() {
    let env = TestEnv::with_project("proj");
    env.secrets.put("proj", "mock", "TOKEN", "tok-123");

    let blueprint = r#"{
        "nodes": [
            {"id": "req", "handle": "req", "type": "VariableJson",
             "attributes": {"value": {"auth": "<sec:TOKEN>", "nested": {"also": "<secret:TOKEN>"}}}}
        ],
        "connections": []
    }"#;
    let ctx = env.context(blueprint, "flow-syn", "run-syn");
    let flow = Flow::new(Rc::clone(&ctx));

    let req = ctx.state.get_node_by_id("req").unwrap();
    flow.execute_node(&req).await.unwrap();

    assert_eq!(req.get_attr("value"),
               json!({"auth": "tok-123", "nested": {"also": "tok-123"}}));
}

#[tokio::test]
async fn missing_project_id_is_fatal_only_when_resolution_is_needed() {
    // Sin PROJECT_ID pero sin placeholders: el run no lo necesita.
    let env = TestEnv::new();
    let plain = r#"{
        "nodes": [{"id": "a", "handle": "a", "type": "VariableString", "attributes": {"value": "hi"}}],
        "connections": []
    }"#;
    let ctx = env.context(plain, "flow-np", "run-np");
    let flow = Flow::new(Rc::clone(&ctx));
    let a = ctx.state.get_node_by_id("a").unwrap();
    flow.execute_node(&a).await.unwrap();
    assert!(a.is_processed());

    // Con placeholder y sin PROJECT_ID: error fatal del run.
    let env = TestEnv::new();
    let secretful = r#"{
        "nodes": [{"id": "s", "handle": "s", "type": "VariableString",
                   "attributes": {"value": "<secret:KEY>"}}],
        "connections": []
    }"#;
    let ctx = env.context(secretful, "flow-fatal", "run-fatal");
    let flow = Flow::new(Rc::clone(&ctx));
    let s = ctx.state.get_node_by_id("s").unwrap();
    let err = flow.execute_node(&s).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingProjectId));
}

#[tokio::test]
async fn s5_backward_handle_lookup_resolves_unprocessed_upstream() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "up", "handle": "upstream", "type": "VariableJson",
             "attributes": {"output": "from-upstream"}},
            {"id": "tpl", "handle": "tpl", "type": "VariableString",
             "attributes": {"value": "{{ upstream.output }}"}}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "up", "source_handle": "true_path",
             "target_node_id": "tpl", "target_handle": "node"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-s5", "run-s5");

    // `upstream` todavía no procesó: no está en el contexto global, pero es
    // alcanzable por las conexiones entrantes de `tpl`.
    let tpl = ctx.state.get_node_by_id("tpl").unwrap();
    let rendered = replace_placeholders(&json!("{{ upstream.output }}"), &tpl, &ctx.state).unwrap();
    assert_eq!(rendered, json!("from-upstream"));
}

#[tokio::test]
async fn templated_nodes_render_before_execute() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "who", "handle": "who", "type": "VariableJson",
             "attributes": {"value": {"name": "ada"}}},
            {"id": "msg", "handle": "msg", "type": "VariableString",
             "attributes": {"value": "hello {{ who.value.name }}"}}
        ],
        "connections": [
            {"uuid": "c1", "source_node_id": "who", "source_handle": "true_path",
             "target_node_id": "msg", "target_handle": "node"}
        ]
    }"#;
    let ctx = env.context(blueprint, "flow-tpl", "run-tpl");
    let flow = Flow::new(Rc::clone(&ctx));

    let who = ctx.state.get_node_by_id("who").unwrap();
    flow.execute_node(&who).await.unwrap();

    let msg = ctx.state.get_node_by_id("msg").unwrap();
    assert_eq!(msg.get_attr("true_path"), json!("hello ada"));
}

#[tokio::test]
async fn template_error_is_captured_as_node_fault() {
    let env = TestEnv::new();
    let blueprint = r#"{
        "nodes": [
            {"id": "bad", "handle": "bad", "type": "VariableString",
             "attributes": {"value": "{{ nowhere.at.all }}"}}
        ],
        "connections": []
    }"#;
    let ctx = env.context(blueprint, "flow-terr", "run-terr");
    let flow = Flow::new(Rc::clone(&ctx));

    let bad = ctx.state.get_node_by_id("bad").unwrap();
    flow.execute_node(&bad).await.unwrap();

    assert!(bad.is_processed(), "template error does not stall the graph");
    let fault = bad.exception().expect("template fault");
    assert_eq!(fault.kind_name(), "TemplateError");
}
