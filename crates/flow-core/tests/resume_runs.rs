//! Pausa human-in-the-loop y resume (ley R2 del journal).

mod support;

use flow_core::ExecutionStorage;
use serde_json::{json, Value};
use support::TestEnv;

const GATED_BLUEPRINT: &str = r#"{
    "nodes": [
        {"id": "start", "handle": "start", "type": "VariableJson",
         "attributes": {"value": {"ticket": 7}}},
        {"id": "gate", "handle": "gate", "type": "HumanGate",
         "attributes": {"prompt": "approve ticket?"}},
        {"id": "after", "handle": "after", "type": "VariableString"}
    ],
    "connections": [
        {"uuid": "r1", "source_node_id": "start", "source_handle": "true_path",
         "target_node_id": "gate", "target_handle": "node"},
        {"uuid": "r2", "source_node_id": "gate", "source_handle": "user_response",
         "target_node_id": "after", "target_handle": "value"}
    ]
}"#;

#[tokio::test]
async fn paused_run_resumes_from_the_gate_without_duplicating_the_journal() {
    let env = TestEnv::new();
    let runner = env.runner(GATED_BLUEPRINT, "flow-resume");

    // Run 1: el gate queda pending y el flujo no avanza más allá.
    let journal = runner.execute_with_mock_start("start", "run-hil", "mock").await.unwrap();
    let entries = journal["nodes_order"].as_array().unwrap().clone();
    let ids: Vec<&str> = entries.iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["start", "gate"], "nothing past the gate executed");

    let records = env.storage.get_all_nodes_for_run("flow-resume", "run-hil").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(!records.iter().any(|r| r.node_id == "after"));

    // Resume con la respuesta del usuario.
    let resumed = runner.execute_with_resume("run-hil", "gate", Some(json!({"user_response": "approved"})))
                        .await
                        .unwrap();
    let resumed_entries = resumed["nodes_order"].as_array().unwrap().clone();

    // R2: el journal del resume es el previo (sin el nodo de resume) más el
    // sufijo producido al retomar; ninguna entrada previa se duplica.
    let resumed_ids: Vec<&str> = resumed_entries.iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(resumed_ids, vec!["start", "gate", "after"]);
    assert_eq!(resumed_entries.iter().filter(|e| e["id"] == "start").count(), 1);

    let orders: Vec<u64> = resumed_entries.iter().map(|e| e["order"].as_u64().unwrap()).collect();
    let mut sorted = orders.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(orders.len(), sorted.len(), "orders stay unique after resume");

    // El nodo aguas abajo corrió con la respuesta aplicada.
    let records = env.storage.get_all_nodes_for_run("flow-resume", "run-hil").await.unwrap();
    let after = records.iter().find(|r| r.node_id == "after").expect("after executed");
    assert_eq!(after.variables["value"], json!("approved"));

    let gate = records.iter().find(|r| r.node_id == "gate").unwrap();
    assert_eq!(gate.variables["user_response"], json!("approved"));
}

#[tokio::test]
async fn a_run_cannot_be_resumed_twice() {
    let env = TestEnv::new();
    let runner = env.runner(GATED_BLUEPRINT, "flow-double");

    runner.execute_with_mock_start("start", "run-double", "mock").await.unwrap();
    runner.execute_with_resume("run-double", "gate", Some(json!({"user_response": "ok"})))
          .await
          .unwrap();

    let err = runner.execute_with_resume("run-double", "gate", Some(json!({"user_response": "again"})))
                    .await
                    .unwrap_err();
    assert!(err.to_string().contains("already resumed"), "got: {err}");
}

#[tokio::test]
async fn resume_without_prior_state_is_rejected() {
    let env = TestEnv::new();
    let runner = env.runner(GATED_BLUEPRINT, "flow-nostate");

    let err = runner.execute_with_resume("run-ghost", "gate", None).await.unwrap_err();
    assert!(err.to_string().contains("no saved state"), "got: {err}");
}

#[tokio::test]
async fn boolean_user_input_lands_on_the_confirmation_attribute() {
    let env = TestEnv::new();
    let runner = env.runner(GATED_BLUEPRINT, "flow-bool");

    runner.execute_with_mock_start("start", "run-bool", "mock").await.unwrap();
    runner.execute_with_resume("run-bool", "gate", Some(Value::Bool(true))).await.unwrap();

    let records = env.storage.get_all_nodes_for_run("flow-bool", "run-bool").await.unwrap();
    let gate = records.iter().find(|r| r.node_id == "gate").unwrap();
    assert_eq!(gate.variables["user_input_data"], json!(true));
    assert!(gate.processed);
}
