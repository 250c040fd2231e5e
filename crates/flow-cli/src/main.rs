//! flow-cli: Command Line Interface for the nodeflow engine.
//!
//! This is a simple CLI binary that executes a workflow blueprint with the
//! in-memory services. Pass a blueprint JSON path and optionally a start node
//! id; without arguments it runs a small built-in demo flow.

use std::rc::Rc;

use flow_core::{ActiveListeners, FlowRunner, InMemoryEnvVars, InMemoryEventPublisher, InMemoryExecutionStorage,
                InMemoryListenerStore, InMemorySecrets, InvocationEvent, RunnerConfig, RunnerServices,
                WorkflowBlueprint};
use flow_nodes::builtin_registry;

const DEMO_BLUEPRINT: &str = r#"{
    "nodes": [
        {"id": "var", "handle": "var", "type": "VariableString",
         "attributes": {"value": "hello from the demo flow"}},
        {"id": "cond", "handle": "cond", "type": "Condition",
         "attributes": {"right": "hello from the demo flow", "operator": "equals"}}
    ],
    "connections": [
        {"uuid": "demo-1", "source_node_id": "var", "source_handle": "true_path",
         "target_node_id": "cond", "target_handle": "left"}
    ]
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("nodeflow CLI");
    println!("============");

    let mut args = std::env::args().skip(1);
    let (raw, start_node) = match args.next() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| {
                                                        eprintln!("cannot read blueprint {path}: {e}");
                                                        std::process::exit(1);
                                                    });
            (raw, args.next())
        }
        None => (DEMO_BLUEPRINT.to_string(), Some("var".to_string())),
    };

    let blueprint = match WorkflowBlueprint::from_json(&raw) {
        Ok(bp) => bp,
        Err(e) => {
            eprintln!("invalid blueprint: {e}");
            std::process::exit(1);
        }
    };

    let services = RunnerServices { storage: Rc::new(InMemoryExecutionStorage::new()),
                                    listeners: Rc::new(ActiveListeners::new(Rc::new(InMemoryListenerStore::new()))),
                                    secrets: Rc::new(InMemorySecrets::new()),
                                    env_vars: Rc::new(InMemoryEnvVars::new()),
                                    publisher: Rc::new(InMemoryEventPublisher::new()) };

    let runner = FlowRunner::new("cli-flow", blueprint, builtin_registry(), services, RunnerConfig::from_env());

    let event = InvocationEvent { node_id: start_node, ..InvocationEvent::default() };
    let response = runner.handle_event(event).await;
    match serde_json::to_string_pretty(&response) {
        Ok(pretty) => println!("{pretty}"),
        Err(e) => eprintln!("cannot serialize response: {e}"),
    }
}
