//! Runner host de nodeflow: consume un envelope de invocación y devuelve el
//! envelope de respuesta HTTP.
//!
//! Uso:
//!   nodeflow <blueprint.json> [event.json]
//!
//! Sin argumentos ejecuta un flujo demo Route → Condition → HttpResponse con
//! un request de producción sintético.

use std::rc::Rc;

use flow_core::{ActiveListeners, FlowRunner, InMemoryEnvVars, InMemoryEventPublisher, InMemoryExecutionStorage,
                InMemoryListenerStore, InMemorySecrets, InvocationEvent, RunnerConfig, RunnerServices,
                WorkflowBlueprint};
use flow_nodes::builtin_registry;

const DEMO_BLUEPRINT: &str = r#"{
    "nodes": [
        {"id": "route", "handle": "route", "type": "Route"},
        {"id": "check", "handle": "check", "type": "Condition",
         "attributes": {"right": "GET", "operator": "equals"}},
        {"id": "ok", "handle": "ok", "type": "HttpResponse",
         "attributes": {"status": 200, "body": "method allowed"}},
        {"id": "denied", "handle": "denied", "type": "HttpResponse",
         "attributes": {"status": 405, "body": "method not allowed"}}
    ],
    "connections": [
        {"uuid": "d1", "source_node_id": "route", "source_handle": "method",
         "target_node_id": "check", "target_handle": "left"},
        {"uuid": "d2", "source_node_id": "check", "source_handle": "true_path",
         "target_node_id": "ok", "target_handle": "node"},
        {"uuid": "d3", "source_node_id": "check", "source_handle": "false_path",
         "target_node_id": "denied", "target_handle": "node"}
    ]
}"#;

const DEMO_EVENT: &str = r#"{
    "stage": "prod",
    "httpMethod": "GET",
    "headers": {"accept": "application/json"},
    "body": ""
}"#;

fn read_or_exit(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
                                     eprintln!("cannot read {path}: {e}");
                                     std::process::exit(1);
                                 })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut args = std::env::args().skip(1);
    let (blueprint_raw, event_raw) = match args.next() {
        Some(blueprint_path) => {
            let blueprint = read_or_exit(&blueprint_path);
            let event = args.next().map(|p| read_or_exit(&p)).unwrap_or_else(|| DEMO_EVENT.to_string());
            (blueprint, event)
        }
        None => (DEMO_BLUEPRINT.to_string(), DEMO_EVENT.to_string()),
    };

    let blueprint = match WorkflowBlueprint::from_json(&blueprint_raw) {
        Ok(bp) => bp,
        Err(e) => {
            eprintln!("invalid blueprint: {e}");
            std::process::exit(1);
        }
    };
    let event: InvocationEvent = match serde_json::from_str(&event_raw) {
        Ok(ev) => ev,
        Err(e) => {
            eprintln!("invalid event: {e}");
            std::process::exit(1);
        }
    };

    let services = RunnerServices { storage: Rc::new(InMemoryExecutionStorage::new()),
                                    listeners: Rc::new(ActiveListeners::new(Rc::new(InMemoryListenerStore::new()))),
                                    secrets: Rc::new(InMemorySecrets::new()),
                                    env_vars: Rc::new(InMemoryEnvVars::new()),
                                    publisher: Rc::new(InMemoryEventPublisher::new()) };

    let runner = FlowRunner::new("local-flow", blueprint, builtin_registry(), services, RunnerConfig::from_env());
    let response = runner.handle_event(event).await;

    match serde_json::to_string_pretty(&response) {
        Ok(pretty) => println!("{pretty}"),
        Err(e) => eprintln!("cannot serialize response: {e}"),
    }
}
