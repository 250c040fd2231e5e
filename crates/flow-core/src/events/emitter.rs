//! Publicación best-effort de eventos hacia la UI.
//!
//! Los publishes son fire-and-forget: un fallo se loguea a WARN y se traga
//! (un solo intento por llamada). El canal se deriva del flow id; los eventos
//! de interacción usan su propio canal, con variante multi-tenant.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;

use crate::events::types::{FlowEventType, NodeEventStatus};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Failed(String),
}

/// Canal pub/sub hacia la UI. El backend real (fuera del core) es el que
/// garantiza timeouts cortos; el core sólo intenta una vez.
#[async_trait(?Send)]
pub trait EventPublisher {
    async fn publish(&self, channel: &str, payload: &Value) -> Result<(), PublishError>;
}

/// Publisher en memoria: acumula mensajes por canal (tests y ejecución local).
#[derive(Debug, Default)]
pub struct InMemoryEventPublisher {
    messages: DashMap<String, Vec<Value>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, channel: &str) -> Vec<Value> {
        self.messages.get(channel).map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, channel: &str, payload: &Value) -> Result<(), PublishError> {
        self.messages.entry(channel.to_string()).or_default().push(payload.clone());
        Ok(())
    }
}

/// Publica un evento de ciclo de vida en `execution_updates:{flow_id}`.
pub async fn send_flow_event(publisher: &dyn EventPublisher,
                             flow_id: &str,
                             run_id: &str,
                             node_id: Option<&str>,
                             event_type: FlowEventType,
                             order: i64,
                             status: NodeEventStatus) {
    let message = json!({
        "flow_id": flow_id,
        "run_id": run_id,
        "node_id": node_id,
        "event": event_type.as_str(),
        "order": order,
        "status": status.as_str(),
    });

    let channel = format!("execution_updates:{flow_id}");
    if let Err(e) = publisher.publish(&channel, &message).await {
        log::warn!("flow event publish failed (ignored): {e}");
    }
}

/// Publica un evento de interacción (pausa dirigida por la UI) en
/// `interaction_events:{flow_id}`, o `interaction_events:{tenant}:{flow_id}`
/// cuando hay tenant.
pub async fn send_interaction_event(publisher: &dyn EventPublisher,
                                    flow_id: &str,
                                    run_id: &str,
                                    node_id: &str,
                                    interaction_type: &str,
                                    data: Value,
                                    tenant_id: Option<&str>) {
    let message = json!({
        "type": "interaction_event",
        "flow_id": flow_id,
        "run_id": run_id,
        "node_id": node_id,
        "interaction_type": interaction_type,
        "data": data,
        "tenant_id": tenant_id,
    });

    let channel = match tenant_id {
        Some(tenant) => format!("interaction_events:{tenant}:{flow_id}"),
        None => format!("interaction_events:{flow_id}"),
    };
    if let Err(e) = publisher.publish(&channel, &message).await {
        log::warn!("interaction event publish failed (ignored): {e}");
    }
}
