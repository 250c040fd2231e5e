//! Emisión de eventos de ciclo de vida y caché de listeners activos.

mod emitter;
mod listeners;
mod types;

pub use emitter::{send_flow_event, send_interaction_event, EventPublisher, InMemoryEventPublisher, PublishError};
pub use listeners::{ActiveListeners, InMemoryListenerStore, ListenerRecord, ListenerStore};
pub use types::{FlowEventType, NodeEventStatus};
