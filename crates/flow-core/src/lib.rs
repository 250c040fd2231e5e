//! flow-core: núcleo de ejecución de flujos de nodos y conexiones
//!
//! Propósito:
//! - Proveer el modelo de grafo (nodos tipados, conexiones con handles) y el
//!   scheduler demand-driven que recorre el grafo hacia atrás y hacia adelante,
//!   ejecuta cada nodo exactamente una vez por run y propaga los "kills" de
//!   control de flujo.
//! - Resolver el binding de datos entre nodos (handles con puntos), los
//!   placeholders de secretos/variables de entorno y el templating sobre
//!   salidas de otros nodos.
//! - Registrar resultados por nodo/conexión y emitir eventos best-effort hacia
//!   la UI, detrás de contratos (traits) con implementaciones in-memory.
//!
//! Componentes principales:
//! - `state`: nodos, conexiones, registro de ejecución, binding y blueprints.
//! - `flow`: scheduler recursivo y primitivas de traversal (loops/jumps).
//! - `placeholder`: motor de templates y resolución de secretos/entorno.
//! - `record`: contrato de almacenamiento de resultados + retención.
//! - `events`: emisión de eventos de ciclo de vida y caché de listeners.
//! - `runtime`: contexto de run, journal y configuración desde entorno.
//! - `runner`: puntos de entrada (mock / producción / resume) y envelope HTTP.
//!
//! Re-exports: se exponen símbolos clave para facilitar el uso desde
//! binarios/tests.

pub mod constants;
pub mod errors;
pub mod events;
pub mod flow;
pub mod placeholder;
pub mod record;
pub mod runner;
pub mod runtime;
pub mod state;

// Re-exports públicos principales
pub use errors::{EngineError, NodeFault};
pub use events::{ActiveListeners, EventPublisher, FlowEventType, InMemoryEventPublisher, InMemoryListenerStore, ListenerStore};
pub use flow::Flow;
pub use record::{ExecutionStorage, InMemoryExecutionStorage, NodeRecord};
pub use runner::{FlowRunner, InvocationEvent, InvocationResponse, RunnerServices};
pub use runtime::{RunContext, RunContextParams, RunnerConfig};
pub use state::{AttrDef, Connection, ConnectionSnapshot, ExecutionState, FlowState, Node, NodeBehavior, NodeRegistry,
                WorkflowBlueprint};
pub use placeholder::{EnvVarProvider, InMemoryEnvVars, InMemorySecrets, SecretRecord, SecretsProvider};
