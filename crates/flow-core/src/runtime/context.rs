//! Contexto de un run: servicios externos, registro de ejecución y journal.
//!
//! Un `RunContext` se construye por run y nunca se comparte entre runs (cada
//! run tiene su propio `ExecutionState`). Los servicios externos (storage,
//! eventos, secretos, entorno) son contratos inyectados; el caché de listeners
//! es el único estado process-wide.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::events::{ActiveListeners, EventPublisher};
use crate::placeholder::{EnvVarProvider, SecretRecord, SecretsProvider};
use crate::record::ExecutionStorage;
use crate::runtime::{ExecutionJournal, RunnerConfig};
use crate::state::ExecutionState;

pub struct RunContext {
    pub run_id: String,
    /// Identificador del workflow versionado (clave de partición de registros
    /// y canal de eventos).
    pub flow_id: String,
    pub stage: String,
    pub sub_stage: String,
    pub trigger_node_id: Option<String>,
    pub state: Rc<ExecutionState>,
    pub storage: Rc<dyn ExecutionStorage>,
    pub listeners: Rc<ActiveListeners>,
    pub secrets: Rc<dyn SecretsProvider>,
    pub env_vars: Rc<dyn EnvVarProvider>,
    pub publisher: Rc<dyn EventPublisher>,
    pub config: RunnerConfig,
    pub journal: RefCell<ExecutionJournal>,
    /// Secretos resueltos durante el run, para redactar los outputs antes de
    /// persistirlos. Mutado sólo por el pase de placeholders (single-threaded).
    pub secrets_map: RefCell<IndexMap<String, SecretRecord>>,
}

/// Servicios y parámetros para armar un `RunContext`.
pub struct RunContextParams {
    pub run_id: String,
    pub flow_id: String,
    pub stage: String,
    pub sub_stage: String,
    pub trigger_node_id: Option<String>,
    pub state: Rc<ExecutionState>,
    pub storage: Rc<dyn ExecutionStorage>,
    pub listeners: Rc<ActiveListeners>,
    pub secrets: Rc<dyn SecretsProvider>,
    pub env_vars: Rc<dyn EnvVarProvider>,
    pub publisher: Rc<dyn EventPublisher>,
    pub config: RunnerConfig,
}

impl RunContext {
    pub fn new(params: RunContextParams) -> Rc<Self> {
        let journal = RefCell::new(ExecutionJournal::new(params.run_id.clone()));
        Rc::new(Self { run_id: params.run_id,
                       flow_id: params.flow_id,
                       stage: params.stage,
                       sub_stage: params.sub_stage,
                       trigger_node_id: params.trigger_node_id,
                       state: params.state,
                       storage: params.storage,
                       listeners: params.listeners,
                       secrets: params.secrets,
                       env_vars: params.env_vars,
                       publisher: params.publisher,
                       config: params.config,
                       journal,
                       secrets_map: RefCell::new(IndexMap::new()) })
    }

    /// Stage efectivo del run: `sub_stage` cuando el run es mock con un
    /// sub-stage real; el stage declarado en caso contrario.
    pub fn effective_stage(&self) -> &str {
        if self.stage == "mock" && self.sub_stage != "mock" {
            &self.sub_stage
        } else {
            &self.stage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActiveListeners, InMemoryEventPublisher, InMemoryListenerStore};
    use crate::placeholder::{InMemoryEnvVars, InMemorySecrets};
    use crate::record::InMemoryExecutionStorage;

    pub(crate) fn test_context(stage: &str, sub_stage: &str) -> RunContext {
        RunContext { run_id: "r1".into(),
                     flow_id: "f1".into(),
                     stage: stage.into(),
                     sub_stage: sub_stage.into(),
                     trigger_node_id: None,
                     state: Rc::new(ExecutionState::new()),
                     storage: Rc::new(InMemoryExecutionStorage::new()),
                     listeners: Rc::new(ActiveListeners::new(Rc::new(InMemoryListenerStore::new()))),
                     secrets: Rc::new(InMemorySecrets::new()),
                     env_vars: Rc::new(InMemoryEnvVars::new()),
                     publisher: Rc::new(InMemoryEventPublisher::new()),
                     config: RunnerConfig::default(),
                     journal: RefCell::new(ExecutionJournal::new("r1")),
                     secrets_map: RefCell::new(IndexMap::new()) }
    }

    #[test]
    fn effective_stage_prefers_real_sub_stage_under_mock() {
        assert_eq!(test_context("mock", "mock").effective_stage(), "mock");
        assert_eq!(test_context("mock", "dev").effective_stage(), "dev");
        assert_eq!(test_context("prod", "dev").effective_stage(), "prod");
    }
}
