//! Helpers compartidos por los tests de integración del core.

use std::rc::Rc;

use flow_core::state::NodeRegistry;
use flow_core::{ActiveListeners, FlowRunner, InMemoryEnvVars, InMemoryEventPublisher, InMemoryExecutionStorage,
                InMemoryListenerStore, InMemorySecrets, RunContext, RunContextParams, RunnerConfig, RunnerServices,
                WorkflowBlueprint};
use flow_nodes::register_builtin_nodes;

pub struct TestEnv {
    pub storage: Rc<InMemoryExecutionStorage>,
    pub publisher: Rc<InMemoryEventPublisher>,
    pub listener_store: Rc<InMemoryListenerStore>,
    pub secrets: Rc<InMemorySecrets>,
    pub env_vars: Rc<InMemoryEnvVars>,
    pub config: RunnerConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self { storage: Rc::new(InMemoryExecutionStorage::new()),
               publisher: Rc::new(InMemoryEventPublisher::new()),
               listener_store: Rc::new(InMemoryListenerStore::new()),
               secrets: Rc::new(InMemorySecrets::new()),
               env_vars: Rc::new(InMemoryEnvVars::new()),
               config: RunnerConfig::default() }
    }

    pub fn with_project(project_id: &str) -> Self {
        let mut env = Self::new();
        env.config.project_id = Some(project_id.to_string());
        env
    }

    pub fn registry(&self) -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        register_builtin_nodes(&mut registry);
        registry
    }

    fn listeners(&self) -> Rc<ActiveListeners> {
        let store = Rc::clone(&self.listener_store) as Rc<dyn flow_core::ListenerStore>;
        Rc::new(ActiveListeners::new(store))
    }

    /// Contexto de run sobre un blueprint instanciado con los built-in.
    pub fn context(&self, blueprint_json: &str, flow_id: &str, run_id: &str) -> Rc<RunContext> {
        self.context_with_registry(self.registry(), blueprint_json, flow_id, run_id)
    }

    pub fn context_with_registry(&self,
                                 registry: NodeRegistry,
                                 blueprint_json: &str,
                                 flow_id: &str,
                                 run_id: &str)
                                 -> Rc<RunContext> {
        let blueprint = WorkflowBlueprint::from_json(blueprint_json).expect("blueprint");
        let state = registry.instantiate(&blueprint).expect("instantiate");
        let storage = Rc::clone(&self.storage) as Rc<dyn flow_core::ExecutionStorage>;
        let secrets = Rc::clone(&self.secrets) as Rc<dyn flow_core::SecretsProvider>;
        let env_vars = Rc::clone(&self.env_vars) as Rc<dyn flow_core::EnvVarProvider>;
        let publisher = Rc::clone(&self.publisher) as Rc<dyn flow_core::EventPublisher>;
        RunContext::new(RunContextParams { run_id: run_id.to_string(),
                                           flow_id: flow_id.to_string(),
                                           stage: "mock".to_string(),
                                           sub_stage: "mock".to_string(),
                                           trigger_node_id: None,
                                           state,
                                           storage,
                                           listeners: self.listeners(),
                                           secrets,
                                           env_vars,
                                           publisher,
                                           config: self.config.clone() })
    }

    /// Runner completo (entry points + envelope) sobre el blueprint.
    pub fn runner(&self, blueprint_json: &str, flow_id: &str) -> FlowRunner {
        self.runner_with_registry(self.registry(), blueprint_json, flow_id)
    }

    pub fn runner_with_registry(&self, registry: NodeRegistry, blueprint_json: &str, flow_id: &str) -> FlowRunner {
        let blueprint = WorkflowBlueprint::from_json(blueprint_json).expect("blueprint");
        let storage = Rc::clone(&self.storage) as Rc<dyn flow_core::ExecutionStorage>;
        let secrets = Rc::clone(&self.secrets) as Rc<dyn flow_core::SecretsProvider>;
        let env_vars = Rc::clone(&self.env_vars) as Rc<dyn flow_core::EnvVarProvider>;
        let publisher = Rc::clone(&self.publisher) as Rc<dyn flow_core::EventPublisher>;
        let services = RunnerServices { storage,
                                        listeners: self.listeners(),
                                        secrets,
                                        env_vars,
                                        publisher };
        FlowRunner::new(flow_id, blueprint, registry, services, self.config.clone())
    }
}
