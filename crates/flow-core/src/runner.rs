//! Puntos de entrada de un run: arranque mock desde un nodo, arranque de
//! producción (Route/Schedule) y resume human-in-the-loop, más el mapeo del
//! envelope de invocación al envelope de respuesta HTTP.
//!
//! Es la cara que consume un runtime host: recibe un `InvocationEvent`, arma
//! el entorno de ejecución desde el blueprint y devuelve `{statusCode,
//! headers, body}`.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::events::{send_flow_event, ActiveListeners, EventPublisher, FlowEventType, NodeEventStatus};
use crate::flow::Flow;
use crate::placeholder::{EnvVarProvider, SecretsProvider};
use crate::record::ExecutionStorage;
use crate::runtime::{JournalEntry, RunContext, RunContextParams, RunnerConfig};
use crate::state::{NodeRegistry, WorkflowBlueprint};

fn default_stage() -> String {
    crate::constants::DEFAULT_STAGE.to_string()
}

/// Envelope de invocación que consume el runtime host.
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEvent {
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default = "default_stage")]
    pub sub_stage: String,
    /// Arranque mock desde este nodo.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Reusado en resume; generado en caso contrario.
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub resume: bool,
    #[serde(default)]
    pub resume_node_id: Option<String>,
    /// Respuesta estructurada (mapa) o confirmación booleana.
    #[serde(default)]
    pub user_input: Option<Value>,
    // Campos HTTP de producción, inyectados al nodo de entrada Route.
    #[serde(default, rename = "httpMethod")]
    pub http_method: Option<String>,
    #[serde(default)]
    pub headers: Option<Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default, rename = "queryStringParameters")]
    pub query_string_parameters: Option<Value>,
    #[serde(default)]
    pub cookies: Option<Value>,
    #[serde(default, rename = "pathParameters")]
    pub path_parameters: Option<Value>,
}

impl Default for InvocationEvent {
    fn default() -> Self {
        Self { stage: default_stage(),
               sub_stage: default_stage(),
               node_id: None,
               run_id: None,
               resume: false,
               resume_node_id: None,
               user_input: None,
               http_method: None,
               headers: None,
               body: None,
               query_string_parameters: None,
               cookies: None,
               path_parameters: None }
    }
}

/// Envelope de respuesta estilo HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    pub body: Value,
}

impl InvocationResponse {
    fn error(status_code: u16, message: &str) -> Self {
        Self { status_code, headers: None, body: json!({ "error": message }) }
    }
}

/// Servicios externos inyectados a cada run.
pub struct RunnerServices {
    pub storage: Rc<dyn ExecutionStorage>,
    pub listeners: Rc<ActiveListeners>,
    pub secrets: Rc<dyn SecretsProvider>,
    pub env_vars: Rc<dyn EnvVarProvider>,
    pub publisher: Rc<dyn EventPublisher>,
}

/// Runner de un workflow versionado: blueprint + registro de clases +
/// servicios.
pub struct FlowRunner {
    pub flow_id: String,
    blueprint: WorkflowBlueprint,
    registry: NodeRegistry,
    services: RunnerServices,
    config: RunnerConfig,
}

impl FlowRunner {
    pub fn new(flow_id: impl Into<String>,
               blueprint: WorkflowBlueprint,
               registry: NodeRegistry,
               services: RunnerServices,
               config: RunnerConfig)
               -> Self {
        Self { flow_id: flow_id.into(), blueprint, registry, services, config }
    }

    /// Instancia el blueprint y arma un contexto de run fresco. Aplica la
    /// retención de runs viejos (best-effort, nunca borra el run actual).
    async fn create_execution_environment(&self,
                                          run_id: &str,
                                          stage: &str,
                                          sub_stage: &str,
                                          trigger_node_id: Option<String>)
                                          -> Result<Rc<RunContext>, EngineError> {
        if let Err(e) = self.services
                            .storage
                            .clear_previous_execution(&self.flow_id, run_id, self.config.retention_limit)
                            .await
        {
            log::warn!("retention sweep failed (ignored): {e}");
        }

        let state = self.registry.instantiate(&self.blueprint)?;
        Ok(RunContext::new(RunContextParams { run_id: run_id.to_string(),
                                              flow_id: self.flow_id.clone(),
                                              stage: stage.to_string(),
                                              sub_stage: sub_stage.to_string(),
                                              trigger_node_id,
                                              state,
                                              storage: Rc::clone(&self.services.storage),
                                              listeners: Rc::clone(&self.services.listeners),
                                              secrets: Rc::clone(&self.services.secrets),
                                              env_vars: Rc::clone(&self.services.env_vars),
                                              publisher: Rc::clone(&self.services.publisher),
                                              config: self.config.clone() }))
    }

    async fn store_connections_snapshot(&self, ctx: &RunContext) {
        let snapshot: Vec<_> = ctx.state.connections().iter().map(|c| c.to_snapshot()).collect();
        ctx.journal.borrow_mut().connections = snapshot.clone();
        if let Err(e) = self.services
                            .storage
                            .store_connections_result(&self.flow_id, &ctx.run_id, &snapshot)
                            .await
        {
            log::warn!("store connections snapshot failed (ignored): {e}");
        }
    }

    /// Run mock disparado desde la UI, comenzando en `node_id`.
    pub async fn execute_with_mock_start(&self,
                                         node_id: &str,
                                         run_id: &str,
                                         sub_stage: &str)
                                         -> Result<Value, EngineError> {
        let ctx = self.create_execution_environment(run_id, "mock", sub_stage, Some(node_id.to_string()))
                      .await?;

        let node = ctx.state
                      .get_node_by_id(node_id)
                      .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;

        let flow = Flow::new(Rc::clone(&ctx));
        flow.execute_node(&node).await?;
        self.store_connections_snapshot(&ctx).await;

        let journal_value = serde_json::to_value(&*ctx.journal.borrow()).unwrap_or(Value::Null);
        Ok(journal_value)
    }

    /// Run de producción: arranca en el nodo de entrada Route o Schedule y
    /// deriva el envelope de respuesta del último `HttpResponse*` procesado.
    pub async fn execute_with_production_start(&self,
                                               event: &InvocationEvent,
                                               run_id: &str,
                                               stage: &str)
                                               -> Result<InvocationResponse, EngineError> {
        let ctx = self.create_execution_environment(run_id, stage, "mock", None).await?;

        let entry = ctx.state
                       .nodes()
                       .into_iter()
                       .find(|n| {
                           let kind = n.type_name();
                           kind == "Route" || kind == "Schedule"
                       })
                       .ok_or(EngineError::MissingEntryNode)?;
        let is_schedule = entry.type_name() == "Schedule";

        if entry.type_name() == "Route" {
            entry.set_attr("method", event.http_method.clone().map(Value::String).unwrap_or(json!("GET")));
            entry.set_attr("headers", event.headers.clone().unwrap_or(json!({})));
            entry.set_attr("body", event.body.clone().unwrap_or(json!("")));
            entry.set_attr("query", event.query_string_parameters.clone().unwrap_or(json!({})));
            entry.set_attr("cookies", event.cookies.clone().unwrap_or(json!({})));
            entry.set_attr("route_variables", event.path_parameters.clone().unwrap_or(json!({})));
        }

        let flow = Flow::new(Rc::clone(&ctx));
        flow.execute_node(&entry).await?;
        self.store_connections_snapshot(&ctx).await;

        // Último HttpResponse* procesado define la respuesta.
        let last_http_response = {
            let journal = ctx.journal.borrow();
            journal.nodes_order
                   .iter()
                   .rev()
                   .find(|e| e.type_name.starts_with("HttpResponse"))
                   .map(|e| e.id.clone())
        };

        if let Some(node_id) = last_http_response {
            let response = ctx.state
                              .get_node_by_id(&node_id)
                              .map(|n| n.get_attr("response"))
                              .unwrap_or(Value::Null);

            let envelope = match response {
                Value::Object(map) => {
                    let status = map.get("status")
                                    .or_else(|| map.get("statusCode"))
                                    .and_then(Value::as_u64)
                                    .unwrap_or(200) as u16;
                    InvocationResponse { status_code: status,
                                         headers: Some(map.get("headers").cloned().unwrap_or(json!({}))),
                                         body: map.get("body").cloned().unwrap_or(json!("")) }
                }
                Value::Null => InvocationResponse { status_code: 200,
                                                    headers: Some(json!({"Content-Type": "application/json"})),
                                                    body: json!("") },
                other => InvocationResponse { status_code: 200,
                                              headers: Some(json!({"Content-Type": "application/json"})),
                                              body: json!(other.to_string()) },
            };
            return Ok(envelope);
        }

        if is_schedule {
            // Los schedules no requieren HttpResponse.
            return Ok(InvocationResponse { status_code: 200,
                                           headers: None,
                                           body: json!({
                                               "message": "Schedule executed successfully",
                                               "request_id": run_id,
                                               "execution_type": "schedule",
                                           }) });
        }

        Ok(InvocationResponse { status_code: 500,
                                headers: None,
                                body: json!({
                                    "error": "No valid HttpResponse node found. Make sure the flow leads to a response.",
                                    "request_id": run_id,
                                }) })
    }

    /// Resume de un flujo pausado en un nodo human-in-the-loop.
    pub async fn execute_with_resume(&self,
                                     run_id: &str,
                                     resume_node_id: &str,
                                     user_input: Option<Value>)
                                     -> Result<Value, EngineError> {
        log::info!("resume start: run_id={run_id} node={resume_node_id}");
        let has_listener = self.services.listeners.has_listener(&self.flow_id, "mock", false).await;
        if has_listener {
            send_flow_event(self.services.publisher.as_ref(),
                            &self.flow_id,
                            run_id,
                            None,
                            FlowEventType::ResumeStart,
                            -1,
                            NodeEventStatus::Running).await;
        }

        let records = self.services
                          .storage
                          .get_all_nodes_for_run(&self.flow_id, run_id)
                          .await
                          .map_err(|e| EngineError::Storage(e.to_string()))?;
        if records.is_empty() {
            return Err(EngineError::MissingRunState(run_id.to_string()));
        }

        // Un resume repetido se detecta por el user_response ya aplicado.
        if let Some(resume_record) = records.iter().find(|r| r.node_id == resume_node_id) {
            let already = resume_record.variables
                                       .get("user_response")
                                       .map(crate::flow::is_truthy)
                                       .unwrap_or(false);
            if already {
                return Err(EngineError::AlreadyResumed(run_id.to_string()));
            }
        }

        // El entorno se reconstruye sin limpiar el run actual (la retención
        // excluye el run en curso).
        let ctx = self.create_execution_environment(run_id, "mock", "mock", Some(resume_node_id.to_string()))
                      .await?;

        // Journal previo, excluyendo el nodo de resume (se re-ejecuta y se
        // vuelve a anotar).
        {
            let mut journal = ctx.journal.borrow_mut();
            for record in records.iter().filter(|r| r.node_id != resume_node_id) {
                let mut entry =
                    JournalEntry::new(record.node_id.clone(), record.handle.clone(), record.type_name.clone(), record.order);
                entry.killed = record.killed;
                entry.variables = Some(record.variables.clone());
                entry.error = record.error.clone();
                entry.error_type = record.error_type.clone();
                entry.processed = Some(record.processed);
                journal.push(entry);
            }
        }

        // Restaurar atributos y marcas de procesado sobre los nodos frescos.
        for record in &records {
            let node = match ctx.state.get_node_by_id(&record.node_id) {
                Some(n) => n,
                None => {
                    log::warn!("resume: node {} not in blueprint, skipping", record.node_id);
                    continue;
                }
            };
            if let Value::Object(variables) = &record.variables {
                for (name, value) in variables {
                    if node.has_attr(name) {
                        node.set_attr(name, value.clone());
                    }
                }
            }
            if record.processed {
                node.mark_processed(true);
            }
        }

        let resume_node = ctx.state
                             .get_node_by_id(resume_node_id)
                             .ok_or_else(|| EngineError::UnknownNode(resume_node_id.to_string()))?;

        // Aplicar el input del usuario: mapa → clave a clave; booleano →
        // confirmación; cualquier otra cosa → user_response como string.
        match user_input {
            Some(Value::Object(input)) => {
                for (key, value) in input {
                    if resume_node.has_attr(&key) {
                        resume_node.set_attr(&key, value);
                    }
                }
            }
            Some(Value::Bool(confirm)) => {
                if resume_node.has_attr("user_input_data") {
                    resume_node.set_attr("user_input_data", Value::Bool(confirm));
                }
            }
            Some(other) => {
                if resume_node.has_attr("user_response") {
                    resume_node.set_attr("user_response", Value::String(other.to_string()));
                }
            }
            None => {}
        }

        // El nodo de resume debe re-ejecutarse.
        resume_node.mark_processed(false);

        // Restaurar bits killer del snapshot del run pausado.
        if let Ok(Some(snapshot)) = self.services.storage.get_connections_result(&self.flow_id, run_id).await {
            for conn_data in snapshot.iter().filter(|c| c.killer) {
                if let Some(conn) = ctx.state.connections().iter().find(|c| c.uuid == conn_data.uuid) {
                    conn.make_killer();
                }
            }
        }

        let flow = Flow::new(Rc::clone(&ctx));
        flow.execute_node(&resume_node).await?;
        self.store_connections_snapshot(&ctx).await;

        if has_listener {
            send_flow_event(self.services.publisher.as_ref(),
                            &self.flow_id,
                            run_id,
                            None,
                            FlowEventType::ResumeEnd,
                            -1,
                            NodeEventStatus::Running).await;
        }

        let journal_value = serde_json::to_value(&*ctx.journal.borrow()).unwrap_or(Value::Null);
        Ok(journal_value)
    }

    /// Mapea el envelope de invocación al punto de entrada que corresponda y
    /// convierte errores fatales en 404/500.
    pub async fn handle_event(&self, event: InvocationEvent) -> InvocationResponse {
        let run_id = event.run_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        if event.resume {
            let resume_node_id = match &event.resume_node_id {
                Some(id) => id.clone(),
                None => return InvocationResponse::error(400, "resume_node_id is required for resume requests"),
            };

            return match self.execute_with_resume(&run_id, &resume_node_id, event.user_input.clone()).await {
                Ok(journal) => InvocationResponse { status_code: 200,
                                                    headers: None,
                                                    body: json!({
                                                        "message": "Flow resumed successfully",
                                                        "run_id": run_id,
                                                        "execution_flow": journal,
                                                    }) },
                Err(e) => InvocationResponse::error(e.status_code(), &e.to_string()),
            };
        }

        let is_ui_mock = event.stage == "mock" && event.node_id.is_some();
        if is_ui_mock {
            let node_id = event.node_id.clone().expect("node_id checked above");
            let has_listener = self.services.listeners.has_listener(&self.flow_id, "mock", true).await;
            if has_listener {
                send_flow_event(self.services.publisher.as_ref(),
                                &self.flow_id,
                                &run_id,
                                None,
                                FlowEventType::RunStart,
                                -1,
                                NodeEventStatus::Running).await;
            }

            let result = self.execute_with_mock_start(&node_id, &run_id, &event.sub_stage).await;

            if has_listener {
                send_flow_event(self.services.publisher.as_ref(),
                                &self.flow_id,
                                &run_id,
                                None,
                                FlowEventType::RunEnd,
                                -1,
                                NodeEventStatus::Running).await;
            }

            return match result {
                Ok(journal) => InvocationResponse { status_code: 200, headers: None, body: journal },
                Err(e) => InvocationResponse::error(e.status_code(), &e.to_string()),
            };
        }

        match self.execute_with_production_start(&event, &run_id, &event.stage).await {
            Ok(response) => response,
            Err(e) => InvocationResponse::error(e.status_code(), &e.to_string()),
        }
    }
}
