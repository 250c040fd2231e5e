//! Scheduler demand-driven: lleva cada nodo alcanzable a `processed` o
//! `killed`, en un orden consistente con dependencias de datos y decisiones de
//! control de flujo.
//!
//! `execute_node` es la primitiva recursiva única e idempotente:
//! 1. guards (blocking / pending / should-kill / terminal);
//! 2. fase backward: ejecutar fuentes pendientes de conexiones driving e
//!    incoming;
//! 3. fase de binding: aplicar conexiones driving y las incoming vivas;
//! 4. fase execute: journal, resolución de placeholders, `execute` del nodo,
//!    registro del resultado y fan-out de branch;
//! 5. fase forward: descubrir y ejecutar destinos por conexiones salientes.
//!
//! El kill se propaga sincrónicamente (completa antes de que el traversal
//! continúe). Una conexión killer nunca se sigue, pero su destino igual pasa
//! por `should_kill`: un branch deshabilitado termina `killed`, no en limbo.

use std::rc::Rc;

use chrono::Utc;

use crate::errors::{EngineError, NodeFault};
use crate::events::{send_flow_event, FlowEventType, NodeEventStatus};
use crate::flow::LocalBoxFuture;
use crate::placeholder::{self, apply_placeholder_replacements, resolve_environment_variables, resolve_secrets};
use crate::record::{redact_secrets, truncate_large_values, NodeRecord};
use crate::runtime::{JournalEntry, RunContext};
use crate::state::Node;

pub struct Flow {
    ctx: Rc<RunContext>,
}

impl Flow {
    pub fn new(ctx: Rc<RunContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> Rc<RunContext> {
        Rc::clone(&self.ctx)
    }

    /// Ejecuta un nodo (y, por demanda, sus dependencias y descendientes).
    /// Idempotente: no-op sobre nodos blocking, pending, procesados o killed.
    pub fn execute_node<'a>(&'a self, node: &'a Rc<Node>) -> LocalBoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            if node.is_blocking() {
                log::debug!("is blocking: {} {} {}", node.id, node.handle, node.type_name());
                return Ok(());
            }

            if node.is_pending() {
                log::debug!("is pending: {} {} {}", node.id, node.handle, node.type_name());
                return Ok(());
            }

            if !node.is_killed() && self.ctx.state.should_kill_node(node) {
                log::debug!("killing node: {} {}", node.handle, node.type_name());
                node.kill(&self.ctx);
                return Ok(());
            }

            if node.is_processed() || node.is_killed() {
                return Ok(());
            }

            let driven = !self.ctx.state.driving_connections(&node.id).is_empty();
            let has_in = !self.ctx.state.in_connections(&node.id).is_empty();
            if (driven || has_in) && !self.all_connections_processed(node) {
                self.traverse_backward(node).await?;
            }

            if !node.is_processed() && !node.is_killed() {
                // Fase de binding: driving primero, luego las incoming vivas.
                let mut bind_fault: Option<NodeFault> = None;
                for conn in self.ctx.state.driving_connections(&node.id) {
                    if let Err(fault) = node.apply_from_driving_connection(&self.ctx.state, &conn) {
                        bind_fault.get_or_insert(fault);
                    }
                }
                for conn in self.ctx.state.alive_in_connections(&node.id) {
                    if let Err(fault) = node.apply_from_incoming_connection(&self.ctx.state, &conn) {
                        bind_fault.get_or_insert(fault);
                    }
                }

                log::debug!("executing: {} {} {}", node.id, node.handle, node.type_name());
                self.state_execute(node, bind_fault).await?;
            }

            // Un nodo que quedó esperando input humano no avanza el flujo;
            // el resume lo retoma desde acá.
            if node.is_pending() || node.is_blocking() {
                return Ok(());
            }

            self.traverse_forward(node).await
        })
    }

    /// ¿Todas las fuentes de las conexiones driving e incoming ya procesaron?
    fn all_connections_processed(&self, node: &Node) -> bool {
        let mut sources = self.ctx.state.driving_connections(&node.id);
        sources.extend(self.ctx.state.in_connections(&node.id));

        sources.iter().all(|conn| {
                         self.ctx
                             .state
                             .get_node_by_id(&conn.source_node_id)
                             .map(|source| source.is_processed())
                             .unwrap_or(true)
                     })
    }

    async fn traverse_backward(&self, node: &Rc<Node>) -> Result<(), EngineError> {
        let mut connections = self.ctx.state.driving_connections(&node.id);
        connections.extend(self.ctx.state.in_connections(&node.id));

        for conn in connections {
            let source = match self.ctx.state.get_node_by_id(&conn.source_node_id) {
                Some(s) => s,
                None => continue,
            };
            conn.touch();

            log::debug!("traversing backward: {} <- {}", node.handle, source.handle);

            if conn.is_killer() || node.was_found_by(&conn.uuid) {
                continue;
            }

            if !source.is_processed() && !source.is_killed() {
                self.execute_node(&source).await?;
            }
        }
        Ok(())
    }

    async fn traverse_forward(&self, node: &Rc<Node>) -> Result<(), EngineError> {
        for conn in self.ctx.state.out_connections(&node.id) {
            let target = match self.ctx.state.get_node_by_id(&conn.target_node_id) {
                Some(t) => t,
                None => continue,
            };

            conn.touch();
            if conn.is_killer() {
                // La arista no se sigue, pero el destino puede haber quedado
                // sin ningún slot satisfacible: debe terminar killed.
                if !target.is_killed() && !target.is_processed() && self.ctx.state.should_kill_node(&target) {
                    target.kill(&self.ctx);
                }
                continue;
            }

            if !target.is_processed() && !target.is_killed() {
                log::debug!("traversing forward: {} -> {}", node.handle, target.handle);
                target.add_found_by(&conn.uuid);

                if self.ctx.state.should_kill_node(&target) {
                    log::debug!("killing node: {} {}", target.handle, target.type_name());
                    target.kill(&self.ctx);
                    continue;
                }

                if let Some(loop_id) = node.in_loop() {
                    target.set_in_loop(Some(loop_id));
                }

                self.execute_node(&target).await?;
            }
        }
        Ok(())
    }

    /// Fase execute: journal, placeholders, cuerpo del nodo, registro del
    /// resultado, fan-out de branch y eventos start/end.
    async fn state_execute(&self, node: &Rc<Node>, bind_fault: Option<NodeFault>) -> Result<(), EngineError> {
        let ctx = &self.ctx;
        let has_listener = ctx.listeners.has_listener(&ctx.flow_id, "mock", false).await;

        node.set_run_id(&ctx.run_id);
        node.mark_processed(true);
        let order = ctx.journal.borrow().next_order();

        if has_listener {
            send_flow_event(ctx.publisher.as_ref(),
                            &ctx.flow_id,
                            &ctx.run_id,
                            Some(&node.id),
                            FlowEventType::StartNode,
                            order as i64,
                            NodeEventStatus::Running).await;
        }

        ctx.journal
           .borrow_mut()
           .push(JournalEntry::new(node.id.clone(), node.handle.clone(), node.type_name(), order));

        // Resolución previa + cuerpo. Sólo "no implementado" y las fallas del
        // propio nodo se capturan; PROJECT_ID ausente es fatal y se propaga.
        let mut fault = bind_fault;
        if fault.is_none() {
            resolve_secrets(node, ctx).await?;
            resolve_environment_variables(node, ctx).await?;

            if node.behavior().templated() {
                if let Err(template_error) = apply_placeholder_replacements(node, &ctx.state) {
                    fault = Some(NodeFault::Template(template_error.to_string()));
                }
            }
        }

        if fault.is_none() {
            let behavior = node.behavior();
            match behavior.execute(node, ctx).await {
                Ok(()) => {}
                Err(NodeFault::NotImplemented) => {
                    log::info!("node {} does not implement execute", node.handle);
                    fault = Some(NodeFault::NotImplemented);
                }
                Err(other) => {
                    log::warn!("unhandled exception in node {}: {}", node.handle, other);
                    fault = Some(other);
                }
            }
        }
        node.set_exception(fault.clone());

        // Registro persistido: atributos truncados y redactados.
        let secrets = placeholder::secrets_by_value(ctx);
        let variables = redact_secrets(&truncate_large_values(&node.to_dict()), &secrets);
        let record = NodeRecord { timestamp: Utc::now().to_rfc3339(),
                                  variables,
                                  error_type: fault.as_ref().map(|f| f.kind_name().to_string()),
                                  error: fault.as_ref().map(|f| f.to_string()),
                                  killed: node.is_killed(),
                                  processed: node.is_processed(),
                                  node_id: node.id.clone(),
                                  order,
                                  handle: node.handle.clone(),
                                  type_name: node.type_name(),
                                  run_id: ctx.run_id.clone(),
                                  run_number: None,
                                  stage: ctx.stage.clone(),
                                  sub_stage: ctx.sub_stage.clone() };
        if let Err(e) = ctx.storage.store_node_result(&ctx.flow_id, &record).await {
            log::warn!("store node result failed (ignored): {e}");
        }

        // Fan-out de branch: true_path falsy mata sus aristas; false_path
        // falsy mata las suyas; false_path truthy (error tomado) mata todo lo
        // demás.
        if node.has_attr("true_path") && !is_truthy(&node.get_attr("true_path")) {
            for conn in ctx.state.out_connections_on_true_path(&node.id) {
                conn.make_killer();
            }
        }
        if node.has_attr("false_path") {
            if !is_truthy(&node.get_attr("false_path")) {
                for conn in ctx.state.out_connections_on_false_path(&node.id) {
                    conn.make_killer();
                }
            } else {
                for conn in ctx.state.out_connections_except_on_false_path(&node.id) {
                    conn.make_killer();
                }
            }
        }

        if has_listener {
            let status = if node.is_killed() { NodeEventStatus::Killed } else { NodeEventStatus::Success };
            send_flow_event(ctx.publisher.as_ref(),
                            &ctx.flow_id,
                            &ctx.run_id,
                            Some(&node.id),
                            FlowEventType::EndNode,
                            order as i64,
                            status).await;
        }

        Ok(())
    }
}

/// Truthiness sobre valores JSON: null, false, 0, "" y contenedores vacíos
/// son falsy. Payloads estructurados de error en `false_path` cuentan como
/// "error tomado".
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
    }
}
