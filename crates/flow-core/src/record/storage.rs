//! Contrato de almacenamiento de resultados + implementación en memoria.
//!
//! El contrato imita un KV particionado: partición por `flow_id`, orden por
//! sort key. La implementación en memoria respalda tests y ejecuciones
//! locales; el backend Postgres vive en `flow-persistence` con la misma
//! semántica.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::record::types::{connections_sort_key, NodeRecord, RunInfo, StorageError};
use crate::state::ConnectionSnapshot;

/// Storage de resultados de ejecución.
///
/// Contrato principal:
/// - claves compuestas `(flow_id, sort_key)`; el borrado es por run completo.
/// - `clear_previous_execution` aplica la política de retención: conserva los
///   `keep_runs` más recientes y nunca borra el run actual.
/// - `merge_node_variables` actualiza `variables` de un registro existente y
///   rechaza crear registros nuevos (evita entradas a medio escribir para
///   nodos que no ejecutaron).
#[async_trait(?Send)]
pub trait ExecutionStorage {
    async fn clear_previous_execution(&self, flow_id: &str, current_run_id: &str, keep_runs: usize)
                                      -> Result<(), StorageError>;

    async fn store_connections_result(&self, flow_id: &str, run_id: &str, connections: &[ConnectionSnapshot])
                                      -> Result<(), StorageError>;

    async fn get_connections_result(&self, flow_id: &str, run_id: &str)
                                    -> Result<Option<Vec<ConnectionSnapshot>>, StorageError>;

    async fn store_node_result(&self, flow_id: &str, record: &NodeRecord) -> Result<(), StorageError>;

    async fn get_node_result(&self,
                             flow_id: &str,
                             run_id: &str,
                             node_id: &str,
                             order: usize,
                             stage: &str,
                             sub_stage: &str)
                             -> Result<Option<NodeRecord>, StorageError>;

    /// Registros de nodo de un run, ordenados por `order`.
    async fn get_all_nodes_for_run(&self, flow_id: &str, run_id: &str) -> Result<Vec<NodeRecord>, StorageError>;

    async fn merge_node_variables(&self,
                                  flow_id: &str,
                                  run_id: &str,
                                  node_id: &str,
                                  variables: &serde_json::Map<String, Value>)
                                  -> Result<(), StorageError>;

    /// Runs retenidos del flow, el más reciente primero.
    async fn get_available_runs(&self, flow_id: &str) -> Result<Vec<RunInfo>, StorageError>;
}

/// Implementación en memoria del storage (flow_id → sort_key → JSON crudo).
///
/// `DashMap` la hace segura para runs paralelos: las claves están
/// particionadas por run id, así que no hay escritores sobre la misma entrada.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStorage {
    inner: DashMap<String, BTreeMap<String, String>>,
}

impl InMemoryExecutionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn run_id_of(sort_key: &str) -> Option<&str> {
        sort_key.split('#').next()
    }

    /// Cantidad de entradas almacenadas para un flow (helper de tests).
    pub fn len_for(&self, flow_id: &str) -> usize {
        self.inner.get(flow_id).map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait(?Send)]
impl ExecutionStorage for InMemoryExecutionStorage {
    async fn clear_previous_execution(&self, flow_id: &str, current_run_id: &str, keep_runs: usize)
                                      -> Result<(), StorageError> {
        let mut partition = match self.inner.get_mut(flow_id) {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut run_ids: Vec<String> = partition.keys()
                                                .filter_map(|sk| Self::run_id_of(sk))
                                                .map(|r| r.to_string())
                                                .collect();
        run_ids.sort();
        run_ids.dedup();
        run_ids.retain(|r| r != current_run_id);
        // Más recientes primero (los run ids generados son ordenables de forma
        // best-effort; la retención es una cota superior, no exacta).
        run_ids.sort_by(|a, b| b.cmp(a));

        let to_delete: Vec<String> = run_ids.into_iter().skip(keep_runs).collect();
        if !to_delete.is_empty() {
            partition.retain(|sk, _| {
                         InMemoryExecutionStorage::run_id_of(sk).map(|r| !to_delete.iter().any(|d| d == r))
                                                                .unwrap_or(true)
                     });
        }
        Ok(())
    }

    async fn store_connections_result(&self, flow_id: &str, run_id: &str, connections: &[ConnectionSnapshot])
                                      -> Result<(), StorageError> {
        let data = serde_json::to_string(connections).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.inner
            .entry(flow_id.to_string())
            .or_default()
            .insert(connections_sort_key(run_id), data);
        Ok(())
    }

    async fn get_connections_result(&self, flow_id: &str, run_id: &str)
                                    -> Result<Option<Vec<ConnectionSnapshot>>, StorageError> {
        let partition = match self.inner.get(flow_id) {
            Some(p) => p,
            None => return Ok(None),
        };
        match partition.get(&connections_sort_key(run_id)) {
            Some(raw) => serde_json::from_str(raw).map(Some)
                                                  .map_err(|e| StorageError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    async fn store_node_result(&self, flow_id: &str, record: &NodeRecord) -> Result<(), StorageError> {
        let data = serde_json::to_string(record).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.inner
            .entry(flow_id.to_string())
            .or_default()
            .insert(record.sort_key(), data);
        Ok(())
    }

    async fn get_node_result(&self,
                             flow_id: &str,
                             run_id: &str,
                             node_id: &str,
                             order: usize,
                             stage: &str,
                             sub_stage: &str)
                             -> Result<Option<NodeRecord>, StorageError> {
        let sort_key = format!("{run_id}#{node_id}#{order}#{stage}#{sub_stage}");
        let partition = match self.inner.get(flow_id) {
            Some(p) => p,
            None => return Ok(None),
        };
        match partition.get(&sort_key) {
            Some(raw) => serde_json::from_str(raw).map(Some)
                                                  .map_err(|e| StorageError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    async fn get_all_nodes_for_run(&self, flow_id: &str, run_id: &str) -> Result<Vec<NodeRecord>, StorageError> {
        let prefix = format!("{run_id}#");
        let connections_key = connections_sort_key(run_id);
        let partition = match self.inner.get(flow_id) {
            Some(p) => p,
            None => return Ok(vec![]),
        };

        let mut records: Vec<NodeRecord> = partition.iter()
                                                    .filter(|(sk, _)| sk.starts_with(&prefix) && sk.as_str() != connections_key)
                                                    .filter_map(|(_, raw)| serde_json::from_str(raw).ok())
                                                    .collect();
        records.sort_by_key(|r| r.order);
        Ok(records)
    }

    async fn merge_node_variables(&self,
                                  flow_id: &str,
                                  run_id: &str,
                                  node_id: &str,
                                  variables: &serde_json::Map<String, Value>)
                                  -> Result<(), StorageError> {
        let prefix = format!("{run_id}#{node_id}#");
        let mut partition = self.inner.get_mut(flow_id).ok_or(StorageError::NotFound)?;

        let sort_key = partition.keys()
                                .find(|sk| sk.starts_with(&prefix))
                                .cloned()
                                .ok_or(StorageError::NotFound)?;

        let raw = partition.get(&sort_key).cloned().ok_or(StorageError::NotFound)?;
        let mut record: NodeRecord = serde_json::from_str(&raw).map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut current = match record.variables.clone() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, incoming) in variables {
            match (current.get_mut(key), incoming) {
                // Sub-mapas se mergean clave a clave (merge superficial).
                (Some(Value::Object(existing)), Value::Object(new_entries)) => {
                    for (k, v) in new_entries {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    current.insert(key.clone(), incoming.clone());
                }
            }
        }
        record.variables = Value::Object(current);

        let data = serde_json::to_string(&record).map_err(|e| StorageError::Backend(e.to_string()))?;
        partition.insert(sort_key, data);
        Ok(())
    }

    async fn get_available_runs(&self, flow_id: &str) -> Result<Vec<RunInfo>, StorageError> {
        let partition = match self.inner.get(flow_id) {
            Some(p) => p,
            None => return Ok(vec![]),
        };

        let mut run_ids: Vec<String> = partition.keys()
                                                .filter_map(|sk| Self::run_id_of(sk))
                                                .map(|r| r.to_string())
                                                .collect();
        run_ids.sort();
        run_ids.dedup();
        run_ids.sort_by(|a, b| b.cmp(a));

        let mut runs = Vec::with_capacity(run_ids.len());
        for run_id in run_ids {
            let timestamp = partition.iter()
                                     .filter(|(sk, _)| sk.starts_with(&format!("{run_id}#")))
                                     .filter_map(|(_, raw)| serde_json::from_str::<NodeRecord>(raw).ok())
                                     .min_by_key(|r| r.order)
                                     .map(|r| r.timestamp)
                                     .unwrap_or_else(|| Utc::now().to_rfc3339());
            runs.push(RunInfo { run_id, timestamp });
        }
        Ok(runs)
    }
}
