//! Implementaciones Postgres (Diesel) de los contratos de storage del core.
//!
//! Decisiones:
//! - `execution_records` replica la semántica KV del contrato: partición por
//!   `flow_id`, orden por `sort_key`, payload JSONB. La retención y el merge
//!   de variables corren dentro de una transacción.
//! - Las escrituras usan upsert por PK compuesta (un re-store del mismo
//!   registro es idempotente).
//! - Errores transitorios (deadlock, pool, desconexión) se reintentan con un
//!   backoff corto, igual en lecturas y escrituras.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use serde_json::Value;
use uuid::Uuid;

use flow_core::events::{ListenerRecord, ListenerStore};
use flow_core::record::{connections_sort_key, ExecutionStorage, NodeRecord, RunInfo, StorageError};
use flow_core::state::ConnectionSnapshot;
use log::warn;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{execution_records, flow_listeners};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (inyectable en tests).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila para upsert en `execution_records`.
#[derive(Insertable, Debug)]
#[diesel(table_name = execution_records)]
struct NewRecordRow<'a> {
    flow_id: &'a str,
    sort_key: &'a str,
    data: &'a Value,
}

fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff muy pequeño (hasta 3 intentos).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Run id embebido en una sort key (`run#...`).
fn run_id_of(sort_key: &str) -> Option<&str> {
    sort_key.split('#').next()
}

/// Store de resultados sobre Postgres.
pub struct PgExecutionStorage<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgExecutionStorage<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn put(&self, flow_id: &str, sort_key: &str, data: &Value) -> Result<(), PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(execution_records::table)
                .values(NewRecordRow { flow_id, sort_key, data })
                .on_conflict((execution_records::flow_id, execution_records::sort_key))
                .do_update()
                .set(execution_records::data.eq(data))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        })
    }

    fn get(&self, flow_id: &str, sort_key: &str) -> Result<Option<Value>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            execution_records::table.filter(execution_records::flow_id
                                                .eq(flow_id)
                                                .and(execution_records::sort_key.eq(sort_key)))
                                    .select(execution_records::data)
                                    .first::<Value>(&mut conn)
                                    .optional()
                                    .map_err(PersistenceError::from)
        })
    }

    fn sort_keys(&self, flow_id: &str) -> Result<Vec<String>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            execution_records::table.filter(execution_records::flow_id.eq(flow_id))
                                    .select(execution_records::sort_key)
                                    .order(execution_records::sort_key.asc())
                                    .load::<String>(&mut conn)
                                    .map_err(PersistenceError::from)
        })
    }
}

#[async_trait(?Send)]
impl<P: ConnectionProvider> ExecutionStorage for PgExecutionStorage<P> {
    async fn clear_previous_execution(&self, flow_id: &str, current_run_id: &str, keep_runs: usize)
                                      -> Result<(), StorageError> {
        let mut run_ids: Vec<String> = self.sort_keys(flow_id)
                                           .map_err(StorageError::from)?
                                           .iter()
                                           .filter_map(|sk| run_id_of(sk))
                                           .map(|r| r.to_string())
                                           .collect();
        run_ids.sort();
        run_ids.dedup();
        run_ids.retain(|r| r != current_run_id);
        run_ids.sort_by(|a, b| b.cmp(a));

        for run in run_ids.into_iter().skip(keep_runs) {
            let pattern = format!("{run}#%");
            let result = with_retry(|| {
                let mut conn = self.provider.connection()?;
                diesel::delete(execution_records::table.filter(execution_records::flow_id
                                                                   .eq(flow_id)
                                                                   .and(execution_records::sort_key.like(pattern.as_str()))))
                    .execute(&mut conn)
                    .map_err(PersistenceError::from)
            });
            if let Err(e) = result {
                warn!("retention delete failed for run {run}: {e}");
            }
        }
        Ok(())
    }

    async fn store_connections_result(&self, flow_id: &str, run_id: &str, connections: &[ConnectionSnapshot])
                                      -> Result<(), StorageError> {
        let data = serde_json::to_value(connections).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.put(flow_id, &connections_sort_key(run_id), &data).map_err(StorageError::from)
    }

    async fn get_connections_result(&self, flow_id: &str, run_id: &str)
                                    -> Result<Option<Vec<ConnectionSnapshot>>, StorageError> {
        match self.get(flow_id, &connections_sort_key(run_id)).map_err(StorageError::from)? {
            Some(data) => serde_json::from_value(data).map(Some)
                                                      .map_err(|e| StorageError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    async fn store_node_result(&self, flow_id: &str, record: &NodeRecord) -> Result<(), StorageError> {
        let data = serde_json::to_value(record).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.put(flow_id, &record.sort_key(), &data).map_err(StorageError::from)
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
        match self.get(flow_id, &sort_key).map_err(StorageError::from)? {
            Some(data) => serde_json::from_value(data).map(Some)
                                                      .map_err(|e| StorageError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    async fn get_all_nodes_for_run(&self, flow_id: &str, run_id: &str) -> Result<Vec<NodeRecord>, StorageError> {
        let pattern = format!("{run_id}#%");
        let connections_key = connections_sort_key(run_id);

        let rows: Vec<(String, Value)> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            execution_records::table.filter(execution_records::flow_id
                                                .eq(flow_id)
                                                .and(execution_records::sort_key.like(pattern.as_str())))
                                    .select((execution_records::sort_key, execution_records::data))
                                    .load::<(String, Value)>(&mut conn)
                                    .map_err(PersistenceError::from)
        }).map_err(StorageError::from)?;

        let mut records: Vec<NodeRecord> = rows.into_iter()
                                               .filter(|(sk, _)| sk != &connections_key)
                                               .filter_map(|(_, data)| serde_json::from_value(data).ok())
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
        let pattern = format!("{run_id}#{node_id}#%");

        let result = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx_conn| {
                let row: Option<(String, Value)> =
                    execution_records::table.filter(execution_records::flow_id
                                                        .eq(flow_id)
                                                        .and(execution_records::sort_key.like(pattern.as_str())))
                                            .select((execution_records::sort_key, execution_records::data))
                                            .order(execution_records::sort_key.asc())
                                            .first::<(String, Value)>(tx_conn)
                                            .optional()?;

                let (sort_key, data) = match row {
                    Some(found) => found,
                    None => return Err(diesel::result::Error::NotFound),
                };

                let mut record: NodeRecord = match serde_json::from_value(data) {
                    Ok(r) => r,
                    Err(_) => return Err(diesel::result::Error::NotFound),
                };

                let mut current = match record.variables.clone() {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                for (key, incoming) in variables {
                    match (current.get_mut(key), incoming) {
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

                let updated = serde_json::to_value(&record).unwrap_or(Value::Null);
                diesel::update(execution_records::table.filter(execution_records::flow_id
                                                                   .eq(flow_id)
                                                                   .and(execution_records::sort_key.eq(&sort_key))))
                    .set(execution_records::data.eq(&updated))
                    .execute(tx_conn)?;
                Ok(())
            })
            .map_err(PersistenceError::from)
        });

        result.map_err(StorageError::from)
    }

    async fn get_available_runs(&self, flow_id: &str) -> Result<Vec<RunInfo>, StorageError> {
        let records_by_run = self.sort_keys(flow_id).map_err(StorageError::from)?;
        let mut run_ids: Vec<String> = records_by_run.iter()
                                                     .filter_map(|sk| run_id_of(sk))
                                                     .map(|r| r.to_string())
                                                     .collect();
        run_ids.sort();
        run_ids.dedup();
        run_ids.sort_by(|a, b| b.cmp(a));

        let mut runs = Vec::with_capacity(run_ids.len());
        for run_id in run_ids {
            let timestamp = self.get_all_nodes_for_run(flow_id, &run_id)
                                .await?
                                .first()
                                .map(|r| r.timestamp.clone())
                                .unwrap_or_else(|| Utc::now().to_rfc3339());
            runs.push(RunInfo { run_id, timestamp });
        }
        Ok(runs)
    }
}

/// Fila para upsert en `flow_listeners`.
#[derive(Insertable, Debug)]
#[diesel(table_name = flow_listeners)]
struct NewListenerRow<'a> {
    flow_id: &'a str,
    listener_id: &'a str,
    stage: &'a str,
    last_activated_at: DateTime<Utc>,
}

/// Store de listeners activos sobre Postgres.
pub struct PgListenerStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgListenerStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait(?Send)]
impl<P: ConnectionProvider> ListenerStore for PgListenerStore<P> {
    async fn fetch(&self, flow_id: &str) -> Option<ListenerRecord> {
        let row = with_retry(|| {
            let mut conn = self.provider.connection()?;
            flow_listeners::table.filter(flow_listeners::flow_id.eq(flow_id))
                                 .select((flow_listeners::stage, flow_listeners::last_activated_at))
                                 .first::<(String, DateTime<Utc>)>(&mut conn)
                                 .optional()
                                 .map_err(PersistenceError::from)
        });

        match row {
            Ok(found) => found.map(|(stage, last_activated_at)| ListenerRecord { stage, last_activated_at }),
            Err(e) => {
                warn!("listener fetch failed (treated as absent): {e}");
                None
            }
        }
    }

    async fn put(&self, flow_id: &str, stage: &str) {
        let listener_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let result = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(flow_listeners::table)
                .values(NewListenerRow { flow_id, listener_id: &listener_id, stage, last_activated_at: now })
                .on_conflict(flow_listeners::flow_id)
                .do_update()
                .set((flow_listeners::listener_id.eq(&listener_id),
                      flow_listeners::stage.eq(stage),
                      flow_listeners::last_activated_at.eq(now)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        });
        if let Err(e) = result {
            warn!("listener put failed (ignored): {e}");
        }
    }

    async fn clear(&self, flow_id: &str) {
        let result = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(flow_listeners::table.filter(flow_listeners::flow_id.eq(flow_id)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(PersistenceError::from)
        });
        if let Err(e) = result {
            warn!("listener clear failed (ignored): {e}");
        }
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y corre las migraciones
/// pendientes con la primera conexión.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    let final_min = validated_min.min(validated_max);

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
