//! Servicio de listeners activos: ¿hay una UI suscripta a este flow?
//!
//! La respuesta condiciona la emisión de eventos por nodo. Para acotar la
//! carga de lookups el servicio mantiene un caché process-wide con TTL por
//! entrada: una respuesta positiva vale hasta que expire la activación
//! registrada (60 min por defecto); una negativa apenas 2 segundos. El flag
//! `first_run` saltea el caché una vez por run para no perder un suscriptor
//! nuevo contra un negativo viejo.

use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::constants::{LISTENER_MAX_AGE_MINUTES, LISTENER_NEGATIVE_TTL_SECS};

/// Activación registrada por la UI para un flow.
#[derive(Debug, Clone)]
pub struct ListenerRecord {
    pub stage: String,
    pub last_activated_at: DateTime<Utc>,
}

/// Store de activaciones (el backend durable vive fuera del core).
#[async_trait(?Send)]
pub trait ListenerStore {
    async fn fetch(&self, flow_id: &str) -> Option<ListenerRecord>;
    async fn put(&self, flow_id: &str, stage: &str);
    async fn clear(&self, flow_id: &str);
}

/// Store en memoria para tests y ejecución local.
#[derive(Debug, Default)]
pub struct InMemoryListenerStore {
    inner: DashMap<String, ListenerRecord>,
}

impl InMemoryListenerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl ListenerStore for InMemoryListenerStore {
    async fn fetch(&self, flow_id: &str) -> Option<ListenerRecord> {
        self.inner.get(flow_id).map(|r| r.clone())
    }

    async fn put(&self, flow_id: &str, stage: &str) {
        self.inner.insert(flow_id.to_string(),
                          ListenerRecord { stage: stage.to_string(), last_activated_at: Utc::now() });
    }

    async fn clear(&self, flow_id: &str) {
        self.inner.remove(flow_id);
    }
}

// Caché process-wide (sobrevive a runs individuales): valor + expiración.
static LISTENER_CACHE: Lazy<DashMap<String, (bool, DateTime<Utc>)>> = Lazy::new(DashMap::new);

pub struct ActiveListeners {
    store: Rc<dyn ListenerStore>,
    max_age: Duration,
}

impl ActiveListeners {
    pub fn new(store: Rc<dyn ListenerStore>) -> Self {
        Self { store, max_age: Duration::minutes(LISTENER_MAX_AGE_MINUTES) }
    }

    fn cache_key(flow_id: &str, required_stage: &str) -> String {
        format!("{flow_id}@{required_stage}")
    }

    fn cache_negative(key: String, now: DateTime<Utc>) -> bool {
        LISTENER_CACHE.insert(key, (false, now + Duration::seconds(LISTENER_NEGATIVE_TTL_SECS)));
        false
    }

    /// ¿Hay un listener vigente para `flow_id` en el stage requerido?
    pub async fn has_listener(&self, flow_id: &str, required_stage: &str, first_run: bool) -> bool {
        let key = Self::cache_key(flow_id, required_stage);
        let now = Utc::now();

        if !first_run {
            if let Some(entry) = LISTENER_CACHE.get(&key) {
                let (value, expires_at) = *entry;
                if now <= expires_at {
                    return value;
                }
                drop(entry);
                LISTENER_CACHE.remove(&key);
            }
        }

        let record = match self.store.fetch(flow_id).await {
            Some(r) => r,
            None => return Self::cache_negative(key, now),
        };

        if record.stage != required_stage {
            return Self::cache_negative(key, now);
        }

        let is_valid = now - record.last_activated_at < self.max_age;
        if is_valid {
            // El positivo vale hasta que la activación misma expire.
            LISTENER_CACHE.insert(key, (true, record.last_activated_at + self.max_age));
        } else {
            return Self::cache_negative(key, now);
        }
        is_valid
    }

    pub async fn set_listener(&self, flow_id: &str, stage: &str) {
        self.store.put(flow_id, stage).await;
    }

    /// Borra las activaciones del flow y toda entrada de caché asociada.
    pub async fn clear_listeners(&self, flow_id: &str) {
        self.store.clear(flow_id).await;
        let prefix = format!("{flow_id}@");
        LISTENER_CACHE.retain(|k, _| !k.starts_with(&prefix));
    }
}
