//! Contratos de los stores de secretos y variables de entorno.
//!
//! Las claves están compuestas como `{project_id}@{stage}@{key}`. El core
//! acepta backends que devuelvan el valor ya en claro o lo desencripten al
//! leer: la encriptación en reposo es un problema del store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Secreto resuelto: clave lógica + valor en claro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub key: String,
    pub value: String,
}

#[async_trait(?Send)]
pub trait SecretsProvider {
    async fn get_secret_by_key(&self, key: &str, project_id: &str, stage: &str) -> Option<SecretRecord>;
}

#[async_trait(?Send)]
pub trait EnvVarProvider {
    async fn get_var(&self, project_id: &str, stage: &str, key: &str) -> Option<String>;
}

fn prefixed(project_id: &str, stage: &str, key: &str) -> String {
    format!("{project_id}@{stage}@{key}")
}

/// Store de secretos en memoria (tests y ejecución local).
#[derive(Debug, Default)]
pub struct InMemorySecrets {
    inner: DashMap<String, String>,
}

impl InMemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, project_id: &str, stage: &str, key: &str, value: &str) {
        self.inner.insert(prefixed(project_id, stage, key), value.to_string());
    }
}

#[async_trait(?Send)]
impl SecretsProvider for InMemorySecrets {
    async fn get_secret_by_key(&self, key: &str, project_id: &str, stage: &str) -> Option<SecretRecord> {
        self.inner
            .get(&prefixed(project_id, stage, key))
            .map(|v| SecretRecord { key: key.to_string(), value: v.clone() })
    }
}

/// Store de variables de entorno en memoria.
#[derive(Debug, Default)]
pub struct InMemoryEnvVars {
    inner: DashMap<String, String>,
}

impl InMemoryEnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, project_id: &str, stage: &str, key: &str, value: &str) {
        self.inner.insert(prefixed(project_id, stage, key), value.to_string());
    }
}

#[async_trait(?Send)]
impl EnvVarProvider for InMemoryEnvVars {
    async fn get_var(&self, project_id: &str, stage: &str, key: &str) -> Option<String> {
        self.inner.get(&prefixed(project_id, stage, key)).map(|v| v.clone())
    }
}
