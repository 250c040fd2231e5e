//! Carga de configuración del runner desde variables de entorno.
//! Usa `.env` vía dotenvy (cargado una sola vez).

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::constants::DEFAULT_RUN_RETENTION;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Proyecto dueño de secretos y variables de entorno. Requerido sólo si el
    /// run resuelve placeholders `<secret:*>` / `<environment:*>`.
    pub project_id: Option<String>,
    /// Cantidad de runs retenidos por flow (RUN_RETENTION_LIMIT).
    pub retention_limit: usize,
    /// Tenant opcional para el ruteo de eventos de interacción.
    pub tenant_id: Option<String>,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let project_id = env::var("PROJECT_ID").ok().filter(|v| !v.is_empty());
        let retention_limit = env::var("RUN_RETENTION_LIMIT").ok()
                                                             .and_then(|v| v.parse().ok())
                                                             .unwrap_or(DEFAULT_RUN_RETENTION);
        let tenant_id = env::var("TENANT_ID").ok().filter(|v| !v.is_empty());
        Self { project_id, retention_limit, tenant_id }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { project_id: None, retention_limit: DEFAULT_RUN_RETENTION, tenant_id: None }
    }
}
