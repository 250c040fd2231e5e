//! Constantes compartidas del motor.

/// Tamaño máximo (bytes) de un valor string antes de ser elidido en los
/// registros persistidos.
pub const MAX_PREVIEW_SIZE: usize = 16384 * 4; // 64 KiB

/// Sentinela para un secreto no encontrado en el store.
pub const SECRET_NOT_FOUND: &str = "<SECRET::NOT::FOUND>";

/// Sentinela para una variable de entorno no encontrada.
pub const ENV_VAR_NOT_FOUND: &str = "<ENV_VAR::NOT::FOUND>";

/// Cantidad de runs retenidos por flow al iniciar un run nuevo.
pub const DEFAULT_RUN_RETENTION: usize = 50;

/// Vigencia de una activación de listener (respuesta positiva del caché).
pub const LISTENER_MAX_AGE_MINUTES: i64 = 60;

/// TTL corto para respuestas negativas del caché de listeners.
pub const LISTENER_NEGATIVE_TTL_SECS: i64 = 2;

/// Stage por defecto de un run disparado desde la UI.
pub const DEFAULT_STAGE: &str = "mock";
