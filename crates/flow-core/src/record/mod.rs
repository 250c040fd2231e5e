//! Registro de resultados: formas persistidas, contrato de storage y
//! saneamiento (truncado + redacción de secretos).

mod sanitize;
mod storage;
mod types;

pub use sanitize::{bytes_to_value, redact_secrets, truncate_large_values};
pub use storage::{ExecutionStorage, InMemoryExecutionStorage};
pub use types::{connections_sort_key, NodeRecord, RunInfo, StorageError};
