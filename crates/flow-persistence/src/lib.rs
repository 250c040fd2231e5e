//! flow-persistence
//!
//! Implementaciones Postgres (Diesel) de los contratos de storage del core:
//! el store de resultados de ejecución (`ExecutionStorage`) y el store de
//! listeners activos (`ListenerStore`). El core sólo ve los traits, así que
//! estos backends son intercambiables con los in-memory.
//!
//! Módulos:
//! - `pg`: implementaciones sobre Postgres (tabla KV de registros + tabla de
//!   listeners) con pool r2d2 y retry para errores transitorios.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgExecutionStorage, PgListenerStore, PgPool,
             PoolProvider};
