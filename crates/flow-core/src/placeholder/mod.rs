//! Motor de placeholders: templating sobre salidas de nodos y resolución de
//! secretos/variables de entorno.
//!
//! Son dos sustituciones ortogonales previas a `execute`:
//! - `<secret:KEY>` / `<sec:KEY>` / `<environment:KEY>` contra los stores del
//!   stage efectivo (sentinelas documentados si faltan).
//! - `{{ handle.path }}` contra los atributos de los nodos ya procesados, con
//!   lookup hacia atrás cuando el handle todavía no está en el contexto
//!   global.

mod providers;
mod resolve;
mod template;

pub use providers::{EnvVarProvider, InMemoryEnvVars, InMemorySecrets, SecretRecord, SecretsProvider};
pub use resolve::{resolve_environment_variables, resolve_secrets};
pub(crate) use resolve::secrets_by_value;
pub use template::{apply_placeholder_replacements, replace_placeholders, TemplateError};
