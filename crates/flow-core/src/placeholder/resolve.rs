//! Resolución de placeholders `<secret:KEY>` / `<sec:KEY>` y
//! `<environment:KEY>` sobre los atributos de un nodo.
//!
//! Reglas:
//! - Aplica a todo atributo string público; dentro de mapas/listas los valores
//!   se reescriben in place.
//! - Claves faltantes NO son error: expanden a los sentinelas documentados.
//! - `PROJECT_ID` ausente sí es fatal, pero sólo si el run realmente necesita
//!   resolver algo.
//! - Cada secreto resuelto queda anotado en `secrets_map` para redactar los
//!   outputs antes de persistirlos.
//! - Las clases `VariableSecret*` / `VariableEnvironment*` resuelven además su
//!   `true_path` como clave literal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::constants::{ENV_VAR_NOT_FOUND, SECRET_NOT_FOUND};
use crate::errors::EngineError;
use crate::flow::LocalBoxFuture;
use crate::placeholder::SecretRecord;
use crate::runtime::RunContext;
use crate::state::Node;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(?:secret|sec):([a-zA-Z0-9_\-]+)>").expect("secret regex"));
static ENV_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<environment:([a-zA-Z0-9_\-]+)>").expect("env regex"));

fn project_id(ctx: &RunContext) -> Result<String, EngineError> {
    ctx.config.project_id.clone().ok_or(EngineError::MissingProjectId)
}

async fn lookup_secret(key: &str, ctx: &RunContext) -> Result<String, EngineError> {
    let project = project_id(ctx)?;
    let stage = ctx.effective_stage().to_string();
    match ctx.secrets.get_secret_by_key(key, &project, &stage).await {
        Some(record) if !record.value.is_empty() => {
            let value = record.value.clone();
            ctx.secrets_map.borrow_mut().insert(key.to_string(), record);
            Ok(value)
        }
        _ => Ok(SECRET_NOT_FOUND.to_string()),
    }
}

async fn lookup_env_var(key: &str, ctx: &RunContext) -> Result<String, EngineError> {
    let project = project_id(ctx)?;
    let stage = ctx.effective_stage().to_string();
    match ctx.env_vars.get_var(&project, &stage, key).await {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Ok(ENV_VAR_NOT_FOUND.to_string()),
    }
}

/// Reemplaza cada match de `pattern` en `input` por el valor que produzca
/// `lookup` para la clave capturada.
async fn replace_pattern(input: &str,
                         pattern: &Regex,
                         ctx: &RunContext,
                         secret: bool)
                         -> Result<String, EngineError> {
    let mut out = String::with_capacity(input.len());
    let mut last_end = 0;

    for caps in pattern.captures_iter(input) {
        let whole = caps.get(0).expect("match 0");
        let key = caps.get(1).expect("group 1").as_str();
        let value = if secret { lookup_secret(key, ctx).await? } else { lookup_env_var(key, ctx).await? };

        out.push_str(&input[last_end..whole.start()]);
        out.push_str(&value);
        last_end = whole.end();
    }
    out.push_str(&input[last_end..]);
    Ok(out)
}

/// Reescribe strings dentro de un árbol de valores, in place.
fn resolve_value<'a>(value: &'a mut Value,
                     pattern: &'a Regex,
                     ctx: &'a RunContext,
                     secret: bool)
                     -> LocalBoxFuture<'a, Result<(), EngineError>> {
    Box::pin(async move {
        match value {
            Value::String(s) => {
                if pattern.is_match(s) {
                    *s = replace_pattern(s, pattern, ctx, secret).await?;
                }
            }
            Value::Object(map) => {
                for (_k, v) in map.iter_mut() {
                    resolve_value(v, pattern, ctx, secret).await?;
                }
            }
            Value::Array(items) => {
                for v in items.iter_mut() {
                    resolve_value(v, pattern, ctx, secret).await?;
                }
            }
            _ => {}
        }
        Ok(())
    })
}

async fn resolve_attrs(node: &Node, pattern: &Regex, ctx: &RunContext, secret: bool) -> Result<(), EngineError> {
    for attr in node.attribute_names() {
        let mut value = node.get_attr(&attr);
        let needs_pass = match &value {
            Value::String(s) => pattern.is_match(s),
            Value::Object(_) | Value::Array(_) => true,
            _ => false,
        };
        if needs_pass {
            resolve_value(&mut value, pattern, ctx, secret).await?;
            node.set_attr(&attr, value);
        }
    }
    Ok(())
}

/// Resolución de secretos previa a `execute`.
pub async fn resolve_secrets(node: &Node, ctx: &RunContext) -> Result<(), EngineError> {
    resolve_attrs(node, &SECRET_PATTERN, ctx, true).await?;

    if !node.type_name().starts_with("VariableSecret") {
        return Ok(());
    }

    let key = match node.get_attr("true_path") {
        Value::String(s) if !s.is_empty() => s,
        _ => return Ok(()),
    };

    let project = project_id(ctx)?;
    let stage = ctx.effective_stage().to_string();
    match ctx.secrets.get_secret_by_key(&key, &project, &stage).await {
        Some(record) if !record.value.is_empty() => {
            let value = record.value.clone();
            ctx.secrets_map.borrow_mut().insert(key.clone(), record);
            node.set_attr("true_path", Value::String(value));
        }
        _ => node.set_attr("true_path", Value::String(SECRET_NOT_FOUND.to_string())),
    }
    Ok(())
}

/// Resolución de variables de entorno previa a `execute`.
pub async fn resolve_environment_variables(node: &Node, ctx: &RunContext) -> Result<(), EngineError> {
    resolve_attrs(node, &ENV_PATTERN, ctx, false).await?;

    if !node.type_name().starts_with("VariableEnvironment") {
        return Ok(());
    }

    let key = match node.get_attr("true_path") {
        Value::String(s) if !s.is_empty() => s,
        _ => return Ok(()),
    };

    let value = lookup_env_var(&key, ctx).await?;
    node.set_attr("true_path", Value::String(value));
    Ok(())
}

/// Secretos resueltos del run como mapa valor → clave (para redacción).
pub(crate) fn secrets_by_value(ctx: &RunContext) -> std::collections::HashMap<String, String> {
    ctx.secrets_map
       .borrow()
       .values()
       .filter(|SecretRecord { value, .. }| !value.is_empty())
       .map(|SecretRecord { key, value }| (value.clone(), key.clone()))
       .collect()
}
