//! Renderizado de templates `{{ handle.path }}` sobre salidas de nodos.
//!
//! Contexto de render:
//! - los atributos del nodo actual, planos (acceso sin calificar);
//! - por cada nodo *procesado*, su dict de atributos indexado por handle
//!   (colisiones de handle con nodos sin procesar se ignoran a propósito);
//! - si un handle referenciado no está en el contexto, un lookup hacia atrás
//!   recorre las conexiones entrantes (en orden de declaración) hasta
//!   encontrar un nodo con ese handle y suma sus atributos al render.
//!
//! Valores estructurados se renderizan por JSON-encode → sustitución →
//! JSON-decode. Una variable faltante (incluso tras el lookup) o un acceso
//! punteado sobre un no-contenedor son errores estructurados.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::flow::find_node_by_handle_backwards;
use crate::state::{ExecutionState, Node};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex"));

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TemplateError {
    #[error("'{0}' is undefined")]
    MissingHandle(String),
    #[error("cannot resolve '{expr}': no entry '{segment}'")]
    MissingKey { expr: String, segment: String },
    #[error("cannot resolve '{expr}': '{segment}' is not a container")]
    NotAContainer { expr: String, segment: String },
    #[error("template rendering failed: {0}")]
    Render(String),
}

/// Contexto mutable del render (el lookup hacia atrás lo va poblando).
type RenderContext = IndexMap<String, Value>;

/// Dict de atributos de un nodo para el contexto, con `true_path` presente
/// siempre (la UI y muchos flujos lo usan como salida por defecto).
fn node_context_entry(node: &Node) -> Value {
    let mut dict = node.to_dict();
    if let Value::Object(map) = &mut dict {
        if !map.contains_key("true_path") {
            map.insert("true_path".to_string(), node.get_attr("true_path"));
        }
    }
    dict
}

fn build_context(node: &Node, state: &ExecutionState) -> RenderContext {
    let mut context: RenderContext = IndexMap::new();

    if let Value::Object(own) = node.to_dict() {
        for (k, v) in own {
            context.insert(k, v);
        }
    }

    for other in state.nodes() {
        if other.is_processed() {
            context.insert(other.handle.clone(), node_context_entry(&other));
        }
    }

    context
}

/// Segmento de un path: clave de mapa o índice de lista.
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Tokeniza `items[0].name` / `items.0.name` en segmentos.
fn parse_path(expr: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in expr.split('.') {
        let mut rest = part;
        while let Some(bracket) = rest.find('[') {
            let head = &rest[..bracket];
            if !head.is_empty() {
                segments.push(PathSegment::Key(head.to_string()));
            }
            match rest[bracket + 1..].find(']') {
                Some(close) => {
                    let idx = &rest[bracket + 1..bracket + 1 + close];
                    match idx.parse::<usize>() {
                        Ok(i) => segments.push(PathSegment::Index(i)),
                        Err(_) => segments.push(PathSegment::Key(idx.to_string())),
                    }
                    rest = &rest[bracket + 1 + close + 1..];
                }
                None => {
                    segments.push(PathSegment::Key(rest.to_string()));
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            if let Ok(i) = rest.parse::<usize>() {
                segments.push(PathSegment::Index(i));
            } else {
                segments.push(PathSegment::Key(rest.to_string()));
            }
        }
    }
    segments
}

/// Resuelve una expresión de path contra el contexto, poblando handles
/// faltantes vía lookup hacia atrás.
fn resolve_path(expr: &str,
                context: &mut RenderContext,
                node: &Node,
                state: &ExecutionState)
                -> Result<Value, TemplateError> {
    let segments = parse_path(expr);
    let mut iter = segments.iter();

    let root = match iter.next() {
        Some(PathSegment::Key(k)) => k.clone(),
        _ => return Err(TemplateError::Render(format!("invalid expression '{expr}'"))),
    };

    if !context.contains_key(&root) {
        match find_node_by_handle_backwards(node, &root, state) {
            Some(found) => {
                context.insert(root.clone(), node_context_entry(&found));
            }
            None => return Err(TemplateError::MissingHandle(root)),
        }
    }

    let mut current = context.get(&root).cloned().unwrap_or(Value::Null);
    for segment in iter {
        current = match (segment, &current) {
            (PathSegment::Key(k), Value::Object(map)) => match map.get(k) {
                Some(v) => v.clone(),
                None => return Err(TemplateError::MissingKey { expr: expr.to_string(), segment: k.clone() }),
            },
            (PathSegment::Index(i), Value::Array(items)) => match items.get(*i) {
                Some(v) => v.clone(),
                None => {
                    return Err(TemplateError::MissingKey { expr: expr.to_string(), segment: i.to_string() })
                }
            },
            (PathSegment::Key(k), _) => {
                return Err(TemplateError::NotAContainer { expr: expr.to_string(), segment: k.clone() })
            }
            (PathSegment::Index(i), _) => {
                return Err(TemplateError::NotAContainer { expr: expr.to_string(), segment: i.to_string() })
            }
        };
    }
    Ok(current)
}

/// Representación textual de un valor interpolado dentro de un template.
fn value_to_template_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_template_string(template: &str,
                          context: &mut RenderContext,
                          node: &Node,
                          state: &ExecutionState)
                          -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let whole = caps.get(0).expect("match 0");
        let expr = caps.get(1).expect("group 1").as_str();

        // Filtro opcional `| tojson` (inyección de JSON completo).
        let (path_expr, filter) = match expr.split_once('|') {
            Some((p, f)) => (p.trim(), Some(f.trim())),
            None => (expr, None),
        };

        let value = resolve_path(path_expr, context, node, state)?;
        let rendered = match filter {
            Some("tojson") => serde_json::to_string(&value).map_err(|e| TemplateError::Render(e.to_string()))?,
            Some(other) => return Err(TemplateError::Render(format!("unknown filter '{other}'"))),
            None => value_to_template_string(&value),
        };

        out.push_str(&template[last_end..whole.start()]);
        out.push_str(&rendered);
        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);
    Ok(out)
}

/// Renderiza placeholders dentro de `data` (string, mapa o lista).
pub fn replace_placeholders(data: &Value, node: &Node, state: &ExecutionState) -> Result<Value, TemplateError> {
    let mut context = build_context(node, state);
    replace_with_context(data, &mut context, node, state)
}

fn replace_with_context(data: &Value,
                        context: &mut RenderContext,
                        node: &Node,
                        state: &ExecutionState)
                        -> Result<Value, TemplateError> {
    match data {
        Value::String(s) => Ok(Value::String(render_template_string(s, context, node, state)?)),
        Value::Object(_) | Value::Array(_) => {
            let encoded = serde_json::to_string(data).map_err(|e| TemplateError::Render(e.to_string()))?;
            let rendered = render_template_string(&encoded, context, node, state)?;
            serde_json::from_str(&rendered).map_err(|e| TemplateError::Render(e.to_string()))
        }
        other => Ok(other.clone()),
    }
}

/// Pase de templating sobre los atributos de un nodo que opta por él.
/// No toca `true_path`/`false_path` ni atributos con `skip_template`.
pub fn apply_placeholder_replacements(node: &Node, state: &ExecutionState) -> Result<(), TemplateError> {
    let mut context = build_context(node, state);

    for attr in node.attribute_names() {
        if attr == "true_path" || attr == "false_path" || node.skips_template(&attr) {
            continue;
        }
        let value = node.get_attr(&attr);
        if matches!(value, Value::String(_) | Value::Object(_) | Value::Array(_)) {
            let replaced = replace_with_context(&value, &mut context, node, state)?;
            node.set_attr(&attr, replaced);
        }
    }
    Ok(())
}
