//! Contrato de comportamiento de un nodo.
//!
//! Cada clase de nodo declara su nombre de tipo, su tabla de atributos (con
//! defaults y settings) y un cuerpo `execute` asíncrono. El estado vive en
//! `Node`; el comportamiento es un objeto sin estado compartible entre
//! instancias y entre runs.

use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::NodeFault;
use crate::runtime::RunContext;
use crate::state::Node;

/// Declaración de un atributo público de una clase de nodo.
#[derive(Debug, Clone)]
pub struct AttrDef {
    pub name: &'static str,
    pub default: Value,
    /// El motor de templates no toca este atributo (flag `skip_template`).
    pub skip_template: bool,
}

impl AttrDef {
    pub fn new(name: &'static str, default: Value) -> Self {
        Self { name, default, skip_template: false }
    }
}

/// Comportamiento polimórfico de una clase de nodo.
///
/// Implementaciones típicas se generan con la macro `node_type!`. El cuerpo
/// `execute` puede suspender (I/O cooperativo); el scheduler lo espera sin
/// fijar un thread.
#[async_trait(?Send)]
pub trait NodeBehavior {
    /// Nombre de clase del nodo (p.ej. `VariableSecret`). Los prefijos de este
    /// nombre participan en varios protocolos: `LoopEnd*` termina un loop,
    /// `HttpResponse*` produce el envelope de respuesta, `VariableSecret*` /
    /// `VariableEnvironment*` resuelven `true_path` como clave literal.
    fn kind(&self) -> &str;

    /// Tabla de atributos declarados con sus defaults.
    fn defaults(&self) -> Vec<AttrDef>;

    /// Clases que optan por el pase de templating (`{{ handle.path }}`) sobre
    /// sus atributos justo antes de `execute`.
    fn templated(&self) -> bool {
        false
    }

    /// Cuerpo de cómputo del nodo. El default "no implementado" se captura y
    /// loguea sin abortar el run.
    async fn execute(&self, node: &Rc<Node>, ctx: &Rc<RunContext>) -> Result<(), NodeFault> {
        let _ = (node, ctx);
        Err(NodeFault::NotImplemented)
    }
}
