//! Macro utilitaria para declarar clases de nodo sin boilerplate.
//!
//! Exportada en la raíz del crate para poder usarla como:
//!   use flow_core::node_type;
//!
//! Formas soportadas:
//! - node_type!(node Name { kind: "...", attrs { a: default, .. },
//!   execute(node, ctx) { .. } });
//! - variantes con `templated: true` (pase de templates antes de execute) y
//!   `skip_template: [attr, ..]` (atributos que el motor de templates no
//!   toca; `true_path`/`false_path` quedan excluidos siempre por el motor).

/// Declara una clase de nodo: struct unit + impl de `NodeBehavior`.
#[macro_export]
macro_rules! node_type {
    // ---------------- kind + attrs + execute ----------------
    (
        node $name:ident {
            kind: $kind:expr,
            attrs { $($aname:ident : $adefault:expr),* $(,)? },
            execute($node:ident, $ctx:ident) $body:block
        }
    ) => {
        $crate::node_type! {
            node $name {
                kind: $kind,
                attrs { $($aname : $adefault),* },
                templated: false,
                skip_template: [],
                execute($node, $ctx) $body
            }
        }
    };

    // ---------------- con flag templated ----------------
    (
        node $name:ident {
            kind: $kind:expr,
            attrs { $($aname:ident : $adefault:expr),* $(,)? },
            templated: $templated:expr,
            execute($node:ident, $ctx:ident) $body:block
        }
    ) => {
        $crate::node_type! {
            node $name {
                kind: $kind,
                attrs { $($aname : $adefault),* },
                templated: $templated,
                skip_template: [],
                execute($node, $ctx) $body
            }
        }
    };

    // ---------------- forma completa ----------------
    (
        node $name:ident {
            kind: $kind:expr,
            attrs { $($aname:ident : $adefault:expr),* $(,)? },
            templated: $templated:expr,
            skip_template: [$($skip:ident),* $(,)?],
            execute($node:ident, $ctx:ident) $body:block
        }
    ) => {
        #[derive(Debug, Default, Clone)]
        pub struct $name;

        #[async_trait::async_trait(?Send)]
        impl $crate::state::NodeBehavior for $name {
            fn kind(&self) -> &str {
                $kind
            }

            fn defaults(&self) -> Vec<$crate::state::AttrDef> {
                #[allow(unused)]
                const SKIP: &[&str] = &[$(stringify!($skip)),*];
                vec![$($crate::state::AttrDef { name: stringify!($aname),
                                                default: $adefault,
                                                skip_template: SKIP.contains(&stringify!($aname)) }),*]
            }

            fn templated(&self) -> bool {
                $templated
            }

            async fn execute(&self,
                             $node: &std::rc::Rc<$crate::state::Node>,
                             $ctx: &std::rc::Rc<$crate::runtime::RunContext>)
                             -> Result<(), $crate::errors::NodeFault> $body
        }
    };
}
