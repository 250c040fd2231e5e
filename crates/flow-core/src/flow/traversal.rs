//! Walks del grafo hasta un terminador: descubrimiento de loops, jumps y
//! lookup de handles hacia atrás.
//!
//! El recorrido es depth-first en el orden de declaración de las conexiones;
//! ese orden es parte del contrato (decide colisiones de handle en el lookup
//! hacia atrás).

use std::collections::HashSet;
use std::rc::Rc;

use crate::state::{ExecutionState, Node};

struct Walk<'a> {
    state: &'a ExecutionState,
    match_end: &'a dyn Fn(&Node) -> bool,
    skip: Option<&'a dyn Fn(&Node) -> bool>,
    post_process: Option<&'a dyn Fn(&Rc<Node>)>,
    visited: HashSet<String>,
    collected: Vec<Rc<Node>>,
    end_node: Option<Rc<Node>>,
}

impl<'a> Walk<'a> {
    fn forward(&mut self, node: &Rc<Node>) {
        if !self.visited.insert(node.id.clone()) {
            return;
        }

        for connection in self.state.out_connections(&node.id) {
            let target = match self.state.get_node_by_id(&connection.target_node_id) {
                Some(t) => t,
                None => continue,
            };

            if (self.match_end)(&target) {
                self.end_node = Some(target);
                continue;
            }

            if let Some(skip_fn) = self.skip {
                if skip_fn(&target) {
                    continue;
                }
            }

            if let Some(post) = self.post_process {
                post(&target);
            }

            self.collected.push(Rc::clone(&target));
            self.forward(&target);
        }
    }

    fn backward(&mut self, node: &Rc<Node>) {
        if !self.visited.insert(node.id.clone()) {
            return;
        }

        for connection in self.state.in_connections(&node.id) {
            let source = match self.state.get_node_by_id(&connection.source_node_id) {
                Some(s) => s,
                None => continue,
            };

            if (self.match_end)(&source) {
                self.end_node = Some(source);
                continue;
            }

            self.collected.push(Rc::clone(&source));
            self.backward(&source);
        }
    }
}

/// Camina hacia adelante por las conexiones salientes juntando nodos hasta
/// que `match_end` reconozca el terminador. `skip` poda subárboles enteros;
/// `post_process` se aplica a cada nodo recolectado.
pub fn find_nodes_until(start: &Rc<Node>,
                        state: &ExecutionState,
                        match_end: &dyn Fn(&Node) -> bool,
                        skip: Option<&dyn Fn(&Node) -> bool>,
                        post_process: Option<&dyn Fn(&Rc<Node>)>)
                        -> (Vec<Rc<Node>>, Option<Rc<Node>>) {
    let mut walk = Walk { state,
                          match_end,
                          skip,
                          post_process,
                          visited: HashSet::new(),
                          collected: Vec::new(),
                          end_node: None };
    walk.forward(start);
    (walk.collected, walk.end_node)
}

/// Variante hacia atrás: recorre conexiones entrantes (upstream).
pub fn find_nodes_until_backwards(start: &Rc<Node>,
                                  state: &ExecutionState,
                                  match_end: &dyn Fn(&Node) -> bool)
                                  -> (Vec<Rc<Node>>, Option<Rc<Node>>) {
    let mut walk = Walk { state,
                          match_end,
                          skip: None,
                          post_process: None,
                          visited: HashSet::new(),
                          collected: Vec::new(),
                          end_node: None };
    walk.backward(start);
    (walk.collected, walk.end_node)
}

/// Busca hacia atrás el primer nodo con el handle dado. El orden de las
/// conexiones entrantes (orden de declaración) decide colisiones.
pub fn find_node_by_handle_backwards(start: &Node, handle: &str, state: &ExecutionState) -> Option<Rc<Node>> {
    let start = state.get_node_by_id(&start.id)?;
    let (collected, end_node) = find_nodes_until_backwards(&start, state, &|n| n.handle == handle);

    if end_node.is_some() {
        return end_node;
    }
    collected.into_iter().find(|n| n.handle == handle)
}

/// Cuerpo de un loop: junta nodos hasta el `LoopEnd*`, salteando subárboles
/// `ListLoop*` y etiquetando cada visitado con el nodo de origen.
pub fn find_nodes_in_loop(start: &Rc<Node>, state: &ExecutionState) -> (Vec<Rc<Node>>, Option<Rc<Node>>) {
    let origin = start.id.clone();
    find_nodes_until(start,
                     state,
                     &|n| n.type_name().starts_with("LoopEnd"),
                     Some(&|n: &Node| n.type_name().starts_with("ListLoop")),
                     Some(&move |n: &Rc<Node>| n.set_in_loop(Some(origin.clone()))))
}

/// Nodos hasta el `Jump` (clase exacta) que cierra un salto.
pub fn find_nodes_for_jump(start: &Rc<Node>, state: &ExecutionState) -> (Vec<Rc<Node>>, Option<Rc<Node>>) {
    find_nodes_until(start, state, &|n| n.type_name() == "Jump", None, None)
}
