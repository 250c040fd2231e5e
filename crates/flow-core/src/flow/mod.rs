//! Scheduler demand-driven y primitivas de traversal del grafo.

mod scheduler;
mod traversal;

use std::future::Future;
use std::pin::Pin;

/// Futuro boxeado no-Send: el run es single-threaded cooperativo y la
/// recursión del scheduler necesita boxear sus frames.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

pub use scheduler::{is_truthy, Flow};
pub use traversal::{find_node_by_handle_backwards, find_nodes_for_jump, find_nodes_in_loop, find_nodes_until,
                    find_nodes_until_backwards};
