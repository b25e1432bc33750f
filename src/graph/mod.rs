//! Core graph data structures

mod edge;
mod node;

pub use edge::{relationship, Edge};
pub use node::{attr, dataset, kind, AttrValue, Attributes, Node, NodeId};
