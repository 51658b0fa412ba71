//! Task dependency graph
//!
//! This module holds the dependency edges between cooperative tasks and
//! computes, once per tick, the order in which ready tasks run.
//!
//! # Architecture
//!
//! - [`NodeId`](node_id::NodeId) - Arena slot of a node
//! - [`DagNode`](node::DagNode) - A task's edges and execution order
//! - [`TaskGraph`](graph::TaskGraph) - The arena itself
//! - [`Resolution`](resolve::Resolution) - One tick's batch plus exclusions
//!
//! Edges point from a task to the tasks it depends on. A dependency always
//! runs before its dependents within the same tick.

pub mod graph;
pub mod node;
pub mod node_id;
pub mod resolve;

pub use graph::{DagError, TaskGraph};
pub use node::DagNode;
pub use node_id::NodeId;
pub use resolve::{Excluded, Exclusion, Resolution};
