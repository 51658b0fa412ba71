//! Runtime system
//!
//! Task model, dependency graph and the scheduler that ties them together.

pub mod builtin;
pub mod dag;
pub mod scheduler;
pub mod task;
