//! Builders to construct tasks against a registry.

pub mod task_builder;

pub use task_builder::TaskBuilder;
