//! Runtime adapters for dispatching work invocations.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
