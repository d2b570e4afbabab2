pub mod cache;
pub mod graph;
pub mod models;
pub mod tracker;

pub use cache::GraphCache;
pub use graph::{GraphStats, SymbolGraph};
pub use models::*;
pub use tracker::{get_deep_dependencies, get_deep_dependencies_cancellable, DependencyTracker};
