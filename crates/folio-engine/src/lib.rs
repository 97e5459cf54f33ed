pub mod bayes;
pub mod graph;
pub mod report;
pub mod sharpe;
pub mod value;

pub use graph::{Graph, NodeId};
pub use sharpe::{OptimizationOutcome, SharpeOptimizer};
pub use value::Value;
