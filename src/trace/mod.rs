/// Workload trace loading and batch coalescing.
pub mod loader;
pub mod synth;
pub mod types;

pub use loader::{Schedule, TraceColumns, TraceLoader};
pub use synth::{LengthDistribution, SynthConfig, SynthJob};
pub use types::{Batch, Job};
