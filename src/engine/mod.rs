/// Open-loop replay engine.
pub mod clock;
pub mod dispatcher;
pub mod drift;
pub mod reaper;
pub mod recorder;
pub mod replay;

pub use clock::ReplayClock;
pub use dispatcher::{Completion, InFlightRequest, InFlightSet, Outcome, RequestDispatcher};
pub use drift::{DriftMonitor, PacingDecision};
pub use recorder::{read_records, RecordCounts, RecordStatus, ResultRecord, ResultRecorder};
pub use replay::{ReplayPhase, Replayer, RunSummary};
