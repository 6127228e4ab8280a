pub mod candidates;
pub mod detectors;
pub mod manager;
pub mod navigation;
pub mod observation;
pub mod pipeline;
pub mod record;
pub mod repository;
pub mod signal;
pub mod store;

pub use candidates::{Candidate, CandidateSink};
pub use manager::{
    DecayReport, InstinctManager, InstinctStats, MergeOutcome, MergeResult, ProjectContext,
    ProjectStats,
};
pub use navigation::{NavigationDetector, NavigationPattern};
pub use observation::{EventKind, Observation, ObservationLog};
pub use pipeline::{DetectionReport, LearningReport, PassOutcome, run_detection, run_learning};
pub use record::{InstinctRecord, InstinctStatus, RecordError};
pub use repository::{InstinctFilter, InstinctRepository};
pub use signal::{Signal, SignalKind};
pub use store::{DirectoryInstinctStore, RedbInstinctStore, open_configured};
