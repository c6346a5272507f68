pub mod memory;
pub mod model;
pub mod queue;
pub mod repo;
pub mod runner;
pub mod store;

pub use memory::{MemoryJobStore, MemoryTaskQueue};
pub use model::{normalize_query, Job, JobStatus, NewJob, StatusUpdate, DEFAULT_QUERY};
pub use queue::{AnalysisTask, PgTaskQueue, QueueError, Task, TaskQueue, RUN_ANALYSIS_TASK};
pub use repo::JobsRepo;
pub use runner::{AnalysisRunner, RunOutcome};
pub use store::{JobStore, StoreError};
