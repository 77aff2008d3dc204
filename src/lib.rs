pub mod credentials;
pub mod errors;
pub mod git;
pub mod service;
pub mod settings;
pub mod state;
pub mod workflow;

pub use errors::{GitSyncError, Result};
pub use service::{
    BranchDescriptor, CommitOutcome, ConnectOptions, GitSyncService, MergeStrategy, PullOptions,
    PullOutcome, PushOptions, PushOutcome, SyncErrorKind,
};
pub use settings::GitSyncSettings;
pub use state::WorkflowGitConfig;
