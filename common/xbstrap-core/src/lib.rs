pub mod actions;
pub mod backends;
pub mod config;
pub mod error;
pub mod exec;
pub mod plan;
pub mod subject;

pub use config::Config;
pub use error::{ConfigError, ExecError, ExecutionFailure, PlanError};
pub use subject::{Subject, SubjectId, SubjectKind};
