pub mod docker;
pub mod error;
pub mod executor;

pub mod mock;

pub use docker::{DockerSandbox, DATA_MOUNT, OUTPUTS_MOUNT};
pub use error::SandboxError;
pub use executor::{CodeExecutor, ExecutionResult};
