//! Starting Bazel: launch planning and process execution

mod plan;
mod runner;

pub use plan::{LaunchPlan, LaunchPlanner, BAZELISK_SELF, WRAPPER_PATH};
pub use runner::{CommandRunner, ProcessRunner, ABNORMAL_EXIT_CODE};
