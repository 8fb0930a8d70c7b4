use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the provider and its tool invocations.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// The version-control binary. Resolved through `PATH` unless given as
    /// an absolute path.
    pub binary: PathBuf,
    /// Directory every invocation runs in; workspace discovery starts here.
    pub working_dir: PathBuf,
    /// How many commands may execute concurrently in the background.
    pub workers: usize,
    /// Ceiling for a single tool invocation, spawn to exit.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("cm"),
            working_dir: PathBuf::from("."),
            workers: 1,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ProviderConfig {
    pub fn with_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }
}
