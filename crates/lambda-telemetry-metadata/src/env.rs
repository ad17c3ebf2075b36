//! Environment variable resolution with literal fallbacks.

use std::collections::HashMap;

/// Fallback used when an environment variable is unset or empty.
pub const UNKNOWN: &str = "UNKNOWN";

/// AWS region the function runs in.
pub const AWS_REGION: &str = "AWS_REGION";
/// Runtime identifier, e.g. `AWS_Lambda_rust`.
pub const AWS_EXECUTION_ENV: &str = "AWS_EXECUTION_ENV";
/// Function name.
pub const AWS_LAMBDA_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";
/// Function version.
pub const AWS_LAMBDA_FUNCTION_VERSION: &str = "AWS_LAMBDA_FUNCTION_VERSION";
/// Configured memory in MB.
pub const AWS_LAMBDA_FUNCTION_MEMORY_SIZE: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";
/// X-Ray trace header of the current invocation.
pub const X_AMZN_TRACE_ID: &str = "_X_AMZN_TRACE_ID";

/// A source of environment variables.
///
/// Production code reads the process environment through [`ProcessEnv`];
/// tests substitute a `HashMap` so assembly stays deterministic.
pub trait EnvSource {
    /// Returns the raw value of `name`, if set.
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.to_string())
    }
}

/// Resolves `name` from `env`, falling back to `default` when the variable
/// is unset or empty.
///
/// Any non-empty value is accepted as-is. This never fails.
///
/// # Example
///
/// ```
/// use lambda_telemetry_metadata::env::{resolve, UNKNOWN};
/// use std::collections::HashMap;
///
/// let env: HashMap<&str, &str> = HashMap::from([("AWS_REGION", "eu-north-1")]);
/// assert_eq!(resolve(&env, "AWS_REGION", UNKNOWN), "eu-north-1");
/// assert_eq!(resolve(&env, "AWS_EXECUTION_ENV", UNKNOWN), "UNKNOWN");
/// ```
pub fn resolve(env: &dyn EnvSource, name: &str, default: impl Into<String>) -> String {
    env.var(name)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.into())
}

/// [`resolve`] against the process environment.
pub fn resolve_env(name: &str, default: impl Into<String>) -> String {
    resolve(&ProcessEnv, name, default)
}
