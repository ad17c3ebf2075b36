//! Per-invocation inputs shared by all channels.

use crate::env::{EnvSource, ProcessEnv};
use crate::generated::Generated;
use lambda_runtime::Context as LambdaContext;

/// The invocation context, environment and generated values one assembly
/// reads from.
///
/// Built fresh for every invocation and dropped once the metadata has been
/// emitted.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    context: &'a LambdaContext,
    env: &'a dyn EnvSource,
    generated: Generated,
}

impl<'a> Invocation<'a> {
    /// Reads the process environment and generates fresh values.
    pub fn new(context: &'a LambdaContext) -> Self {
        Self {
            context,
            env: &ProcessEnv,
            generated: Generated::now(),
        }
    }

    /// Reads environment variables from `env` instead of the process.
    #[must_use]
    pub fn with_env(mut self, env: &'a dyn EnvSource) -> Self {
        self.env = env;
        self
    }

    /// Uses fixed generated values.
    #[must_use]
    pub fn with_generated(mut self, generated: Generated) -> Self {
        self.generated = generated;
        self
    }

    /// The Lambda invocation context.
    pub fn context(&self) -> &'a LambdaContext {
        self.context
    }

    /// The environment variable source.
    pub fn env(&self) -> &'a dyn EnvSource {
        self.env
    }

    /// Values generated for this invocation.
    pub fn generated(&self) -> &Generated {
        &self.generated
    }
}

impl std::fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("request_id", &self.context.request_id)
            .field("generated", &self.generated)
            .finish_non_exhaustive()
    }
}
