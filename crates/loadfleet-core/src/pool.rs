//! Worker pool spec: how many workers a run has and what they are built from.

use serde::Serialize;

use crate::error::ConfigurationError;
use crate::template::InstanceTemplate;

/// Maximum pool size when none is configured (the reference deployment).
pub const DEFAULT_MAX_WORKERS: u32 = 10;

/// No configuration may raise the maximum above this.
pub const HARD_MAX_WORKERS: u32 = 100;

/// The single pool definition of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerPoolSpec {
    name_prefix: String,
    desired_count: u32,
    max_count: u32,
    template: InstanceTemplate,
}

impl WorkerPoolSpec {
    /// Validate bounds and build the spec. Nothing is provisioned.
    pub fn new(
        name_prefix: impl Into<String>,
        desired_count: u32,
        max_count: u32,
        template: InstanceTemplate,
    ) -> Result<Self, ConfigurationError> {
        let name_prefix = name_prefix.into();
        if name_prefix.is_empty()
            || !name_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigurationError::InvalidIdentifier {
                kind: "name prefix",
                value: name_prefix,
            });
        }
        if max_count > HARD_MAX_WORKERS {
            return Err(ConfigurationError::MaxCountTooLarge {
                requested: max_count,
                ceiling: HARD_MAX_WORKERS,
            });
        }
        check_desired(desired_count, max_count)?;

        Ok(Self {
            name_prefix,
            desired_count,
            max_count,
            template,
        })
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub fn desired_count(&self) -> u32 {
        self.desired_count
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn template(&self) -> &InstanceTemplate {
        &self.template
    }

    /// Change the target size. Out-of-range values leave the spec untouched.
    pub fn set_desired_count(&mut self, desired_count: u32) -> Result<(), ConfigurationError> {
        check_desired(desired_count, self.max_count)?;
        self.desired_count = desired_count;
        Ok(())
    }

    /// Name given to the worker with this ordinal.
    pub fn worker_name(&self, ordinal: u32) -> String {
        format!("{}-{}", self.name_prefix, ordinal)
    }
}

fn check_desired(requested: u32, max: u32) -> Result<(), ConfigurationError> {
    if requested == 0 || requested > max {
        return Err(ConfigurationError::DesiredCountOutOfRange { requested, max });
    }
    Ok(())
}
