//! Course service configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseServiceConfig {
    /// Path prefix of the course service, e.g. `/api/course/v1`.
    pub api_path: String,
}

impl Default for CourseServiceConfig {
    fn default() -> Self {
        Self {
            api_path: "/api/course/v1".to_string(),
        }
    }
}
