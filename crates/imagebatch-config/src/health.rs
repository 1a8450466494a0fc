use serde::Deserialize;

/// Liveness endpoint served alongside the batch API
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Route path; must start with `/`
    #[serde(default = "health_path")]
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: enabled_by_default(),
            path: health_path(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn enabled_by_default() -> bool {
    true
}

fn health_path() -> String {
    "/health".to_string()
}
