//! Generation prompt rendering.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::validator::ValidationLimits;

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("generate", GENERATE_TEMPLATE)
            .expect("generate template should be valid");
        Self { env }
    }

    /// Render the generation request, appending `feedback` when it is non-empty.
    pub fn render_generation(
        &self,
        limits: &ValidationLimits,
        feedback: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template.render(context! {
            anomaly_speed_threshold_mps => limits.anomaly_speed_threshold_mps,
            speed_deviation_tolerance_percent => limits.speed_deviation_tolerance_percent,
            feedback => feedback.map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }
}
