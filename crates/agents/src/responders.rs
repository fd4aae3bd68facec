//! Ready-made response generators.

use async_trait::async_trait;
use conclave_common::{AgentConfig, ResponseGenerator, Result};

const DEFAULT_TEMPLATE: &str = "{name} response: processed \"{context}\"";

/// Fills a template with the agent's identity and its buffered context.
///
/// Placeholders: `{id}`, `{name}`, `{context}`.
#[derive(Debug, Clone)]
pub struct TemplateResponder {
    template: String,
}

impl TemplateResponder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, config: &AgentConfig, context: &str) -> String {
        self.template
            .replace("{id}", &config.id)
            .replace("{name}", &config.name)
            .replace("{context}", context)
    }
}

impl Default for TemplateResponder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

#[async_trait]
impl ResponseGenerator for TemplateResponder {
    async fn generate_response(&self, config: &AgentConfig, context: &str) -> Result<String> {
        Ok(self.render(config, context))
    }
}

/// Wraps a synchronous closure as a generator.
pub struct FnResponder<F> {
    f: F,
}

impl<F> FnResponder<F>
where
    F: Fn(&AgentConfig, &str) -> Result<String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ResponseGenerator for FnResponder<F>
where
    F: Fn(&AgentConfig, &str) -> Result<String> + Send + Sync,
{
    async fn generate_response(&self, config: &AgentConfig, context: &str) -> Result<String> {
        (self.f)(config, context)
    }
}

impl<F> std::fmt::Debug for FnResponder<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnResponder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_template() {
        let config = AgentConfig::new("qa", "QA Tester");
        let out = TemplateResponder::default()
            .generate_response(&config, "run tests")
            .await
            .unwrap();
        assert_eq!(out, "QA Tester response: processed \"run tests\"");
    }

    #[test]
    fn test_custom_template_placeholders() {
        let config = AgentConfig::new("fe", "Frontend");
        let responder = TemplateResponder::new("[{id}] {name}: {context}");
        assert_eq!(responder.render(&config, "build nav"), "[fe] Frontend: build nav");
    }

    #[tokio::test]
    async fn test_fn_responder_propagates_errors() {
        let responder = FnResponder::new(|config: &AgentConfig, _: &str| {
            Err(conclave_common::ConclaveError::Generation(format!(
                "{} is offline",
                config.id
            )))
        });
        let err = responder
            .generate_response(&AgentConfig::new("x", "X"), "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("x is offline"));
    }
}
