use crate::error::ModelError;
use crate::models::EndpointConfig;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_GENERATION_MODEL: &str = "google/flan-t5-small";
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

pub trait Generator {
    fn model_id(&self) -> &str;
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).generate(prompt)
    }
}

/// Blocking client for OpenAI-compatible `/completions` endpoints.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    url: url::Url,
    api_key: Option<String>,
    model: String,
    options: GenerationOptions,
}

impl HttpGenerator {
    pub fn new(
        config: &EndpointConfig,
        model: impl Into<String>,
        options: GenerationOptions,
    ) -> Result<Self, ModelError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ModelError::InvalidConfig("missing generation model name".to_string()));
        }
        if options.max_new_tokens == 0 {
            return Err(ModelError::InvalidConfig(
                "max_new_tokens must be positive".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url_for("completions")?,
            api_key: config.api_key.clone(),
            model,
            options,
        })
    }

    pub fn options(&self) -> GenerationOptions {
        self.options
    }
}

impl Generator for HttpGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "requesting completion");

        let mut request = self.client.post(self.url.clone()).json(&CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.options.max_new_tokens,
            temperature: self.options.temperature,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ModelError::BackendResponse {
                backend: "generation".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let payload: CompletionResponse = response.json()?;
        completion_text(payload)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}

fn completion_text(payload: CompletionResponse) -> Result<String, ModelError> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.text)
        .ok_or_else(|| ModelError::BackendResponse {
            backend: "generation".to_string(),
            details: "completion response has no choices".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_decoding_parameters() {
        let options = GenerationOptions::default();
        assert_eq!(options.max_new_tokens, 512);
        assert!((options.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn first_choice_text_is_returned_verbatim() -> Result<(), Box<dyn std::error::Error>> {
        let payload: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"text":"  Fraud is mentioned often.\n"},{"text":"ignored"}]}"#,
        )?;
        assert_eq!(completion_text(payload)?, "  Fraud is mentioned often.\n");
        Ok(())
    }

    #[test]
    fn empty_choices_are_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let payload: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#)?;
        assert!(matches!(
            completion_text(payload),
            Err(ModelError::BackendResponse { .. })
        ));
        Ok(())
    }

    #[test]
    fn http_generator_rejects_invalid_endpoint() {
        let config = EndpointConfig::new("not a url");
        let result = HttpGenerator::new(
            &config,
            DEFAULT_GENERATION_MODEL,
            GenerationOptions::default(),
        );
        assert!(matches!(result, Err(ModelError::Url(_))));
    }
}
