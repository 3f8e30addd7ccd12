use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::InsightService;
use crate::config::Settings;
use crate::error::{DashError, Result};

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

impl GeminiResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            DashError::ExternalServiceFailure("GEMINI_API_KEY is not set".to_string())
        })?;
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model: settings.model.trim().to_string(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.api_base, self.model)
    }
}

impl InsightService for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        log::debug!("POST {} ({} prompt chars)", self.endpoint(), prompt.len());
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| DashError::ExternalServiceFailure(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(DashError::ExternalServiceFailure(format!(
                "API error ({status}): {text}"
            )));
        }

        let json: GeminiResponse = response
            .json()
            .map_err(|e| DashError::ExternalServiceFailure(format!("invalid response: {e}")))?;
        json.first_text()
            .ok_or_else(|| DashError::ExternalServiceFailure("response had no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: "hello" }],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn reads_first_candidate_text() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Revenue is up."},{"text":"ignored"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("Revenue is up."));
    }

    #[test]
    fn blocked_response_has_no_text() {
        let parsed: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(parsed.first_text().is_none());
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates":[{}]}"#).unwrap();
        assert!(parsed.first_text().is_none());
    }

    #[test]
    fn client_requires_key() {
        let err = GeminiClient::new(&Settings::default()).err().unwrap();
        assert!(matches!(err, DashError::ExternalServiceFailure(_)));

        let settings = Settings {
            api_key: Some("k".into()),
            api_base: "https://example.test/models/".into(),
            ..Settings::default()
        };
        let client = GeminiClient::new(&settings).unwrap();
        assert_eq!(
            client.endpoint(),
            format!("https://example.test/models/{}:generateContent", settings.model)
        );
    }
}
