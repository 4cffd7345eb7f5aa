//! Minimal Gemini `generateContent` client for meal photos.

use journal_core::{decode_estimate, model::NutritionData, thumbnail::EncodedImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const ANALYSIS_PROMPT: &str = r#"You estimate nutrition from a photo of food.
Reply with one minified JSON object and nothing else: no prose, no markdown.

Shape:
{"foodName": string, "calories": number, "fat": number, "sugar": number,
 "components": [{"name": string, "calories": number}]}

- calories in kcal, fat and sugar in grams, all plain numbers (250, not "250").
- components lists the visible parts of the meal; use [] when there is nothing to split.
- Double-quote every key and string. No trailing commas.

Example: {"foodName":"Chicken Rice Bowl","calories":620,"fat":18,"sugar":4,"components":[{"name":"Steamed rice","calories":300},{"name":"Grilled chicken","calories":260},{"name":"Cucumber","calories":10},{"name":"Chili sauce","calories":50}]}

If you cannot tell what the food is, or cannot estimate its values, reply exactly:
{"foodName":"Unknown Food","calories":0,"fat":0,"sugar":0,"components":[]}"#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Never fails: transport errors, API errors and unusable replies all
    /// come back as the "Unknown Food" estimate.
    pub async fn analyze(&self, image: &EncodedImage) -> NutritionData {
        match self.generate(image).await {
            Ok(text) => {
                debug!("model reply: {text}");
                decode_estimate(&text).into_nutrition()
            }
            Err(e) => {
                error!("food analysis failed: {e:#}");
                NutritionData::unknown()
            }
        }
    }

    async fn generate(&self, image: &EncodedImage) -> anyhow::Result<String> {
        let url = format!("{API_BASE_URL}/models/{}:generateContent", self.model);
        let res = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&build_request(image))
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            anyhow::bail!(api_error_message(status.as_u16(), &body));
        }
        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        if let Some(e) = parsed.error {
            anyhow::bail!("Gemini API error: {}", e.message);
        }
        extract_text(parsed)
    }
}

fn build_request(image: &EncodedImage) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.to_string(),
                        data: image.to_base64(),
                    },
                },
                Part::Text {
                    text: ANALYSIS_PROMPT.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
        },
    }
}

fn extract_text(response: GenerateResponse) -> anyhow::Result<String> {
    let parts = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let text: String = parts
        .into_iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text),
            Part::InlineData { .. } => None,
        })
        .collect();
    if text.trim().is_empty() {
        anyhow::bail!("no text in Gemini response");
    }
    Ok(text)
}

fn api_error_message(status: u16, body: &str) -> String {
    let message = serde_json::from_str::<GenerateResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.to_owned(), |e| e.message);
    if message.contains("API key not valid") {
        warn!("the configured Gemini API key was rejected");
        return "Invalid API Key. Please check your configuration.".to_string();
    }
    format!("Gemini API error ({status}): {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_image_prompt_and_json_mime() {
        let image = EncodedImage {
            mime_type: "image/jpeg",
            bytes: vec![1, 2, 3],
        };
        let v = serde_json::to_value(build_request(&image)).unwrap();
        let parts = &v["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert!(parts[1]["text"].as_str().unwrap().contains("Unknown Food"));
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn text_is_joined_from_the_first_candidate() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[
            {"text":"{\"foodName\":\"Tea\","},{"text":"\"calories\":2,\"fat\":0,\"sugar\":0}"}]},
            "finishReason":"STOP"},{"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        let text = extract_text(parsed).unwrap();
        let data = decode_estimate(&text).into_nutrition();
        assert_eq!(data.food_name, "Tea");
        assert_eq!(data.calories, 2.0);
    }

    #[test]
    fn empty_candidates_are_an_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(parsed).is_err());
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(extract_text(parsed).is_err());
    }

    #[test]
    fn api_errors_surface_the_service_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            api_error_message(400, body),
            "Invalid API Key. Please check your configuration."
        );
        assert_eq!(
            api_error_message(503, r#"{"error":{"message":"overloaded"}}"#),
            "Gemini API error (503): overloaded"
        );
        assert_eq!(api_error_message(502, "bad gateway"), "Gemini API error (502): bad gateway");
    }
}
