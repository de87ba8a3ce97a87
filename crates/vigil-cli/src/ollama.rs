//! Ollama discovery helpers.
//!
//! Fetches the list of locally downloaded models from the `/api/tags`
//! endpoint so `vigil probe` can confirm the vision and analysis models are
//! present before an unattended run.

use std::time::Duration;

use serde::Deserialize;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// Ping the Ollama server and return the list of available models.
pub async fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;

    Ok(tags.models)
}

/// Whether `wanted` is among `models`.  Ollama reports untagged pulls as
/// `name:latest`, so a bare name matches its `:latest` tag.
pub fn has_model(models: &[OllamaModel], wanted: &str) -> bool {
    models.iter().any(|m| {
        m.name == wanted
            || (!wanted.contains(':')
                && m.name.strip_suffix(":latest").is_some_and(|base| base == wanted))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<OllamaModel> {
        names.iter().map(|n| OllamaModel { name: n.to_string() }).collect()
    }

    #[test]
    fn bare_name_matches_latest_tag() {
        let available = models(&["llava:latest", "llama3:8b"]);
        assert!(has_model(&available, "llava"));
        assert!(has_model(&available, "llava:latest"));
        assert!(has_model(&available, "llama3:8b"));
        assert!(!has_model(&available, "llama3"));
        assert!(!has_model(&available, "mistral"));
    }

    #[test]
    fn tags_response_parses() {
        let raw = r#"{"models":[{"name":"llava:latest","size":123},{"name":"llama3:latest"}]}"#;
        let tags: TagsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(tags.models.len(), 2);
        assert_eq!(tags.models[0].name, "llava:latest");
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let err = fetch_models("http://127.0.0.1:1").await.unwrap_err();
        assert!(err.contains("unreachable"), "{err}");
    }
}
