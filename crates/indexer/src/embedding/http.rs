// OpenAI-compatible embeddings client: `POST {endpoint}/embeddings`.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{Embedding, EmbeddingClient, EmbeddingError, EmbeddingFuture};
use crate::config::EmbeddingConfig;

#[derive(Serialize)]
struct EmbeddingsRequestBody<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponseBody {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    embeddings_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: &Url, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            embeddings_url: format!("{}/embeddings", endpoint.as_str().trim_end_matches('/')),
            model: model.into(),
            api_key,
        }
    }

    /// Build from config, reading the API key from the configured variable.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let endpoint = config
            .endpoint_url()
            .map_err(|error| EmbeddingError::Request(error.to_string()))?;
        let api_key = match &config.api_key_env {
            Some(name) => Some(
                std::env::var(name).map_err(|_| EmbeddingError::MissingApiKey(name.clone()))?,
            ),
            None => None,
        };
        Ok(Self::new(&endpoint, &config.model, api_key))
    }

    pub fn embeddings_url(&self) -> &str {
        &self.embeddings_url
    }
}

impl EmbeddingClient for HttpEmbeddingClient {
    fn embed(&self, texts: Vec<String>) -> EmbeddingFuture<'_, Vec<Embedding>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let expected = texts.len();
            debug!(inputs = expected, url = %self.embeddings_url, "requesting embeddings");

            let body = EmbeddingsRequestBody { model: &self.model, input: texts };
            let mut request = self.http.post(&self.embeddings_url).json(&body);
            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key);
            }
            let response =
                request.send().await.map_err(|error| EmbeddingError::Request(error.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::Status { status: status.as_u16(), body });
            }

            let parsed = response
                .json::<EmbeddingsResponseBody>()
                .await
                .map_err(|error| EmbeddingError::Request(error.to_string()))?;
            into_ordered_vectors(parsed, expected)
        })
    }
}

/// Order vectors by their `index` and insist on exactly one per input.
fn into_ordered_vectors(
    mut parsed: EmbeddingsResponseBody,
    expected: usize,
) -> Result<Vec<Embedding>, EmbeddingError> {
    parsed.data.sort_by_key(|item| item.index);
    let aligned = parsed.data.len() == expected
        && parsed.data.iter().enumerate().all(|(position, item)| item.index == position);
    if !aligned {
        return Err(EmbeddingError::Misaligned { expected, actual: parsed.data.len() });
    }
    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn parse(json: &str) -> EmbeddingsResponseBody {
        serde_json::from_str(json).expect("response body should parse")
    }

    #[test]
    fn vectors_are_reordered_by_index() {
        let body = parse(r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#);
        assert_eq!(into_ordered_vectors(body, 2).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn short_response_is_misaligned() {
        let body = parse(r#"{"data":[{"embedding":[1.0],"index":0}]}"#);
        assert_eq!(
            into_ordered_vectors(body, 2).unwrap_err(),
            EmbeddingError::Misaligned { expected: 2, actual: 1 }
        );
    }

    #[test]
    fn duplicate_indices_are_misaligned() {
        let body = parse(r#"{"data":[{"embedding":[1.0],"index":0},{"embedding":[1.0],"index":0}]}"#);
        assert!(into_ordered_vectors(body, 2).is_err());
    }

    #[test]
    fn embeddings_url_appends_path_once() {
        let endpoint = Url::parse("https://api.example.com/v1/").unwrap();
        let client = HttpEmbeddingClient::new(&endpoint, "model", None);
        assert_eq!(client.embeddings_url(), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn missing_api_key_variable_is_reported() {
        let config = EmbeddingConfig {
            api_key_env: Some("QUIRE_TEST_KEY_THAT_IS_NOT_SET".into()),
            ..EmbeddingConfig::default()
        };
        assert_eq!(
            HttpEmbeddingClient::from_config(&config).unwrap_err(),
            EmbeddingError::MissingApiKey("QUIRE_TEST_KEY_THAT_IS_NOT_SET".into())
        );
    }

    #[test]
    fn keyless_endpoint_needs_no_variable() {
        let config = EmbeddingConfig {
            endpoint: "http://localhost:11434/v1".into(),
            api_key_env: None,
            ..EmbeddingConfig::default()
        };
        let client = HttpEmbeddingClient::from_config(&config).expect("no key should be required");
        assert_eq!(client.embeddings_url(), "http://localhost:11434/v1/embeddings");
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let read = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..read]);
                if read == 0 || request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).into_owned()
        });
        (Url::parse(&format!("http://{addr}/v1")).unwrap(), handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn posts_batch_and_parses_vectors() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"data":[{"embedding":[0.25,0.5],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#,
        )
        .await;
        let client = HttpEmbeddingClient::new(&endpoint, "test-model", Some("sk-test".into()));

        let vectors = client.embed(vec!["first".into(), "second".into()]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.25, 0.5]]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/embeddings"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains(r#""model":"test-model""#));
        assert!(request.contains(r#""input":["first","second"]"#));
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let (endpoint, server) = serve_once("429 Too Many Requests", r#"{"error":"slow down"}"#).await;
        let client = HttpEmbeddingClient::new(&endpoint, "test-model", None);

        let error = client.embed(vec!["text".into()]).await.unwrap_err();
        assert!(matches!(error, EmbeddingError::Status { status: 429, .. }), "{error}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn empty_batch_makes_no_request() {
        let endpoint = Url::parse("http://127.0.0.1:9/v1").unwrap();
        let client = HttpEmbeddingClient::new(&endpoint, "test-model", None);
        assert!(client.embed(Vec::new()).await.unwrap().is_empty());
    }
}
