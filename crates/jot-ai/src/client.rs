//! HTTP client for the journal backend

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::{
    error::{Error, Result},
    stream::ByteStream,
    types::{
        AiStatus, AnalysisRequest, AnalysisType, ChatRequest, EntryAnalysis, ImprovementType,
        ModelList, PromptsRequest, PromptsResponse, UploadedFile, WritingImprovement,
        WritingRequest, WritingSuggestions,
    },
};

/// Default backend location
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Source of chat response streams
///
/// Implemented by [`JournalClient`]; tests substitute canned byte streams.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a streaming chat request
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// Authenticated client for the journal backend
#[derive(Clone)]
pub struct JournalClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl JournalClient {
    /// Create a client for the given server
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach a bearer token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.authorize(self.client.get(self.url(path))).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Open `POST /ai/chat-stream` and return the raw body stream
    ///
    /// Dropping the returned stream closes the connection.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        tracing::debug!(
            model = ?request.model,
            history = request.history.len(),
            "Opening chat stream"
        );
        let response = self
            .authorize(self.client.post(self.url("/ai/chat-stream")))
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Stream(e.to_string())));
        Ok(Box::pin(stream))
    }

    /// Fetch available model identifiers, in backend order
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let list: ModelList = self.get_json("/ai/models").await?;
        Ok(list.models)
    }

    /// Check whether the backend can reach its model server
    pub async fn status(&self) -> Result<AiStatus> {
        self.get_json("/ai/status").await
    }

    /// Upload a file to an entry and return a markdown reference to it
    pub async fn upload_file(&self, entry_id: u64, path: &Path) -> Result<String> {
        let file = self.upload(entry_id, path).await?;
        Ok(file.to_markdown(&self.base_url))
    }

    /// Upload a file to an entry
    pub async fn upload(&self, entry_id: u64, path: &Path) -> Result<UploadedFile> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidConfig(format!("not a file: {}", path.display())))?
            .to_string();

        let part = Part::bytes(data)
            .file_name(file_name.clone())
            .mime_str(guess_mime(path).as_ref())?;
        let form = Form::new().part("file", part);

        tracing::debug!(entry_id, file = %file_name, "Uploading file");
        let response = self
            .authorize(self.client.post(self.url(&format!("/files/{}", entry_id))))
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Run an analysis over a stored entry
    pub async fn analyze_entry(
        &self,
        entry_id: u64,
        analysis_type: AnalysisType,
        model: Option<&str>,
    ) -> Result<EntryAnalysis> {
        let body = AnalysisRequest {
            entry_id,
            analysis_type,
            model,
        };
        self.post_json("/ai/analyze-entry", &body).await
    }

    /// Generate journaling prompts
    pub async fn generate_prompts(&self, request: &PromptsRequest) -> Result<Vec<String>> {
        let response: PromptsResponse = self.post_json("/ai/generate-prompts", request).await?;
        Ok(response.prompts)
    }

    /// Ask for an improved version of some text
    pub async fn improve_writing(
        &self,
        text: &str,
        improvement_type: ImprovementType,
        model: Option<&str>,
    ) -> Result<WritingImprovement> {
        let body = WritingRequest {
            text,
            improvement_type: Some(improvement_type),
            model,
        };
        self.post_json("/ai/improve-writing", &body).await
    }

    /// Ask for free-form writing suggestions
    pub async fn writing_suggestions(
        &self,
        text: &str,
        model: Option<&str>,
    ) -> Result<WritingSuggestions> {
        let body = WritingRequest {
            text,
            improvement_type: None,
            model,
        };
        self.post_json("/ai/writing-suggestions", &body).await
    }
}

#[async_trait]
impl ChatTransport for JournalClient {
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        JournalClient::chat_stream(self, request).await
    }
}

/// Turn a non-success response into `Error::Api`, preferring the `detail` field
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });
    Err(Error::api(status.as_u16(), message))
}

fn guess_mime(path: &Path) -> mime_guess::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_stream;
    use crate::stream::{StreamEvent, StreamOutcome};
    use crate::types::{ChatMode, HistoryTurn, Role};
    use std::io::Write;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ai/models"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"models": ["qwen3:8b", "llama3"]})),
            )
            .mount(&server)
            .await;

        let client = JournalClient::new(server.uri()).with_token(Some("secret".into()));
        let models = client.list_models().await.unwrap();
        assert_eq!(models, vec!["qwen3:8b", "llama3"]);
    }

    #[tokio::test]
    async fn test_api_error_uses_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ai/models"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"detail": "Not authenticated"})),
            )
            .mount(&server)
            .await;

        let client = JournalClient::new(server.uri());
        let err = client.list_models().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("Not authenticated"));
    }

    #[tokio::test]
    async fn test_chat_stream_decodes_body() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\":\"thinking\",\"content\":\"hmm\"}\n\n",
            "data: {\"type\":\"answer\",\"content\":\"Hi\"}\n\n",
            "data: {\"type\":\"done\",\"inference_time\":80}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/ai/chat-stream"))
            .and(body_partial_json(serde_json::json!({
                "message": "hello",
                "history": [{"role": "user", "content": "before"}],
                "mode": "reasoning",
                "stream": true
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = JournalClient::new(server.uri());
        let request = ChatRequest::new(
            "hello",
            vec![HistoryTurn {
                role: Role::User,
                content: "before".into(),
            }],
        )
        .with_mode(ChatMode::Reasoning);
        let stream = client.chat_stream(&request).await.unwrap();

        let token = CancellationToken::new();
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], StreamEvent::answer("Hi"));
        assert!(matches!(events[2], StreamEvent::Done(s) if s.inference_time == Some(80.0)));
    }

    #[tokio::test]
    async fn test_chat_stream_gateway_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/chat-stream"))
            .respond_with(ResponseTemplate::new(504))
            .mount(&server)
            .await;

        let client = JournalClient::new(server.uri());
        let err = match client.chat_stream(&ChatRequest::new("q", vec![])).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.is_upstream_timeout());
    }

    #[tokio::test]
    async fn test_upload_file_returns_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file_id": 3,
                "entry_id": 7,
                "file_name": "photo.png",
                "file_path": "uploads/abc.png",
                "file_type": "image/png",
                "file_size": 4,
                "uploaded_at": "2024-01-01T00:00:00"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("photo.png");
        std::fs::File::create(&file_path)
            .unwrap()
            .write_all(b"\x89PNG")
            .unwrap();

        let client = JournalClient::new(server.uri());
        let markdown = client.upload_file(7, &file_path).await.unwrap();
        assert_eq!(
            markdown,
            format!("![photo.png]({}/uploads/abc.png)", server.uri())
        );
    }

    #[tokio::test]
    async fn test_analyze_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/analyze-entry"))
            .and(body_partial_json(
                serde_json::json!({"entry_id": 12, "analysis_type": "mood"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entry_id": 12,
                "title": "A good day",
                "answer": "Calm and content.",
                "raw_content": "<think>x</think>Calm and content.",
                "analysis_type": "mood"
            })))
            .mount(&server)
            .await;

        let client = JournalClient::new(server.uri());
        let analysis = client
            .analyze_entry(12, AnalysisType::Mood, None)
            .await
            .unwrap();
        assert_eq!(analysis.answer, "Calm and content.");
        assert_eq!(analysis.think, None);
    }

    #[tokio::test]
    async fn test_generate_prompts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/generate-prompts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"prompts": ["What surprised you?", "Who helped you?"]}),
            ))
            .mount(&server)
            .await;

        let client = JournalClient::new(server.uri());
        let prompts = client
            .generate_prompts(&PromptsRequest::default())
            .await
            .unwrap();
        assert_eq!(prompts.len(), 2);
    }

    #[test]
    fn test_guess_mime() {
        let mime = |name: &str| guess_mime(Path::new(name)).to_string();
        assert_eq!(mime("a.JPG"), "image/jpeg");
        assert_eq!(mime("notes.MD"), "text/markdown");
        assert_eq!(mime("clip.mp4"), "video/mp4");
        assert_eq!(
            mime("doc.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(mime("notes"), "application/octet-stream");
    }
}
