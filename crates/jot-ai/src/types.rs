//! Core types for journal assistant interactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Stable identity of a message within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timing/throughput figures reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Total inference time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,
    /// Generation throughput
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
}

impl Stats {
    /// Stats with both fields set
    pub fn new(inference_time: f64, tokens_per_second: f64) -> Self {
        Self {
            inference_time: Some(inference_time),
            tokens_per_second: Some(tokens_per_second),
        }
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.inference_time.is_none() && self.tokens_per_second.is_none()
    }

    /// Overwrite fields that are present in `other`
    pub fn update(&mut self, other: Stats) {
        if other.inference_time.is_some() {
            self.inference_time = other.inference_time;
        }
        if other.tokens_per_second.is_some() {
            self.tokens_per_second = other.tokens_per_second;
        }
    }

    /// Fill only the fields that are still unset
    pub fn fill_missing(&mut self, other: Stats) {
        if self.inference_time.is_none() {
            self.inference_time = other.inference_time;
        }
        if self.tokens_per_second.is_none() {
            self.tokens_per_second = other.tokens_per_second;
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Answer text
    pub content: String,
    /// Reasoning trace (assistant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Inference duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            think: None,
            timestamp: None,
            inference_time: None,
            tokens_per_second: None,
        }
    }

    /// Create a display-only system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a user message stamped with the current time
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            ..Self::with_role(Role::User, content)
        }
    }

    /// Create an empty assistant placeholder
    pub fn assistant_placeholder() -> Self {
        Self {
            think: Some(String::new()),
            ..Self::with_role(Role::Assistant, "")
        }
    }

    /// Create a finished assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Current stats fields
    pub fn stats(&self) -> Stats {
        Stats {
            inference_time: self.inference_time,
            tokens_per_second: self.tokens_per_second,
        }
    }

    /// Replace stats fields
    pub fn set_stats(&mut self, stats: Stats) {
        self.inference_time = stats.inference_time;
        self.tokens_per_second = stats.tokens_per_second;
    }

    /// Reasoning text, if any non-blank reasoning exists
    pub fn thinking(&self) -> Option<&str> {
        self.think.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Whether the answer text is empty
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// Whether neither answer nor reasoning holds any text
    pub fn is_blank(&self) -> bool {
        self.content.is_empty() && self.think.as_deref().is_none_or(str::is_empty)
    }

    /// Prior-turn projection sent to the backend
    pub fn to_turn(&self) -> HistoryTurn {
        HistoryTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Chat mode flag sent with each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Direct answers
    #[default]
    Simple,
    /// Extended reasoning (thinking stream)
    Reasoning,
}

impl ChatMode {
    /// Parse from a user-facing name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "off" | "fast" => Some(ChatMode::Simple),
            "reasoning" | "think" | "thinking" | "on" => Some(ChatMode::Reasoning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Simple => "simple",
            ChatMode::Reasoning => "reasoning",
        }
    }
}

/// One prior turn of conversation history (role + content only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Body of a streaming chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Current user text
    pub message: String,
    /// Prior non-system turns, in-flight turn excluded
    pub history: Vec<HistoryTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub mode: ChatMode,
    pub stream: bool,
}

impl ChatRequest {
    /// Create a streaming request for the given text
    pub fn new(message: impl Into<String>, history: Vec<HistoryTurn>) -> Self {
        Self {
            message: message.into(),
            history,
            model: None,
            system_prompt: None,
            mode: ChatMode::default(),
            stream: true,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Response of `GET /ai/models`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<String>,
}

/// Response of `GET /ai/status`
#[derive(Debug, Clone, Deserialize)]
pub struct AiStatus {
    pub status: String,
    pub message: String,
    pub base_url: String,
    #[serde(default)]
    pub model_count: Option<u32>,
    #[serde(default)]
    pub sample_model: Option<String>,
}

/// Kind of entry analysis to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    General,
    Mood,
    Summary,
    Insights,
}

impl AnalysisType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "general" => Some(Self::General),
            "mood" => Some(Self::Mood),
            "summary" => Some(Self::Summary),
            "insights" => Some(Self::Insights),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnalysisRequest<'a> {
    pub entry_id: u64,
    pub analysis_type: AnalysisType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
}

/// Result of analyzing a journal entry
#[derive(Debug, Clone, Deserialize)]
pub struct EntryAnalysis {
    pub entry_id: u64,
    pub title: String,
    #[serde(default)]
    pub think: Option<String>,
    pub answer: String,
    #[serde(default)]
    pub raw_content: String,
    pub analysis_type: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Options for journaling prompt generation
#[derive(Debug, Clone, Serialize)]
pub struct PromptsRequest {
    pub topic: String,
    pub theme: String,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for PromptsRequest {
    fn default() -> Self {
        Self {
            topic: String::new(),
            theme: String::new(),
            count: 5,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PromptsResponse {
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// Kind of writing improvement to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementType {
    Grammar,
    Style,
    Vocabulary,
    #[default]
    Complete,
}

impl ImprovementType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "grammar" => Some(Self::Grammar),
            "style" => Some(Self::Style),
            "vocabulary" => Some(Self::Vocabulary),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WritingRequest<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_type: Option<ImprovementType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
}

/// Improved text returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct WritingImprovement {
    pub original_text: String,
    #[serde(default)]
    pub think: Option<String>,
    pub improved_text: String,
    #[serde(default)]
    pub raw_content: String,
    pub improvement_type: String,
}

/// Free-form writing suggestions returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct WritingSuggestions {
    pub original_text: String,
    #[serde(default)]
    pub think: Option<String>,
    pub suggestions: String,
    #[serde(default)]
    pub raw_content: String,
}

/// File record returned after an upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub file_id: Option<u64>,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub file_type: Option<String>,
}

impl UploadedFile {
    /// Whether the stored file is an image
    ///
    /// The server's type wins when it says image; otherwise the name decides.
    pub fn is_image(&self) -> bool {
        let is_image = |mime: &mime_guess::Mime| mime.type_() == mime_guess::mime::IMAGE;
        let declared = self
            .file_type
            .as_deref()
            .and_then(|t| t.parse::<mime_guess::Mime>().ok());
        if declared.as_ref().is_some_and(is_image) {
            return true;
        }
        mime_guess::from_path(&self.file_name)
            .first()
            .is_some_and(|mime| is_image(&mime))
    }

    /// Markdown reference to splice into entry content
    pub fn to_markdown(&self, base_url: &str) -> String {
        let url = if self.file_path.starts_with("http") {
            self.file_path.clone()
        } else {
            format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                self.file_path.trim_start_matches('/')
            )
        };
        if self.is_image() {
            format!("![{}]({})", self.file_name, url)
        } else {
            format!("[{}]({})", self.file_name, url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stats_update_overwrites_present_fields() {
        let mut stats = Stats::new(100.0, 2.0);
        stats.update(Stats {
            inference_time: Some(150.0),
            tokens_per_second: None,
        });
        assert_eq!(stats, Stats::new(150.0, 2.0));
    }

    #[test]
    fn test_stats_fill_missing_keeps_existing() {
        let mut stats = Stats {
            inference_time: Some(200.0),
            tokens_per_second: None,
        };
        stats.fill_missing(Stats::new(999.0, 4.0));
        assert_eq!(stats, Stats::new(200.0, 4.0));
    }

    #[test]
    fn test_placeholder_is_blank() {
        let msg = Message::assistant_placeholder();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.is_blank());
        assert!(!msg.has_content());
        assert_eq!(msg.thinking(), None);
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest::new(
            "hi",
            vec![HistoryTurn {
                role: Role::User,
                content: "earlier".into(),
            }],
        )
        .with_model(Some("qwen2.5-7b".into()))
        .with_mode(ChatMode::Reasoning);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "hi",
                "history": [{"role": "user", "content": "earlier"}],
                "model": "qwen2.5-7b",
                "mode": "reasoning",
                "stream": true
            })
        );
    }

    #[test]
    fn test_chat_mode_parse() {
        assert_eq!(ChatMode::parse("Reasoning"), Some(ChatMode::Reasoning));
        assert_eq!(ChatMode::parse("simple"), Some(ChatMode::Simple));
        assert_eq!(ChatMode::parse("deep"), None);
        assert_eq!(AnalysisType::parse("MOOD"), Some(AnalysisType::Mood));
        assert_eq!(
            ImprovementType::parse("grammar"),
            Some(ImprovementType::Grammar)
        );
        assert_eq!(ImprovementType::parse("rewrite"), None);
    }

    #[test]
    fn test_uploaded_file_markdown() {
        let image = UploadedFile {
            file_id: Some(1),
            file_name: "sunset.JPG".into(),
            file_path: "/uploads/entries/abc.jpg".into(),
            file_type: None,
        };
        assert_eq!(
            image.to_markdown("http://localhost:8000/"),
            "![sunset.JPG](http://localhost:8000/uploads/entries/abc.jpg)"
        );

        let doc = UploadedFile {
            file_id: Some(2),
            file_name: "notes.pdf".into(),
            file_path: "uploads/entries/notes.pdf".into(),
            file_type: Some("application/pdf".into()),
        };
        assert_eq!(
            doc.to_markdown("http://localhost:8000"),
            "[notes.pdf](http://localhost:8000/uploads/entries/notes.pdf)"
        );
    }

    #[test]
    fn test_uploaded_file_is_image() {
        let file = |name: &str, file_type: Option<&str>| UploadedFile {
            file_id: None,
            file_name: name.into(),
            file_path: format!("uploads/{}", name),
            file_type: file_type.map(str::to_string),
        };
        assert!(file("diagram.SVG", None).is_image());
        assert!(file("photo.webp", None).is_image());
        assert!(file("scan", Some("image/tiff")).is_image());
        assert!(!file("clip.mp4", None).is_image());
        assert!(!file("notes.md", Some("text/markdown")).is_image());
    }
}
