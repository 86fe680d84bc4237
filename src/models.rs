use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    pub html_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            html_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectiveKind {
    Bar,
    Pie,
    Line,
    Scatter,
    Table,
}

impl DirectiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Table => "table",
        }
    }

    pub fn classify(raw: &str) -> Option<Self> {
        match raw {
            "bar" => Some(Self::Bar),
            "pie" => Some(Self::Pie),
            "line" => Some(Self::Line),
            "scatter" => Some(Self::Scatter),
            "table" => Some(Self::Table),
            _ => None,
        }
    }

    pub fn is_chart(self) -> bool {
        !matches!(self, Self::Table)
    }
}

/// A chart or table instruction lifted out of message text. Consumed exactly
/// once during materialization; never persisted.
#[derive(Debug, Clone)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub token: String,
    pub payload: serde_json::Value,
    pub span_start: usize,
    pub span_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesValue {
    Number(f64),
    Point { x: f64, y: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub values: Vec<SeriesValue>,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: DirectiveKind,
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyMetric {
    pub value: String,
    pub description: String,
    pub block_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup {
    pub metrics: Vec<KeyMetric>,
}

impl MetricGroup {
    pub fn anchor(&self) -> usize {
        self.metrics.first().map(|m| m.block_index).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertRecommendation {
    pub section_id: String,
    pub section_title: String,
    pub recommendation: String,
}

/// Server-streamed report events, line-delimited behind a `data: ` marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        conversation_id: String,
    },
    Progress {
        /// 0–1 fraction; scaled to percent for display.
        percentage: f64,
        #[serde(default)]
        step: Option<String>,
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        section_index: Option<u32>,
        #[serde(default)]
        total_sections: Option<u32>,
        /// Seconds.
        #[serde(default)]
        estimated_time_remaining: Option<u64>,
    },
    SectionComplete {
        section: ReportSection,
    },
    Complete {
        sections: Vec<ReportSection>,
        #[serde(default)]
        expert_recommendations: Vec<ExpertRecommendation>,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub client_website: Option<String>,
    pub market_name: String,
    pub geography: String,
    pub mission_type: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReportRequest {
    pub market_name: String,
    pub geography: String,
    pub mission_type: String,
    pub client_website: Option<String>,
    pub conversation_id: Option<String>,
    pub action: ReportAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Generate,
    RegenerateSection,
}

impl Default for ReportAction {
    fn default() -> Self {
        Self::Generate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarChat {
    pub id: String,
    pub title: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SidebarNode {
    Chat(SidebarChat),
    Folder {
        id: String,
        name: String,
        chats: Vec<SidebarChat>,
    },
}

impl SidebarNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Chat(chat) => &chat.id,
            Self::Folder { id, .. } => id,
        }
    }
}
