use crate::models::StreamEvent;
use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

const CONVERSATION_ID_PREFIX: &str = "conv";
const CONVERSATION_ID_SUFFIX_LEN: usize = 6;

/// Per-conversation state that used to live in module-scoped singletons:
/// the conversation id and the two indicator slots. Each indicator is a
/// singleton — starting a new one replaces whatever was tracked before.
#[derive(Debug)]
pub struct ConversationSession {
    conversation_id: String,
    typing: Option<TypingIndicator>,
    progress: Option<ProgressIndicator>,
}

#[derive(Debug, Clone)]
pub struct TypingIndicator {
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressIndicator {
    pub percent: u8,
    pub step: String,
    pub details: Option<String>,
    pub section_index: Option<u32>,
    pub total_sections: Option<u32>,
    pub remaining_secs: Option<u64>,
}

impl ProgressIndicator {
    pub fn percent_label(&self) -> String {
        format!("{}%", self.percent)
    }

    pub fn remaining_label(&self) -> Option<String> {
        let secs = self.remaining_secs?;
        if secs >= 60 {
            Some(format!("{} min {:02} s", secs / 60, secs % 60))
        } else {
            Some(format!("{} s", secs))
        }
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            conversation_id: generate_conversation_id(),
            typing: None,
            progress: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Adopts a server-assigned conversation id.
    pub fn adopt_conversation_id(&mut self, id: impl Into<String>) {
        self.conversation_id = id.into();
    }

    /// Fresh id, all indicators cleared.
    pub fn reset(&mut self) {
        self.conversation_id = generate_conversation_id();
        self.typing = None;
        self.progress = None;
    }

    pub fn show_typing(&mut self) {
        if self.typing.is_some() {
            tracing::debug!("typing indicator replaced");
        }
        self.typing = Some(TypingIndicator { shown_at: Utc::now() });
    }

    pub fn clear_typing(&mut self) {
        self.typing = None;
    }

    pub fn typing_active(&self) -> bool {
        self.typing.is_some()
    }

    pub fn start_progress(&mut self) {
        if self.progress.is_some() {
            tracing::debug!("progress indicator replaced");
        }
        self.progress = Some(ProgressIndicator::default());
    }

    pub fn progress(&self) -> Option<&ProgressIndicator> {
        self.progress.as_ref()
    }

    pub fn clear_progress(&mut self) {
        self.progress = None;
    }

    /// Folds a stream event into the session: progress updates the active
    /// indicator, start/complete may adopt a server conversation id.
    pub fn apply_stream_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Start { conversation_id } => {
                self.adopt_conversation_id(conversation_id.clone());
            }
            StreamEvent::Progress {
                percentage,
                step,
                details,
                section_index,
                total_sections,
                estimated_time_remaining,
            } => {
                let Some(progress) = self.progress.as_mut() else {
                    return;
                };
                progress.percent = (percentage * 100.0).round().clamp(0.0, 100.0) as u8;
                if let Some(step) = step {
                    progress.step = step.clone();
                }
                progress.details = details.clone();
                progress.section_index = *section_index;
                progress.total_sections = *total_sections;
                progress.remaining_secs = *estimated_time_remaining;
            }
            StreamEvent::Complete {
                conversation_id: Some(id),
                ..
            } => {
                self.adopt_conversation_id(id.clone());
            }
            _ => {}
        }
    }
}

fn generate_conversation_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CONVERSATION_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!(
        "{}-{}-{}",
        CONVERSATION_ID_PREFIX,
        Utc::now().timestamp_millis(),
        suffix.to_lowercase()
    )
}
