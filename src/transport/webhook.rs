use super::ChatClient;
use crate::errors::AppResult;
use crate::models::{ChatRequest, ReportRequest};
use serde_json::Value;

impl ChatClient {
    /// Plain chat send. Network failures propagate; the controller falls back
    /// to a local reply so the conversation never stalls.
    pub async fn send_chat(&self, message: &str, conversation_id: &str) -> AppResult<String> {
        let url = self.webhook_url()?;
        let request = ChatRequest {
            message: message.to_string(),
            conversation_id: conversation_id.to_string(),
        };
        tracing::debug!(conversation_id, "sending chat message to webhook");
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(decode_reply(&body))
    }

    /// Structured report request, non-streaming path.
    pub async fn request_report(&self, request: &ReportRequest) -> AppResult<String> {
        let url = self.report_url()?;
        tracing::debug!(market = %request.market_name, "requesting report");
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(decode_reply(&body))
    }
}

/// Webhook responses come in several shapes: a JSON string, an object with an
/// `output`/`message`/`text` field, arbitrary JSON (pretty-printed), or a
/// plain text body.
pub fn decode_reply(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(text)) => text,
        Ok(value) => {
            for field in ["output", "message", "text"] {
                if let Some(text) = value.get(field).and_then(|entry| entry.as_str()) {
                    return text.to_string();
                }
            }
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string())
        }
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::decode_reply;

    #[test]
    fn json_string_is_unwrapped() {
        assert_eq!(decode_reply("\"Bonjour !\""), "Bonjour !");
    }

    #[test]
    fn known_object_fields_win_in_order() {
        assert_eq!(
            decode_reply("{\"output\":\"premier\",\"message\":\"second\"}"),
            "premier"
        );
        assert_eq!(decode_reply("{\"message\":\"second\"}"), "second");
        assert_eq!(decode_reply("{\"text\":\"troisième\"}"), "troisième");
    }

    #[test]
    fn unknown_json_is_pretty_printed() {
        let decoded = decode_reply("{\"autre\":42}");
        assert!(decoded.contains("\"autre\": 42"));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode_reply("réponse brute"), "réponse brute");
    }
}
