use super::ChatClient;
use crate::errors::{AppError, AppResult};
use crate::models::{StreamEvent, StreamReportRequest};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Marker prefixing each event line of the report stream.
pub const EVENT_MARKER: &str = "data: ";

/// Reassembles streamed chunks into whole lines; a partial trailing line is
/// kept until the next push or the final flush.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut lines = Vec::new();
        loop {
            let idx_n = self.buffer.find('\n');
            let idx_r = self.buffer.find('\r');
            let idx = match (idx_n, idx_r) {
                (None, None) => break,
                (Some(n), None) => n,
                (None, Some(r)) => r,
                (Some(n), Some(r)) => n.min(r),
            };

            let line = self.buffer[..idx].to_string();
            let mut advance = 1;
            if self.buffer.as_bytes().get(idx) == Some(&b'\r')
                && self.buffer.as_bytes().get(idx + 1) == Some(&b'\n')
            {
                advance = 2;
            }
            self.buffer.drain(..idx + advance);
            lines.push(line);
        }
        lines
    }

    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Parses one stream line. Lines without the event marker (keep-alives,
/// blank separators) and unparseable payloads yield nothing.
pub fn parse_event_line(line: &str) -> Option<StreamEvent> {
    let payload = line.trim().strip_prefix(EVENT_MARKER)?;
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(error) => {
            tracing::debug!(%error, "skipping unparseable stream event");
            None
        }
    }
}

impl ChatClient {
    /// Consumes the report event stream, invoking `on_event` per parsed
    /// event. The whole read is bounded by the configured hard timeout; when
    /// it elapses the read is cancelled and a timeout error surfaces.
    pub async fn stream_report(
        &self,
        request: &StreamReportRequest,
        mut on_event: impl FnMut(StreamEvent),
    ) -> AppResult<()> {
        let url = self.report_stream_url()?;
        let limit = Duration::from_secs(self.config.stream_timeout_secs);
        let deadline = Instant::now() + limit;

        tracing::info!(market = %request.market_name, "opening report stream");
        let send = self.http.post(url).timeout(limit).json(request).send();
        let response = timeout_at(deadline, send)
            .await
            .map_err(|_| timeout_error(limit))??
            .error_for_status()?;

        let mut response = response;
        let mut buffer = LineBuffer::new();
        loop {
            let chunk = timeout_at(deadline, response.chunk())
                .await
                .map_err(|_| timeout_error(limit))??;
            let Some(chunk) = chunk else {
                break;
            };
            let text = String::from_utf8_lossy(&chunk);
            for line in buffer.push(&text) {
                if let Some(event) = parse_event_line(&line) {
                    on_event(event);
                }
            }
        }
        let tail = buffer.flush();
        if let Some(event) = parse_event_line(&tail) {
            on_event(event);
        }
        Ok(())
    }
}

fn timeout_error(limit: Duration) -> AppError {
    AppError::Timeout(format!(
        "report stream exceeded {}s",
        limit.as_secs()
    ))
}

#[cfg(test)]
mod tests {
    use super::{parse_event_line, LineBuffer};
    use crate::models::StreamEvent;

    #[test]
    fn splits_mixed_newlines_and_keeps_partials() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push("a\nb\r\nc\rd");
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(buffer.flush(), "d");
    }

    #[test]
    fn event_split_across_chunks_reassembles() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push("data: {\"type\":\"start\",\"conv").is_empty());
        let lines = buffer.push("ersation_id\":\"conv-1\"}\n");
        assert_eq!(lines.len(), 1);
        let event = parse_event_line(&lines[0]).expect("parsed");
        assert!(matches!(event, StreamEvent::Start { conversation_id } if conversation_id == "conv-1"));
    }

    #[test]
    fn progress_event_carries_fraction_and_step() {
        let event = parse_event_line("data: {\"type\":\"progress\",\"percentage\":0.42,\"step\":\"Sizing\"}")
            .expect("parsed");
        match event {
            StreamEvent::Progress {
                percentage, step, ..
            } => {
                assert!((percentage - 0.42).abs() < f64::EPSILON);
                assert_eq!(step.as_deref(), Some("Sizing"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn complete_event_parses_sections_and_recommendations() {
        let line = concat!(
            "data: {\"type\":\"complete\",\"sections\":[{\"id\":\"s1\",\"title\":\"Taille\",\"content\":\"…\"}],",
            "\"expert_recommendations\":[{\"section_id\":\"s1\",\"section_title\":\"Taille\",",
            "\"recommendation\":\"Consulter un expert sectoriel.\"}],\"conversation_id\":\"conv-2\"}"
        );
        let event = parse_event_line(line).expect("parsed");
        match event {
            StreamEvent::Complete {
                sections,
                expert_recommendations,
                conversation_id,
            } => {
                assert_eq!(sections.len(), 1);
                assert_eq!(expert_recommendations.len(), 1);
                assert_eq!(conversation_id.as_deref(), Some("conv-2"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn non_event_lines_are_ignored() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line(": keep-alive").is_none());
        assert!(parse_event_line("data: pas du json").is_none());
        assert!(parse_event_line("data: {\"type\":\"inconnu\"}").is_none());
    }
}
