use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};
use crate::format::{charts, FormattedMessage, MessageFormatter};
use crate::html::{Fragment, Node};
use crate::models::{
    ExpertRecommendation, Message, ReportRequest, ReportSection, Sender, StreamEvent,
    StreamReportRequest,
};
use crate::session::ConversationSession;
use crate::transport::ChatClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A message with its rendered fragment. The fragment stays around so the
/// delayed chart-attachment retries can re-serialize it.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub message: Message,
    pub fragment: Fragment,
    pub html: String,
}

/// Owns the conversation view, the session state and the transport client.
/// One instance per conversation surface.
pub struct ConversationController {
    config: EngineConfig,
    formatter: MessageFormatter,
    client: ChatClient,
    session: ConversationSession,
    view: Arc<Mutex<Vec<RenderedMessage>>>,
}

impl ConversationController {
    pub fn new(config: EngineConfig) -> AppResult<Self> {
        let client = ChatClient::new(config.clone())?;
        Ok(Self {
            config,
            formatter: MessageFormatter::new(),
            client,
            session: ConversationSession::new(),
            view: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn message_count(&self) -> AppResult<usize> {
        Ok(self.lock_view()?.len())
    }

    pub fn rendered_html(&self) -> AppResult<Vec<String>> {
        Ok(self.lock_view()?.iter().map(|entry| entry.html.clone()).collect())
    }

    /// Clears the view and rotates the conversation id.
    pub fn clear(&mut self) -> AppResult<()> {
        self.lock_view()?.clear();
        self.session.reset();
        Ok(())
    }

    /// Sends a user message. Empty input is ignored (composition gating);
    /// webhook failures fall back to a local reply so the conversation never
    /// stalls.
    pub async fn send_message(&mut self, text: &str) -> AppResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let user = Message::new(text, Sender::User);
        let formatted = self.formatter.format_plain(text);
        self.push_rendered(user, formatted)?;

        tokio::time::sleep(Duration::from_millis(self.config.typing_delay_ms)).await;
        self.session.show_typing();

        let reply = if self.client.has_webhook() {
            match self
                .client
                .send_chat(text, self.session.conversation_id())
                .await
            {
                Ok(reply) => reply,
                Err(error) => {
                    tracing::warn!(%error, "webhook send failed, using local fallback reply");
                    mock_reply(text)
                }
            }
        } else {
            tokio::time::sleep(Duration::from_millis(self.config.mock_response_delay_ms)).await;
            mock_reply(text)
        };

        self.session.clear_typing();
        self.push_bot_reply(&reply)
    }

    /// Structured report request over the non-streaming path. Failures are
    /// turned into user-facing messages, never propagated past the view.
    pub async fn request_report(&mut self, request: ReportRequest) -> AppResult<()> {
        let request = ReportRequest {
            conversation_id: request
                .conversation_id
                .or_else(|| Some(self.session.conversation_id().to_string())),
            ..request
        };
        let reply = match self.client.request_report(&request).await {
            Ok(reply) => reply,
            Err(AppError::Connectivity(error)) => {
                tracing::warn!(%error, "report backend unreachable");
                "Impossible de contacter le serveur. Vérifiez votre connexion et réessayez."
                    .to_string()
            }
            Err(error) => {
                tracing::warn!(%error, "report request failed");
                "La génération du rapport a échoué. Veuillez réessayer dans quelques instants."
                    .to_string()
            }
        };
        self.push_bot_reply(&reply)
    }

    /// Streams a report. The progress indicator follows the event stream and
    /// is torn down before any outcome — report or error — reaches the view.
    pub async fn run_report(&mut self, request: StreamReportRequest) -> AppResult<()> {
        let request = StreamReportRequest {
            conversation_id: request
                .conversation_id
                .or_else(|| Some(self.session.conversation_id().to_string())),
            ..request
        };

        self.session.start_progress();

        let client = self.client.clone();
        let mut completion: Option<(Vec<ReportSection>, Vec<ExpertRecommendation>)> = None;
        let mut stream_error: Option<String> = None;
        let session = &mut self.session;
        let result = client
            .stream_report(&request, |event| {
                session.apply_stream_event(&event);
                match event {
                    StreamEvent::SectionComplete { section } => {
                        tracing::info!(section = %section.title, "section completed");
                    }
                    StreamEvent::Complete {
                        sections,
                        expert_recommendations,
                        ..
                    } => {
                        completion = Some((sections, expert_recommendations));
                    }
                    StreamEvent::Error { message } => {
                        stream_error =
                            Some(message.unwrap_or_else(|| "erreur inconnue".to_string()));
                    }
                    _ => {}
                }
            })
            .await;

        self.session.clear_progress();

        let reply = match result {
            Err(AppError::Timeout(error)) => {
                tracing::warn!(%error, "report stream timed out");
                "La génération du rapport a dépassé le délai imparti. Veuillez relancer la demande."
                    .to_string()
            }
            Err(AppError::Connectivity(error)) => {
                tracing::warn!(%error, "report stream unreachable");
                "Impossible de contacter le serveur de génération de rapports. Vérifiez votre connexion."
                    .to_string()
            }
            Err(error) => {
                tracing::warn!(%error, "report stream failed");
                format!("Une erreur est survenue pendant la génération du rapport : {}", error)
            }
            Ok(()) => match (completion, stream_error) {
                (Some((sections, recommendations)), _) => {
                    assemble_report(&request.market_name, &sections, &recommendations)
                }
                (None, Some(message)) => {
                    format!("La génération du rapport a été interrompue : {}", message)
                }
                (None, None) => {
                    "Le serveur n'a renvoyé aucun rapport. Veuillez réessayer.".to_string()
                }
            },
        };
        self.push_bot_reply(&reply)
    }

    fn push_bot_reply(&mut self, reply: &str) -> AppResult<()> {
        let message = Message::new(reply, Sender::Bot);
        let formatted = self.formatter.format(reply);
        let index = self.push_rendered(message, formatted)?;
        self.schedule_chart_retries(index)?;
        Ok(())
    }

    fn push_rendered(&self, message: Message, formatted: FormattedMessage) -> AppResult<usize> {
        let html = formatted.to_html();
        let mut messages = self.lock_view()?;
        messages.push(RenderedMessage {
            message,
            fragment: formatted.fragment,
            html,
        });
        Ok(messages.len() - 1)
    }

    /// Chart attachment is retried twice on a delay to tolerate layout
    /// timing; every attempt is a no-op on already-attached charts.
    fn schedule_chart_retries(&self, index: usize) -> AppResult<()> {
        if !fragment_has_charts(&self.lock_view()?[index].fragment) {
            return Ok(());
        }
        let view = Arc::clone(&self.view);
        let short = Duration::from_millis(self.config.chart_retry_short_ms);
        let long = Duration::from_millis(self.config.chart_retry_long_ms);
        tokio::spawn(async move {
            for delay in [short, long.saturating_sub(short)] {
                tokio::time::sleep(delay).await;
                let Ok(mut messages) = view.lock() else {
                    return;
                };
                let Some(entry) = messages.get_mut(index) else {
                    return;
                };
                if charts::attach_charts(&mut entry.fragment) > 0 {
                    entry.html = entry.fragment.to_html();
                }
            }
        });
        Ok(())
    }

    fn lock_view(&self) -> AppResult<std::sync::MutexGuard<'_, Vec<RenderedMessage>>> {
        self.view
            .lock()
            .map_err(|_| AppError::Internal("view mutex poisoned".to_string()))
    }
}

fn fragment_has_charts(fragment: &Fragment) -> bool {
    fn walk(node: &Node) -> bool {
        match node.as_element() {
            Some(element) => {
                element.has_class("chart-container") || element.children.iter().any(walk)
            }
            None => false,
        }
    }
    fragment.children.iter().any(walk)
}

/// Local replies used when no webhook is configured or when it fails.
fn mock_reply(text: &str) -> String {
    let lower = text.to_lowercase();
    if lower.contains("bonjour") || lower.contains("salut") {
        return "Bonjour ! Je suis votre assistant d'étude. Comment puis-je vous aider dans vos missions aujourd'hui ? Je peux vous aider sur l'analyse de données, la rédaction de rapports ou la recherche d'informations sectorielles.".to_string();
    }
    if lower.contains("marché") || lower.contains("taille") {
        return "Pour réaliser une étude de taille de marché, j'aurais besoin de quelques précisions :\n\n1. Quel est le secteur d'activité ?\n2. Quelle est la zone géographique concernée ?\n3. Cherchez-vous des données en volume ou en valeur ?\n\nJe pourrai ensuite interroger nos bases de données internes et externes.".to_string();
    }
    "C'est noté. J'analyse votre demande...\n\nPourriez-vous préciser le contexte de cette requête pour que je puisse vous fournir une réponse plus ciblée ? Je peux accéder à nos bases de connaissances internes si vous me donnez plus de détails.".to_string()
}

fn assemble_report(
    market_name: &str,
    sections: &[ReportSection],
    recommendations: &[ExpertRecommendation],
) -> String {
    let mut md = format!("# Étude de marché : {}\n\n", market_name);
    for section in sections {
        md.push_str(&format!("## {}\n\n{}\n\n", section.title, section.content));
    }
    if !recommendations.is_empty() {
        md.push_str("## Recommandations d'experts\n\n");
        for rec in recommendations {
            md.push_str(&format!("- **{}** : {}\n", rec.section_title, rec.recommendation));
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::ConversationController;
    use crate::config::EngineConfig;
    use crate::models::{ReportAction, StreamReportRequest};

    fn fast_config() -> EngineConfig {
        EngineConfig {
            typing_delay_ms: 0,
            mock_response_delay_ms: 0,
            chart_retry_short_ms: 0,
            chart_retry_long_ms: 0,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn send_without_webhook_answers_with_a_local_reply() {
        let mut controller = ConversationController::new(fast_config()).expect("controller");
        controller.send_message("Bonjour !").await.expect("send");

        assert_eq!(controller.message_count().expect("count"), 2);
        let html = controller.rendered_html().expect("html");
        assert!(html[0].contains("Bonjour !"));
        assert!(html[1].contains("assistant"));
        assert!(!controller.session().typing_active());
    }

    #[tokio::test]
    async fn empty_input_is_ignored() {
        let mut controller = ConversationController::new(fast_config()).expect("controller");
        controller.send_message("   ").await.expect("send");
        assert_eq!(controller.message_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn market_questions_get_the_sizing_probe() {
        let mut controller = ConversationController::new(fast_config()).expect("controller");
        controller
            .send_message("Quelle est la taille du marché ?")
            .await
            .expect("send");
        let html = controller.rendered_html().expect("html");
        assert!(html[1].contains("secteur d'activité"));
        assert!(html[1].contains("<ol>"));
    }

    #[tokio::test]
    async fn clear_resets_view_and_session() {
        let mut controller = ConversationController::new(fast_config()).expect("controller");
        controller.send_message("salut").await.expect("send");
        let before = controller.session().conversation_id().to_string();
        controller.clear().expect("clear");
        assert_eq!(controller.message_count().expect("count"), 0);
        assert_ne!(controller.session().conversation_id(), before);
    }

    #[tokio::test]
    async fn report_without_endpoint_tears_down_progress_and_reports_error() {
        let mut controller = ConversationController::new(fast_config()).expect("controller");
        let request = StreamReportRequest {
            market_name: "Pet care".to_string(),
            geography: "France".to_string(),
            mission_type: "taille de marché".to_string(),
            client_website: None,
            conversation_id: None,
            action: ReportAction::Generate,
            section_id: None,
        };
        controller.run_report(request).await.expect("run");

        assert!(controller.session().progress().is_none());
        assert_eq!(controller.message_count().expect("count"), 1);
        let html = controller.rendered_html().expect("html");
        assert!(html[0].contains("erreur"));
    }
}
