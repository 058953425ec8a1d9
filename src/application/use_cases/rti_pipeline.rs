//! Question -> filter -> project -> RTI report.
//!
//! Each request walks a fixed sequence of states; every transition is logged
//! under a span carrying the request id. A failure at any step ends the
//! request in `Failed` with the original error.

use super::filter_parser::FilterParser;
use super::filter_prompt_builder::FilterPromptBuilder;
use super::report_synthesizer::{ReportSubject, ReportSynthesizer, RtiReport};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::schema::SchemaDescriptor;
use crate::infrastructure::config::{AppConfig, NoMatchPolicy};
use crate::infrastructure::db::projects::ProjectStore;
use crate::infrastructure::llm_clients::LLMClient;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpstreamStage {
    FilterGeneration,
    ReportGeneration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RequestState {
    Received,
    PromptBuilt,
    AwaitingUpstream(UpstreamStage),
    Parsed,
    Queried,
    Completed,
    Failed(String),
}

#[derive(Debug, Deserialize, Validate)]
pub struct RtiQuestion {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

impl RtiQuestion {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
        }
    }
}

/// Outcome of one request together with the states it passed through.
#[derive(Debug)]
pub struct PipelineRun {
    pub request_id: Uuid,
    pub states: Vec<RequestState>,
    pub result: Result<RtiReport>,
}

struct RequestTracker {
    states: Vec<RequestState>,
}

impl RequestTracker {
    fn new() -> Self {
        Self { states: Vec::new() }
    }

    fn advance(&mut self, state: RequestState) {
        info!(state = ?state, "Pipeline state");
        self.states.push(state);
    }

    fn fail(&mut self, error: &AppError) {
        warn!(kind = error.kind(), error = %error, "Pipeline failed");
        self.states.push(RequestState::Failed(error.kind().to_string()));
    }
}

pub struct RtiPipeline {
    client: Arc<dyn LLMClient + Send + Sync>,
    store: Arc<dyn ProjectStore>,
    prompt_builder: FilterPromptBuilder,
    parser: FilterParser,
    synthesizer: ReportSynthesizer,
    filter_config: LLMConfig,
    on_no_match: NoMatchPolicy,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl RtiPipeline {
    pub fn new(
        client: Arc<dyn LLMClient + Send + Sync>,
        store: Arc<dyn ProjectStore>,
        config: &AppConfig,
    ) -> Self {
        let schema = SchemaDescriptor::projects();
        let report_config = config.llm_config(config.llm.report_generation.clone());
        Self {
            synthesizer: ReportSynthesizer::new(client.clone(), report_config),
            client,
            store,
            prompt_builder: FilterPromptBuilder::new(schema),
            parser: FilterParser::new(schema),
            filter_config: config.llm_config(config.llm.filter_generation.clone()),
            on_no_match: config.pipeline.on_no_match,
            today: local_today,
        }
    }

    /// Fix the report issue date source.
    pub fn with_issue_date(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_no_match_policy(mut self, policy: NoMatchPolicy) -> Self {
        self.on_no_match = policy;
        self
    }

    pub async fn translate_and_report(&self, question: &str) -> Result<RtiReport> {
        self.execute(question).await.result
    }

    #[instrument(skip(self, question), fields(request_id = tracing::field::Empty))]
    pub async fn execute(&self, question: &str) -> PipelineRun {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let mut tracker = RequestTracker::new();
        let result = self.run(question, &mut tracker).await;
        if let Err(err) = &result {
            tracker.fail(err);
        }

        PipelineRun {
            request_id,
            states: tracker.states,
            result,
        }
    }

    async fn run(&self, question: &str, tracker: &mut RequestTracker) -> Result<RtiReport> {
        tracker.advance(RequestState::Received);
        let question = RtiQuestion::new(question);
        question
            .validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid question: {}", e)))?;

        let prompt = self.prompt_builder.build_prompt(&question.text);
        tracker.advance(RequestState::PromptBuilt);

        tracker.advance(RequestState::AwaitingUpstream(UpstreamStage::FilterGeneration));
        let raw_filter = self.client.generate(&self.filter_config, &prompt).await?;

        let filter = self.parser.parse(&raw_filter)?;
        tracker.advance(RequestState::Parsed);

        let subject = match self.store.find_first(&filter).await {
            Ok(project) => {
                info!(project_id = ?project.project_id, "Matched project");
                ReportSubject::record(project)
            }
            Err(AppError::NoMatch(reason)) if self.on_no_match == NoMatchPolicy::NoDataReport => {
                info!(reason = %reason, "No project matched, reporting unavailability");
                ReportSubject::NoData
            }
            Err(err) => return Err(err),
        };
        tracker.advance(RequestState::Queried);

        tracker.advance(RequestState::AwaitingUpstream(UpstreamStage::ReportGeneration));
        let report = self
            .synthesizer
            .synthesize(&subject, &question.text, (self.today)())
            .await?;
        tracker.advance(RequestState::Completed);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::filter_prompt_builder::FILTER_EXAMPLES;
    use crate::application::use_cases::report_synthesizer::NOT_AVAILABLE;
    use crate::infrastructure::db::projects::tests::sample_projects;
    use crate::infrastructure::db::projects::InMemoryProjectStore;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;
    use pretty_assertions::assert_eq;

    fn fixed_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn pipeline(client: Arc<ScriptedClient>, policy: NoMatchPolicy) -> RtiPipeline {
        let store = Arc::new(InMemoryProjectStore::with_projects(sample_projects()).unwrap());
        RtiPipeline::new(client, store, &AppConfig::default())
            .with_issue_date(fixed_date)
            .with_no_match_policy(policy)
    }

    fn happy_states() -> Vec<RequestState> {
        vec![
            RequestState::Received,
            RequestState::PromptBuilt,
            RequestState::AwaitingUpstream(UpstreamStage::FilterGeneration),
            RequestState::Parsed,
            RequestState::Queried,
            RequestState::AwaitingUpstream(UpstreamStage::ReportGeneration),
            RequestState::Completed,
        ]
    }

    #[tokio::test]
    async fn test_wayanad_question_end_to_end() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(format!("```json\n{}\n```", FILTER_EXAMPLES[3].filter)),
            Ok("## RTI RESPONSE\n### 2. PROJECT OVERVIEW\n- Project Name: Pepper Garden Rehabilitation".to_string()),
        ]));
        let pipeline = pipeline(client.clone(), NoMatchPolicy::Fail);

        let run = pipeline.execute("agriculture rehabilitation work in wayanad").await;

        assert_eq!(run.states, happy_states());
        let report = run.result.unwrap();
        assert_eq!(report.project_id.as_deref(), Some("KL-AGR-WYD-2024-001"));
        assert_eq!(report.issue_date, fixed_date());

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].ends_with("\"agriculture rehabilitation work in wayanad\""));
        assert!(prompts[1].contains("- Project Name: Pepper Garden Rehabilitation"));
    }

    #[tokio::test]
    async fn test_no_match_is_surfaced_by_default() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            r#"{"location.district":{"$regex":"kasaragod","$options":"i"}}"#.to_string(),
        )]));
        let pipeline = pipeline(client.clone(), NoMatchPolicy::Fail);

        let run = pipeline.execute("projects in kasaragod").await;

        assert!(matches!(run.result, Err(AppError::NoMatch(_))));
        assert_eq!(run.states.last(), Some(&RequestState::Failed("no_match".to_string())));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_data_policy_reports_unavailability() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(r#"{"location.district":{"$regex":"kasaragod","$options":"i"}}"#.to_string()),
            Ok("## RTI RESPONSE\nNo records were located.".to_string()),
        ]));
        let pipeline = pipeline(client.clone(), NoMatchPolicy::NoDataReport);

        let run = pipeline.execute("projects in kasaragod").await;

        assert_eq!(run.states, happy_states());
        let report = run.result.unwrap();
        assert!(report.body.contains(NOT_AVAILABLE));
        assert_eq!(report.project_id, None);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_field_stops_before_lookup() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(r#"{"district":"Wayanad"}"#.to_string())]));
        let pipeline = pipeline(client.clone(), NoMatchPolicy::Fail);

        let run = pipeline.execute("projects in wayanad").await;

        assert_eq!(run.result.unwrap_err(), AppError::UnknownField("district".to_string()));
        assert_eq!(
            run.states,
            vec![
                RequestState::Received,
                RequestState::PromptBuilt,
                RequestState::AwaitingUpstream(UpstreamStage::FilterGeneration),
                RequestState::Failed("unknown_field".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_and_oversized_questions_rejected() {
        for question in ["   ".to_string(), "x".repeat(2001)] {
            let client = Arc::new(ScriptedClient::new(vec![]));
            let pipeline = pipeline(client.clone(), NoMatchPolicy::Fail);

            let err = pipeline.translate_and_report(&question).await.unwrap_err();

            assert!(matches!(err, AppError::ValidationError(_)));
            assert_eq!(client.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_report_failure_is_fatal() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("{}".to_string()),
            Err(AppError::RateLimited("quota".to_string())),
        ]));
        let pipeline = pipeline(client.clone(), NoMatchPolicy::Fail);

        let run = pipeline.execute("any project").await;

        assert!(matches!(run.result, Err(AppError::RateLimited(_))));
        assert_eq!(
            &run.states[run.states.len() - 2..],
            &[
                RequestState::AwaitingUpstream(UpstreamStage::ReportGeneration),
                RequestState::Failed("rate_limited".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_match_all_filter_picks_first_project() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("{}".to_string()),
            Ok("## RTI RESPONSE".to_string()),
        ]));
        let report = pipeline(client, NoMatchPolicy::Fail)
            .translate_and_report("tell me about any project")
            .await
            .unwrap();
        assert_eq!(report.project_id.as_deref(), Some("KL-AGR-WYD-2024-001"));
    }
}
