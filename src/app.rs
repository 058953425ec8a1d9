use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::application::use_cases::chat_assistant::ChatReply;
use crate::application::use_cases::project_summary::{location_filter, summarize, ProjectSummary};
use crate::application::use_cases::report_synthesizer::RtiReport;
use crate::domain::error::{AppError, Result};
use crate::domain::project::Project;
use crate::infrastructure::bootstrap::AppState;
use crate::infrastructure::db::projects::ProjectListing;
use crate::infrastructure::pdf::render_pdf;

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Answer a question with an RTI report, optionally written to a PDF file.
pub async fn report(state: &AppState, question: &str, pdf_path: Option<&Path>) -> Result<RtiReport> {
    let report = state.pipeline.translate_and_report(question).await?;

    if let Some(path) = pdf_path {
        let bytes = render_pdf(&report.body)?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            AppError::IoError(format!("Failed to write {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Report PDF written");
    }

    Ok(report)
}

pub async fn chat(state: &AppState, message: &str) -> Result<ChatReply> {
    state.chat.reply(message).await
}

/// Forget the stored conversation; returns how many turns were removed.
pub async fn clear_chat(state: &AppState) -> Result<u64> {
    let removed = state.history.clear().await?;
    info!(removed, "Chat history cleared");
    Ok(removed)
}

pub async fn list_projects(
    state: &AppState,
    sector: Option<&str>,
    offset: u32,
    page_size: u32,
) -> Result<Vec<ProjectListing>> {
    state.projects.list(sector, offset, page_size).await
}

pub async fn project_details(state: &AppState, project_id: &str) -> Result<Project> {
    state.projects.find_by_id(project_id).await
}

pub async fn summary(
    state: &AppState,
    district: Option<&str>,
    block: Option<&str>,
    panchayat: Option<&str>,
) -> Result<ProjectSummary> {
    let filter = location_filter(district, block, panchayat);
    let projects = state.projects.find_all(&filter).await?;
    Ok(summarize(&projects))
}

/// Load projects from a JSON file holding either one document or an array.
pub async fn seed(state: &AppState, path: &Path) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let projects = parse_seed_documents(&raw)?;

    for project in &projects {
        state.projects.insert(project).await?;
    }
    info!(count = projects.len(), path = %path.display(), "Projects seeded");
    Ok(projects.len())
}

pub fn parse_seed_documents(raw: &str) -> Result<Vec<Project>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::ParseError(format!("Seed file is not valid JSON: {}", e)))?;
    let documents = match unwrap_extended_json(value) {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(AppError::ParseError(
                "Seed file must hold a project object or an array of them".to_string(),
            ))
        }
    };

    documents
        .into_iter()
        .enumerate()
        .map(|(idx, doc)| {
            serde_json::from_value::<Project>(doc)
                .map(Project::with_canonical_dates)
                .map_err(|e| AppError::ParseError(format!("Project #{} is invalid: {}", idx + 1, e)))
        })
        .collect()
}

/// Collapse document-store export wrappers (`{"$date": ..}`, `{"$oid": ..}`,
/// `{"$numberLong": ..}` and friends) into plain JSON values.
fn unwrap_extended_json(value: Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let (key, inner) = map.into_iter().next().unwrap_or_default();
            match key.as_str() {
                "$oid" => inner,
                "$date" => match inner {
                    Value::Object(_) => match unwrap_extended_json(inner) {
                        Value::Number(ms) => ms
                            .as_i64()
                            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
                            .map(|ts| Value::String(ts.to_rfc3339()))
                            .unwrap_or(Value::Null),
                        other => other,
                    },
                    other => other,
                },
                "$numberInt" | "$numberLong" | "$numberDouble" | "$numberDecimal" => inner
                    .as_str()
                    .and_then(|s| s.parse::<f64>().ok())
                    .and_then(|n| {
                        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                            Some(Value::from(n as i64))
                        } else {
                            serde_json::Number::from_f64(n).map(Value::Number)
                        }
                    })
                    .unwrap_or(inner),
                _ => {
                    let mut single = serde_json::Map::new();
                    single.insert(key, unwrap_extended_json(inner));
                    Value::Object(single)
                }
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, unwrap_extended_json(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_extended_json).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_array_and_single() {
        let many = parse_seed_documents(
            r#"[{"project_id":"KL-1","sector":"Rural Development"},{"project_id":"KL-2"}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[0].sector.as_deref(), Some("Rural Development"));

        let one = parse_seed_documents(r#"{"project_id":"KL-3","allocated_budget":500000}"#).unwrap();
        assert_eq!(one[0].allocated_budget, Some(500_000.0));
    }

    #[test]
    fn test_parse_seed_unwraps_export_wrappers() {
        let projects = parse_seed_documents(
            r#"[{
                "_id": {"$oid": "66b1f0c2a1"},
                "project_id": "KL-AGR-WYD-2024-001",
                "allocated_budget": {"$numberLong": "2500000"},
                "timeline": {
                    "approval_date": {"$date": "2024-02-10T00:00:00.000Z"},
                    "proposal_date": {"$date": {"$numberLong": "1704067200000"}}
                },
                "beneficiaries": {"direct_beneficiaries": {"$numberInt": "420"}}
            }]"#,
        )
        .unwrap();

        let project = &projects[0];
        assert_eq!(project.allocated_budget, Some(2_500_000.0));
        let timeline = project.timeline.as_ref().unwrap();
        assert_eq!(timeline.approval_date.as_deref(), Some("2024-02-10T00:00:00.000Z"));
        assert_eq!(timeline.proposal_date.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(project.beneficiaries.as_ref().unwrap().direct_beneficiaries, Some(420));
    }

    #[test]
    fn test_parse_seed_canonicalizes_dates() {
        let projects = parse_seed_documents(
            r#"{"project_id":"KL-4","timeline":{"approval_date":"2024-02-10","work_commencement_date":"2024-03-01T10:00:00+05:30"}}"#,
        )
        .unwrap();
        let timeline = projects[0].timeline.as_ref().unwrap();
        assert_eq!(timeline.approval_date.as_deref(), Some("2024-02-10T00:00:00.000Z"));
        assert_eq!(timeline.work_commencement_date.as_deref(), Some("2024-03-01T04:30:00.000Z"));
    }

    #[test]
    fn test_parse_seed_rejects_bad_documents() {
        assert!(matches!(parse_seed_documents("42"), Err(AppError::ParseError(_))));
        assert!(matches!(
            parse_seed_documents(r#"[{"allocated_budget":"a lot"}]"#),
            Err(AppError::ParseError(_))
        ));
    }
}
