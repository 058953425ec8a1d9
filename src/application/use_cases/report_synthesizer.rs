//! RTI disclosure report synthesis.
//!
//! Financial figures, dates and the application number are computed here;
//! the model only writes the prose around them.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::project::Project;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{clean_llm_response, strip_code_fence};
use chrono::{DateTime, Datelike, Duration, NaiveDate};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

pub const NOT_AVAILABLE: &str = "Information not available in records";
pub const REPORT_PROMPT_VERSION: &str = "rti-report-v1";
const DEFAULT_DEPARTMENT: &str = "Government Department";
const DEFAULT_OFFICER: &str = "Public Information Officer";
/// Applications are taken to have been filed this many days before the response.
const APPLICATION_LEAD_DAYS: i64 = 3;

/// What the report is about.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportSubject {
    Record(Box<Project>),
    /// No project matched the question.
    NoData,
}

impl ReportSubject {
    pub fn record(project: Project) -> Self {
        ReportSubject::Record(Box::new(project))
    }

    fn project(&self) -> Option<&Project> {
        match self {
            ReportSubject::Record(project) => Some(&**project),
            ReportSubject::NoData => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RtiReport {
    pub application_number: String,
    pub authentication_code: String,
    pub issue_date: NaiveDate,
    pub project_id: Option<String>,
    pub prompt_version: &'static str,
    pub body: String,
}

/// Indian digit grouping: `1234567` -> `₹12,34,567`. Rounds to whole rupees.
pub fn format_inr(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{}", rounded.abs() as u64);
    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        format!("{},{}", groups.join(","), tail)
    };
    if rounded < 0.0 {
        format!("-\u{20B9}{}", grouped)
    } else {
        format!("\u{20B9}{}", grouped)
    }
}

/// DD/MM/YYYY for ISO-8601 dates or timestamps; other text is returned unchanged.
pub fn format_date(value: &str) -> String {
    let trimmed = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return ts.format("%d/%m/%Y").to_string();
    }
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => date.format("%d/%m/%Y").to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Spent over allocated with one decimal, `0` when nothing is allocated.
pub fn format_financial_progress(project: &Project) -> String {
    match project.allocated_budget {
        Some(allocated) if allocated > 0.0 => format!("{:.1}", project.financial_progress_percentage()),
        _ => "0".to_string(),
    }
}

fn text(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(NOT_AVAILABLE)
}

fn amount(value: Option<f64>) -> String {
    value.map(format_inr).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn date(value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .map(format_date)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn count(value: Option<u64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn report_digest(subject: &ReportSubject, question: &str) -> [u8; 32] {
    let id = subject
        .project()
        .and_then(|p| p.project_id.as_deref())
        .unwrap_or("no-record");
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b"\n");
    hasher.update(question.trim().to_lowercase().as_bytes());
    hasher.finalize().into()
}

/// `RTI/<DEPT>/<year>/<6 digits>`, stable for the same record, question and year.
pub fn application_number(subject: &ReportSubject, question: &str, issue_date: NaiveDate) -> String {
    let prefix: String = subject
        .project()
        .and_then(|p| p.implementing_department.as_deref())
        .map(|d| d.chars().filter(|c| c.is_ascii_alphabetic()).take(3).collect::<String>())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "GOV".to_string())
        .to_uppercase();

    let digest = report_digest(subject, question);
    let seed = digest.iter().take(8).fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    format!("RTI/{}/{}/{}", prefix, issue_date.year(), seed % 900_000 + 100_000)
}

pub fn authentication_code(subject: &ReportSubject, question: &str) -> String {
    hex::encode_upper(&report_digest(subject, question)[..6])
}

pub struct ReportSynthesizer {
    client: Arc<dyn LLMClient + Send + Sync>,
    config: LLMConfig,
}

impl ReportSynthesizer {
    pub fn new(client: Arc<dyn LLMClient + Send + Sync>, config: LLMConfig) -> Self {
        Self { client, config }
    }

    /// Generate the report. Upstream errors are returned as-is.
    pub async fn synthesize(
        &self,
        subject: &ReportSubject,
        question: &str,
        issue_date: NaiveDate,
    ) -> Result<RtiReport> {
        let prompt = build_report_prompt(subject, question, issue_date)?;
        debug!(prompt_chars = prompt.len(), "Requesting report generation");

        let raw = self.client.generate(&self.config, &prompt).await?;
        let mut body = strip_code_fence(&clean_llm_response(&raw));
        if body.is_empty() {
            return Err(AppError::LLMError("Report generation returned empty text".to_string()));
        }

        if matches!(subject, ReportSubject::NoData) && !body.contains(NOT_AVAILABLE) {
            body = format!(
                "**Notice:** {} for the query \"{}\".\n\n{}",
                NOT_AVAILABLE,
                question.trim(),
                body
            );
        }

        let report = RtiReport {
            application_number: application_number(subject, question, issue_date),
            authentication_code: authentication_code(subject, question),
            issue_date,
            project_id: subject.project().and_then(|p| p.project_id.clone()),
            prompt_version: REPORT_PROMPT_VERSION,
            body,
        };
        info!(
            application_number = %report.application_number,
            project_id = ?report.project_id,
            body_chars = report.body.len(),
            "Report generated"
        );
        Ok(report)
    }
}

/// The 11-section report prompt with every literal value filled in.
pub fn build_report_prompt(subject: &ReportSubject, question: &str, issue_date: NaiveDate) -> Result<String> {
    let empty = Project::default();
    let project = subject.project().unwrap_or(&empty);
    let question = question.trim();

    let data_block = match subject {
        ReportSubject::Record(project) => serde_json::to_string_pretty(project)
            .map_err(|e| AppError::Internal(format!("Failed to encode project: {}", e)))?,
        ReportSubject::NoData => "No project record matched this query.".to_string(),
    };

    let application_date = issue_date - Duration::days(APPLICATION_LEAD_DAYS);
    let location = project.location.clone().unwrap_or_default();
    let officer = project.nodal_officer.clone().unwrap_or_default();
    let contractor = project.contractor.clone().unwrap_or_default();
    let contact = contractor.contact_details.clone().unwrap_or_default();
    let timeline = project.timeline.clone().unwrap_or_default();
    let beneficiaries = project.beneficiaries.clone().unwrap_or_default();
    let categories = if beneficiaries.beneficiary_categories.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        beneficiaries.beneficiary_categories.join(", ")
    };

    let mut p = String::new();
    let _ = writeln!(
        p,
        "You are an expert government report writer for the Right to Information (RTI) Act, 2005. \
         Write a complete, professional RTI information disclosure report from the project data below."
    );
    let _ = writeln!(p);
    let _ = writeln!(p, "USER QUERY: \"{}\"", question);
    let _ = writeln!(p);
    let _ = writeln!(p, "PROJECT DATA:");
    let _ = writeln!(p, "{}", data_block);
    let _ = writeln!(p);
    let _ = writeln!(p, "Use exactly this structure and these values:");
    let _ = writeln!(p);

    let _ = writeln!(p, "## HEADER");
    let _ = writeln!(p, "- Title: RIGHT TO INFORMATION ACT, 2005");
    let _ = writeln!(p, "- Subtitle: INFORMATION DISCLOSURE REPORT");
    let _ = writeln!(p, "- RTI Application No: {}", application_number(subject, question, issue_date));
    let _ = writeln!(p, "- Date of Application: {}", application_date.format("%d/%m/%Y"));
    let _ = writeln!(p, "- Date of Response: {}", issue_date.format("%d/%m/%Y"));
    let _ = writeln!(
        p,
        "- Public Information Officer: {}",
        officer.name.as_deref().unwrap_or(DEFAULT_OFFICER)
    );
    let _ = writeln!(
        p,
        "- Department: {}",
        project.implementing_department.as_deref().unwrap_or(DEFAULT_DEPARTMENT)
    );
    let _ = writeln!(p, "- Applicant: [Name Redacted as per Section 8(1)(j)]");
    let _ = writeln!(p);

    let _ = writeln!(p, "### 1. QUERY RECEIVED");
    let _ = writeln!(p, "- Subject: {}", question);
    let _ = writeln!(p, "- Specific Information Requested: list the information an RTI applicant would request for this query");
    let _ = writeln!(p);

    let _ = writeln!(p, "### 2. PROJECT OVERVIEW");
    let _ = writeln!(p, "- Project Name: {}", text(project.project_name.as_deref()));
    let _ = writeln!(p, "- Project ID: {}", text(project.project_id.as_deref()));
    let _ = writeln!(p, "- Project Type: {}", text(project.project_type.as_deref()));
    let _ = writeln!(p, "- Sector: {}", text(project.sector.as_deref()));
    let _ = writeln!(p, "- Work Category: {}", text(project.work_category.as_deref()));
    let _ = writeln!(p, "- Current Status: {}", text(project.status.as_deref()));
    let _ = writeln!(
        p,
        "- Location: {}, {}, {}",
        text(location.district.as_deref()),
        text(location.block.as_deref()),
        text(location.panchayat.as_deref())
    );
    let _ = writeln!(p);

    let _ = writeln!(p, "### 3. SCHEME INFORMATION");
    let _ = writeln!(p, "- Scheme Name: {}", text(project.scheme_name.as_deref()));
    let _ = writeln!(p, "- Scheme Type: {}", text(project.scheme_type.as_deref()));
    let _ = writeln!(p, "- Scheme Category: {}", text(project.scheme_category.as_deref()));
    let _ = writeln!(p, "- Scheme Description: {}", text(project.scheme_description.as_deref()));
    let _ = writeln!(p);

    let _ = writeln!(p, "### 4. FINANCIAL DETAILS");
    let _ = writeln!(p, "- Total Scheme Budget: {}", amount(project.total_scheme_budget));
    let _ = writeln!(p, "- Allocated Budget: {}", amount(project.allocated_budget));
    let _ = writeln!(p, "- Estimated Cost: {}", amount(project.estimated_cost));
    let _ = writeln!(p, "- Current Amount Spent: {}", amount(project.current_amount_spent));
    let _ = writeln!(p, "- Remaining Budget: {}", format_inr(project.remaining_budget()));
    let _ = writeln!(
        p,
        "- Physical Progress: {}",
        project
            .physical_progress_percentage
            .map(|v| format!("{}%", v))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    );
    let _ = writeln!(p, "- Financial Progress: {}%", format_financial_progress(project));
    let _ = writeln!(p);

    let _ = writeln!(p, "### 5. IMPLEMENTATION DETAILS");
    let _ = writeln!(p, "- Implementing Department: {}", text(project.implementing_department.as_deref()));
    let _ = writeln!(p, "- Implementing Agency: {}", text(project.implementing_agency.as_deref()));
    let _ = writeln!(
        p,
        "- Nodal Officer: {} ({})",
        text(officer.name.as_deref()),
        text(officer.designation.as_deref())
    );
    let _ = writeln!(
        p,
        "- Contact: {} | {}",
        text(officer.contact.as_deref()),
        text(officer.email.as_deref())
    );
    let _ = writeln!(p);

    let _ = writeln!(p, "### 6. CONTRACTOR INFORMATION");
    let _ = writeln!(p, "- Company Name: {}", text(contractor.company_name.as_deref()));
    let _ = writeln!(p, "- Registration Number: {}", text(contractor.registration_number.as_deref()));
    let _ = writeln!(p, "- Contractor Class: {}", text(contractor.contractor_class.as_deref()));
    let _ = writeln!(p, "- Contact Person: {}", text(contractor.contact_person.as_deref()));
    let _ = writeln!(p, "- Phone: {}", text(contact.phone.as_deref()));
    let _ = writeln!(p, "- Email: {}", text(contact.email.as_deref()));
    let _ = writeln!(p, "- Address: {}", text(contact.address.as_deref()));
    let _ = writeln!(p);

    let _ = writeln!(p, "### 7. PROJECT TIMELINE");
    let _ = writeln!(p, "- Proposal Date: {}", date(timeline.proposal_date.as_deref()));
    let _ = writeln!(p, "- Approval Date: {}", date(timeline.approval_date.as_deref()));
    let _ = writeln!(p, "- Tender Publication: {}", date(timeline.tender_publication_date.as_deref()));
    let _ = writeln!(p, "- Work Commencement: {}", date(timeline.work_commencement_date.as_deref()));
    let _ = writeln!(p, "- Scheduled Completion: {}", date(timeline.scheduled_completion_date.as_deref()));
    let _ = writeln!(p, "- Actual Completion: {}", date(timeline.actual_completion_date.as_deref()));
    let _ = writeln!(p);

    let _ = writeln!(p, "### 8. BENEFICIARY INFORMATION");
    let _ = writeln!(p, "- Direct Beneficiaries: {}", count(beneficiaries.direct_beneficiaries));
    let _ = writeln!(p, "- Indirect Beneficiaries: {}", count(beneficiaries.indirect_beneficiaries));
    let _ = writeln!(p, "- Beneficiary Categories: {}", categories);
    let _ = writeln!(p);

    let _ = writeln!(p, "### 9. ADDITIONAL INFORMATION");
    let _ = writeln!(p, "- Project Description: {}", text(project.project_description.as_deref()));
    let _ = writeln!(p, "- Created Date: {}", date(project.created_at.as_deref()));
    let _ = writeln!(p, "- Last Updated: {}", date(project.updated_at.as_deref()));
    let _ = writeln!(p, "- Created By: {}", text(project.created_by.as_deref()));
    let _ = writeln!(p, "- Last Modified By: {}", text(project.last_modified_by.as_deref()));
    let _ = writeln!(p);

    let _ = writeln!(p, "### 10. TRANSPARENCY MEASURES");
    let _ = writeln!(p, "- Standard transparency and grievance redressal information");
    let _ = writeln!(p, "- Public Information Officer contact details");
    let _ = writeln!(p, "- First Appellate Authority information and the 30-day appeal window");
    let _ = writeln!(p);

    let _ = writeln!(p, "### 11. FOOTER");
    let _ = writeln!(p, "- Legal disclaimer as per RTI Act 2005");
    let _ = writeln!(p, "- Authentication code: {}", authentication_code(subject, question));
    let _ = writeln!(p, "- Contact information for further queries");
    let _ = writeln!(p);

    let _ = writeln!(p, "FORMATTING INSTRUCTIONS:");
    let _ = writeln!(p, "1. Use formal government language and section numbering (1., 2., 3., ...)");
    let _ = writeln!(p, "2. Use '## ' for the main title, '### ' for section headings, '- ' for items");
    let _ = writeln!(p, "3. Put a '---' line between major sections and bold important labels with **");
    let _ = writeln!(p, "4. Keep every currency amount and date exactly as given above");
    let _ = writeln!(p, "5. Include redaction notices for personal information");
    let _ = writeln!(p);
    let _ = writeln!(p, "IMPORTANT:");
    let _ = writeln!(
        p,
        "- Where a value is missing, write \"{}\"; never invent values",
        NOT_AVAILABLE
    );
    let _ = writeln!(p, "- Include all 11 sections even if data is missing");
    if matches!(subject, ReportSubject::NoData) {
        let _ = writeln!(
            p,
            "- No project record matched the query. State plainly at the top of the report that the requested information is not available in records, then complete every section with \"{}\"",
            NOT_AVAILABLE
        );
    }
    let _ = writeln!(p);
    let _ = write!(p, "Generate the complete RTI report now:");

    Ok(p)
}
