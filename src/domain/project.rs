use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodalOfficer {
    pub name: Option<String>,
    pub designation: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub state: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub panchayat: Option<String>,
    pub village: Option<String>,
}

/// Dates are ISO-8601 strings, stored in the `canonical_date` form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub proposal_date: Option<String>,
    pub approval_date: Option<String>,
    pub tender_publication_date: Option<String>,
    pub work_commencement_date: Option<String>,
    pub scheduled_completion_date: Option<String>,
    pub actual_completion_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactDetails {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Contractor {
    pub company_name: Option<String>,
    pub registration_number: Option<String>,
    pub contractor_class: Option<String>,
    pub contact_person: Option<String>,
    pub contact_details: Option<ContactDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Beneficiaries {
    pub direct_beneficiaries: Option<u64>,
    pub indirect_beneficiaries: Option<u64>,
    #[serde(default)]
    pub beneficiary_categories: Vec<String>,
}

/// A project document from the `projects` collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub project_description: Option<String>,
    pub project_type: Option<String>,
    pub work_category: Option<String>,
    pub sector: Option<String>,

    pub scheme_name: Option<String>,
    pub scheme_description: Option<String>,
    pub scheme_type: Option<String>,
    pub scheme_category: Option<String>,

    pub total_scheme_budget: Option<f64>,
    pub allocated_budget: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub current_amount_spent: Option<f64>,

    pub status: Option<String>,
    pub physical_progress_percentage: Option<f64>,

    pub implementing_department: Option<String>,
    pub implementing_agency: Option<String>,
    pub nodal_officer: Option<NodalOfficer>,

    pub location: Option<Location>,
    pub timeline: Option<Timeline>,
    pub contractor: Option<Contractor>,
    pub beneficiaries: Option<Beneficiaries>,

    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub created_by: Option<String>,
    pub last_modified_by: Option<String>,
}

impl Project {
    /// Spent amount as a share of the allocation, 0 when nothing is allocated.
    pub fn financial_progress_percentage(&self) -> f64 {
        financial_progress(self.allocated_budget, self.current_amount_spent)
    }

    pub fn remaining_budget(&self) -> f64 {
        self.allocated_budget.unwrap_or(0.0) - self.current_amount_spent.unwrap_or(0.0)
    }

    /// Rewrite every parseable date field into the canonical form; anything
    /// unparseable is kept as it was.
    pub fn with_canonical_dates(mut self) -> Self {
        normalize_date(&mut self.created_at);
        normalize_date(&mut self.updated_at);
        if let Some(timeline) = self.timeline.as_mut() {
            for field in [
                &mut timeline.proposal_date,
                &mut timeline.approval_date,
                &mut timeline.tender_publication_date,
                &mut timeline.work_commencement_date,
                &mut timeline.scheduled_completion_date,
                &mut timeline.actual_completion_date,
            ] {
                normalize_date(field);
            }
        }
        self
    }

    pub fn display_name(&self) -> &str {
        self.project_name
            .as_deref()
            .or(self.project_id.as_deref())
            .unwrap_or("unnamed project")
    }
}

pub fn financial_progress(allocated: Option<f64>, spent: Option<f64>) -> f64 {
    match allocated {
        Some(allocated) if allocated > 0.0 => spent.unwrap_or(0.0) / allocated * 100.0,
        _ => 0.0,
    }
}

/// Canonical date text: UTC with millisecond precision, e.g.
/// `2024-02-10T00:00:00.000Z`. Values in this form order correctly as plain
/// strings. A bare `YYYY-MM-DD` is midnight UTC; a timestamp without an
/// offset is taken as UTC.
pub fn canonical_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let instant = if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        parsed.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
    };
    Some(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn normalize_date(field: &mut Option<String>) {
    if let Some(canonical) = field.as_deref().and_then(canonical_date) {
        *field = Some(canonical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_financial_progress_guards_zero_and_missing_allocation() {
        assert_eq!(financial_progress(Some(0.0), Some(5000.0)), 0.0);
        assert_eq!(financial_progress(None, Some(5000.0)), 0.0);
        assert_eq!(financial_progress(None, None), 0.0);
        assert_eq!(financial_progress(Some(200.0), Some(50.0)), 25.0);
    }

    #[test]
    fn test_remaining_budget_defaults_missing_to_zero() {
        let project = Project {
            allocated_budget: Some(1000.0),
            ..Default::default()
        };
        assert_eq!(project.remaining_budget(), 1000.0);
    }

    #[test]
    fn test_canonical_date_forms() {
        let midnight = Some("2024-02-10T00:00:00.000Z".to_string());
        assert_eq!(canonical_date("2024-02-10"), midnight);
        assert_eq!(canonical_date("2024-02-10T00:00:00.000Z"), midnight);
        assert_eq!(canonical_date("2024-02-10T00:00:00+00:00"), midnight);
        assert_eq!(canonical_date("2024-02-10T05:30:00+05:30"), midnight);
        assert_eq!(canonical_date("2024-02-10T00:00:00"), midnight);
        assert_eq!(canonical_date("10/02/2024"), None);
        assert_eq!(canonical_date("last year"), None);
    }

    #[test]
    fn test_with_canonical_dates_rewrites_timeline() {
        let project = Project {
            created_at: Some("2024-01-01T10:15:00+00:00".into()),
            timeline: Some(Timeline {
                approval_date: Some("2024-02-10".into()),
                proposal_date: Some("sometime in 2023".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
        .with_canonical_dates();

        let timeline = project.timeline.unwrap();
        assert_eq!(timeline.approval_date.as_deref(), Some("2024-02-10T00:00:00.000Z"));
        assert_eq!(timeline.proposal_date.as_deref(), Some("sometime in 2023"));
        assert_eq!(project.created_at.as_deref(), Some("2024-01-01T10:15:00.000Z"));
    }

    #[test]
    fn test_deserialize_partial_document() {
        let project: Project = serde_json::from_value(json!({
            "project_id": "KL-AGR-WYD-2024-001",
            "location": { "district": "Wayanad" },
            "beneficiaries": { "direct_beneficiaries": 120 },
            "_id": "66b1f0",
            "__v": 0
        }))
        .unwrap();
        assert_eq!(project.location.unwrap().district.as_deref(), Some("Wayanad"));
        assert!(project.beneficiaries.unwrap().beneficiary_categories.is_empty());
        assert!(project.timeline.is_none());
    }
}
