use crate::domain::filter::{Condition, FilterExpr};
use crate::domain::project::{financial_progress, Project};
use serde::Serialize;
use std::collections::BTreeMap;

const UNSPECIFIED_SECTOR: &str = "Unspecified";
/// Statuses that count as planned: approved or tendered, work not started.
const PLANNED_STATUSES: &[&str] = &["Under Approval", "Tendering"];

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SectorSummary {
    pub name: String,
    pub total_projects: u64,
    pub planned: u64,
    pub ongoing: u64,
    pub completed: u64,
    pub budget_allocated: f64,
    pub budget_spent: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProjectSummary {
    /// Ordered by sector name.
    pub sectors: Vec<SectorSummary>,
    pub total_projects: u64,
    pub total_allocated: f64,
    pub total_spent: f64,
    pub financial_progress_percentage: f64,
}

/// Aggregate projects per sector. Missing amounts count as zero.
pub fn summarize(projects: &[Project]) -> ProjectSummary {
    let mut by_sector: BTreeMap<&str, SectorSummary> = BTreeMap::new();

    for project in projects {
        let name = project.sector.as_deref().unwrap_or(UNSPECIFIED_SECTOR);
        let entry = by_sector.entry(name).or_insert_with(|| SectorSummary {
            name: name.to_string(),
            ..Default::default()
        });

        entry.total_projects += 1;
        entry.budget_allocated += project.allocated_budget.unwrap_or(0.0);
        entry.budget_spent += project.current_amount_spent.unwrap_or(0.0);
        match project.status.as_deref() {
            Some("Ongoing") => entry.ongoing += 1,
            Some("Completed") => entry.completed += 1,
            Some(status) if PLANNED_STATUSES.contains(&status) => entry.planned += 1,
            _ => {}
        }
    }

    let sectors: Vec<SectorSummary> = by_sector.into_values().collect();
    let total_allocated: f64 = sectors.iter().map(|s| s.budget_allocated).sum();
    let total_spent: f64 = sectors.iter().map(|s| s.budget_spent).sum();

    ProjectSummary {
        total_projects: projects.len() as u64,
        financial_progress_percentage: financial_progress(Some(total_allocated), Some(total_spent)),
        total_allocated,
        total_spent,
        sectors,
    }
}

/// Restrict a summary to a location; each given part is a case-insensitive match.
pub fn location_filter(district: Option<&str>, block: Option<&str>, panchayat: Option<&str>) -> FilterExpr {
    let parts = [
        ("location.district", district),
        ("location.block", block),
        ("location.panchayat", panchayat),
    ];
    let leaves: Vec<FilterExpr> = parts
        .into_iter()
        .filter_map(|(field, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| FilterExpr::leaf(field, Condition::Contains(v.to_string())))
        })
        .collect();
    FilterExpr::And(leaves).simplify()
}
