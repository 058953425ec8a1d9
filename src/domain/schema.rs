//! Static description of the `projects` collection.
//!
//! The same table drives the schema section of the filter prompt and the
//! field allowlist applied to whatever filter the model sends back.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt::Write;

pub const COLLECTION_NAME: &str = "projects";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Enum(&'static [&'static str]),
    TextList,
}

impl FieldKind {
    /// Whether `$gte`/`$lte` style comparisons make sense on this field.
    pub fn is_ordered(&self) -> bool {
        matches!(self, FieldKind::Number | FieldKind::Date)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Enum(_) => "String",
            FieldKind::Number => "Number",
            FieldKind::Date => "Date",
            FieldKind::TextList => "Array of Strings",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub path: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

pub const PROJECT_TYPES: &[&str] = &[
    "New Construction",
    "Renovation",
    "Maintenance",
    "Supply",
    "Services",
];

pub const SECTORS: &[&str] = &[
    "Agriculture and Allied Services",
    "Rural Development",
    "Irrigation and Flood Control",
    "Transport and Communications",
    "Social and Community Services",
];

pub const SCHEME_TYPES: &[&str] = &["Central", "State", "Local"];

pub const STATUSES: &[&str] = &[
    "Completed",
    "Ongoing",
    "Inactive",
    "Tendering",
    "Under Approval",
    "Cancelled",
];

pub const CONTRACTOR_CLASSES: &[&str] = &["A Class", "B Class", "C Class"];

const fn field(path: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        path,
        kind,
        description,
    }
}

use FieldKind::{Date, Number, Text, TextList};

pub const PROJECT_FIELDS: &[FieldSpec] = &[
    field("project_id", Text, "unique identifier (Format: KL-AGR-WYD-2024-001)"),
    field("project_name", Text, "project title"),
    field("project_description", Text, "detailed description"),
    field("project_type", FieldKind::Enum(PROJECT_TYPES), "kind of work"),
    field("work_category", Text, "type of work"),
    field("sector", FieldKind::Enum(SECTORS), "development sector"),
    field("scheme_name", Text, "government scheme name"),
    field("scheme_description", Text, "scheme details"),
    field("scheme_type", FieldKind::Enum(SCHEME_TYPES), "funding level"),
    field("scheme_category", Text, "scheme classification"),
    field("total_scheme_budget", Number, "total budget allocated to the scheme"),
    field("allocated_budget", Number, "budget allocated to this project"),
    field("estimated_cost", Number, "estimated project cost"),
    field("current_amount_spent", Number, "amount spent so far"),
    field("status", FieldKind::Enum(STATUSES), "current project status"),
    field("physical_progress_percentage", Number, "0-100"),
    field("implementing_department", Text, "department handling the project"),
    field("implementing_agency", Text, "agency executing the project"),
    field("nodal_officer.name", Text, "officer name"),
    field("nodal_officer.designation", Text, "officer designation"),
    field("nodal_officer.contact", Text, "phone number"),
    field("nodal_officer.email", Text, "email address"),
    field("location.state", Text, "state, default \"Kerala\""),
    field("location.district", Text, "district name"),
    field("location.block", Text, "block name"),
    field("location.panchayat", Text, "panchayat name"),
    field("location.village", Text, "village name"),
    field("timeline.proposal_date", Date, "when the project was proposed"),
    field("timeline.approval_date", Date, "when the project was approved"),
    field("timeline.tender_publication_date", Date, "tender published date"),
    field("timeline.work_commencement_date", Date, "work started date"),
    field("timeline.scheduled_completion_date", Date, "planned completion"),
    field("timeline.actual_completion_date", Date, "actual completion"),
    field("contractor.company_name", Text, "contractor company"),
    field("contractor.registration_number", Text, "contractor registration"),
    field(
        "contractor.contractor_class",
        FieldKind::Enum(CONTRACTOR_CLASSES),
        "contractor grade",
    ),
    field("contractor.contact_person", Text, "contact person name"),
    field("contractor.contact_details.phone", Text, "contractor phone"),
    field("contractor.contact_details.email", Text, "contractor email"),
    field("contractor.contact_details.address", Text, "contractor address"),
    field("beneficiaries.direct_beneficiaries", Number, "direct beneficiary count"),
    field("beneficiaries.indirect_beneficiaries", Number, "indirect beneficiary count"),
    field("beneficiaries.beneficiary_categories", TextList, "beneficiary types"),
    field("created_at", Date, "document creation date"),
    field("updated_at", Date, "last modification date"),
    field("created_by", Text, "created by user"),
    field("last_modified_by", Text, "last modified by user"),
];

static FIELD_INDEX: Lazy<HashMap<&'static str, FieldSpec>> =
    Lazy::new(|| PROJECT_FIELDS.iter().map(|f| (f.path, *f)).collect());

/// Read-only view over the project fields.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDescriptor {
    fields: &'static [FieldSpec],
}

impl SchemaDescriptor {
    pub fn projects() -> Self {
        Self {
            fields: PROJECT_FIELDS,
        }
    }

    pub fn collection(&self) -> &'static str {
        COLLECTION_NAME
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, path: &str) -> Option<&'static FieldSpec> {
        FIELD_INDEX.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        FIELD_INDEX.contains_key(path)
    }

    /// Human-readable field listing used in prompts.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Collection Name: {}", self.collection());
        let _ = writeln!(out);
        let _ = writeln!(out, "Schema Fields:");
        for field_spec in self.fields {
            match field_spec.kind {
                FieldKind::Enum(values) => {
                    let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
                    let _ = writeln!(
                        out,
                        "- {}: {}, values: [{}]",
                        field_spec.path,
                        field_spec.kind.type_name(),
                        quoted.join(", ")
                    );
                }
                _ => {
                    let _ = writeln!(
                        out,
                        "- {}: {}, {}",
                        field_spec.path,
                        field_spec.kind.type_name(),
                        field_spec.description
                    );
                }
            }
        }
        out
    }
}
