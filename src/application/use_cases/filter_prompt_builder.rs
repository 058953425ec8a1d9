//! Filter prompt builder
//!
//! Produces the single prompt that asks the model to turn a citizen's
//! question into a document filter over the `projects` collection.

use crate::domain::schema::SchemaDescriptor;
use std::fmt::Write;

/// Bumped whenever the instructions or example table change.
pub const PROMPT_VERSION: &str = "filter-v1";
/// Fewest worked examples a prompt may carry.
pub const MIN_EXAMPLES: usize = 3;

/// A question paired with the exact filter text the model should emit.
#[derive(Debug, Clone, Copy)]
pub struct FilterExample {
    pub question: &'static str,
    pub filter: &'static str,
}

pub const FILTER_EXAMPLES: &[FilterExample] = &[
    FilterExample {
        question: "school renovation project in kothamangalam",
        filter: r#"{"$and":[{"$or":[{"project_name":{"$regex":"school","$options":"i"}},{"project_description":{"$regex":"school","$options":"i"}}]},{"project_type":"Renovation"},{"$or":[{"location.district":{"$regex":"kothamangalam","$options":"i"}},{"location.block":{"$regex":"kothamangalam","$options":"i"}},{"location.panchayat":{"$regex":"kothamangalam","$options":"i"}}]}]}"#,
    },
    FilterExample {
        question: "projects with budget over 10 lakhs",
        filter: r#"{"allocated_budget":{"$gte":1000000}}"#,
    },
    FilterExample {
        question: "ongoing projects in ernakulam district",
        filter: r#"{"$and":[{"status":"Ongoing"},{"location.district":{"$regex":"ernakulam","$options":"i"}}]}"#,
    },
    FilterExample {
        question: "agriculture rehabilitation work in wayanad",
        filter: r#"{"$and":[{"$or":[{"project_name":{"$regex":"agriculture","$options":"i"}},{"project_description":{"$regex":"agriculture","$options":"i"}},{"sector":"Agriculture and Allied Services"}]},{"project_type":"Renovation"},{"$or":[{"location.district":{"$regex":"wayanad","$options":"i"}},{"location.block":{"$regex":"wayanad","$options":"i"}},{"location.panchayat":{"$regex":"wayanad","$options":"i"}}]}]}"#,
    },
];

/// Everyday words that map onto one enum value.
#[derive(Debug, Clone, Copy)]
pub struct TermMapping {
    pub terms: &'static [&'static str],
    pub value: &'static str,
}

pub const PROJECT_TYPE_TERMS: &[TermMapping] = &[
    TermMapping {
        terms: &["renovation", "repair", "rehabilitation", "refurbishment"],
        value: "Renovation",
    },
    TermMapping {
        terms: &["construction", "building", "new"],
        value: "New Construction",
    },
    TermMapping {
        terms: &["maintenance", "upkeep"],
        value: "Maintenance",
    },
    TermMapping {
        terms: &["supply", "procurement"],
        value: "Supply",
    },
    TermMapping {
        terms: &["services", "consulting"],
        value: "Services",
    },
];

pub const SECTOR_TERMS: &[TermMapping] = &[
    TermMapping {
        terms: &["agriculture", "farming", "crop", "spice", "plantation"],
        value: "Agriculture and Allied Services",
    },
    TermMapping {
        terms: &["rural", "village"],
        value: "Rural Development",
    },
    TermMapping {
        terms: &["irrigation", "water", "flood"],
        value: "Irrigation and Flood Control",
    },
    TermMapping {
        terms: &["road", "transport", "bridge"],
        value: "Transport and Communications",
    },
    TermMapping {
        terms: &["school", "hospital", "community"],
        value: "Social and Community Services",
    },
];

pub const LAKH: f64 = 100_000.0;
pub const CRORE: f64 = 10_000_000.0;

/// Filter prompt builder
pub struct FilterPromptBuilder {
    schema: SchemaDescriptor,
    max_examples: usize,
}

impl FilterPromptBuilder {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema,
            max_examples: FILTER_EXAMPLES.len(),
        }
    }

    /// Limit the worked examples, never below `MIN_EXAMPLES`.
    pub fn with_max_examples(mut self, max_examples: usize) -> Self {
        self.max_examples = max_examples.clamp(MIN_EXAMPLES, FILTER_EXAMPLES.len());
        self
    }

    pub fn version(&self) -> &'static str {
        PROMPT_VERSION
    }

    /// Build the filter-generation prompt. The question is always the last thing in it.
    pub fn build_prompt(&self, question: &str) -> String {
        let mut prompt = String::new();

        let _ = writeln!(
            prompt,
            "You are a document query generator. Convert the natural language question below into a JSON filter object for the \"{}\" collection.",
            self.schema.collection()
        );
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "DATABASE SCHEMA INFORMATION:");
        prompt.push_str(&self.schema.describe());
        let _ = writeln!(prompt);

        self.add_instructions(&mut prompt);
        self.add_examples(&mut prompt);

        let _ = writeln!(
            prompt,
            "Return ONLY the filter object as valid JSON. No explanations, no markdown, no additional text."
        );
        let _ = writeln!(prompt);
        let _ = write!(prompt, "Now generate the filter for: \"{}\"", question.trim());

        prompt
    }

    fn add_instructions(&self, prompt: &mut String) {
        let _ = writeln!(prompt, "INSTRUCTIONS:");
        let _ = writeln!(prompt, "1. Use only the field paths listed in the schema above");
        let _ = writeln!(
            prompt,
            "2. For text searches use a case-insensitive pattern: {{\"$regex\": \"search_term\", \"$options\": \"i\"}}"
        );
        let _ = writeln!(
            prompt,
            "3. For location queries search location.district, location.block, location.panchayat or location.village"
        );
        let _ = writeln!(
            prompt,
            "4. For project names search both project_name and project_description"
        );
        let _ = writeln!(
            prompt,
            "5. For money use number comparisons (1 lakh = {}, 1 crore = {})",
            LAKH as u64, CRORE as u64
        );
        let _ = writeln!(prompt, "6. For status use an exact value from the listed values");
        let _ = writeln!(
            prompt,
            "7. For dates use $gte / $lte with ISO-8601 date strings (YYYY-MM-DD)"
        );
        let _ = writeln!(prompt, "8. Combine conditions with $and / $or arrays");
        let _ = writeln!(prompt, "9. Map common terms to project_type:");
        write_mappings(prompt, PROJECT_TYPE_TERMS);
        let _ = writeln!(prompt, "10. Map sectors:");
        write_mappings(prompt, SECTOR_TERMS);
        let _ = writeln!(prompt, "11. Include every relevant condition from the question");
        let _ = writeln!(prompt);
    }

    fn add_examples(&self, prompt: &mut String) {
        let _ = writeln!(prompt, "CORRECT EXAMPLES:");
        let _ = writeln!(prompt);
        for example in FILTER_EXAMPLES.iter().take(self.max_examples) {
            let _ = writeln!(prompt, "Question: \"{}\"", example.question);
            let _ = writeln!(prompt, "Output: {}", example.filter);
            let _ = writeln!(prompt);
        }
    }
}

fn write_mappings(prompt: &mut String, mappings: &[TermMapping]) {
    for mapping in mappings {
        let quoted: Vec<String> = mapping.terms.iter().map(|t| format!("\"{}\"", t)).collect();
        let _ = writeln!(prompt, "   - {} -> \"{}\"", quoted.join(", "), mapping.value);
    }
}

impl Default for FilterPromptBuilder {
    fn default() -> Self {
        Self::new(SchemaDescriptor::projects())
    }
}
