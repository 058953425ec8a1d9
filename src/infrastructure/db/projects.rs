//! Project record lookup.
//!
//! `SqliteProjectStore` keeps each project as a JSON document and compiles
//! a `FilterExpr` into a parameterized `WHERE` clause over `json_extract`
//! paths. Values are always bound, never concatenated; field paths are
//! checked against the schema before they reach SQL.

use crate::domain::error::{AppError, Result};
use crate::domain::filter::{Condition, FilterExpr, Predicate, Scalar};
use crate::domain::project::Project;
use crate::domain::schema::{FieldKind, SchemaDescriptor};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use std::sync::Mutex;
use tracing::{debug, info};

const NO_MATCH_MESSAGE: &str = "No project found matching the query criteria";
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// The handful of fields shown when browsing projects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectListing {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub scheme_name: Option<String>,
    pub status: Option<String>,
    pub allocated_budget: Option<f64>,
    pub sector: Option<String>,
}

impl From<Project> for ProjectListing {
    fn from(project: Project) -> Self {
        Self {
            project_id: project.project_id,
            project_name: project.project_name,
            scheme_name: project.scheme_name,
            status: project.status,
            allocated_budget: project.allocated_budget,
            sector: project.sector,
        }
    }
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// First project matching `filter` in the store's native order.
    async fn find_first(&self, filter: &FilterExpr) -> Result<Project>;

    async fn find_all(&self, filter: &FilterExpr) -> Result<Vec<Project>>;

    /// One page of `filter` matches in native order.
    async fn find_page(&self, filter: &FilterExpr, offset: u32, limit: u32) -> Result<Vec<Project>>;

    /// Dates are stored in canonical form; an existing `project_id` is replaced.
    async fn insert(&self, project: &Project) -> Result<()>;

    /// Browse projects, optionally restricted to one sector (exact match).
    async fn list(&self, sector: Option<&str>, offset: u32, limit: u32) -> Result<Vec<ProjectListing>> {
        let filter = match sector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sector) => FilterExpr::leaf("sector", Condition::Equals(Scalar::Text(sector.to_string()))),
            None => FilterExpr::match_all(),
        };
        Ok(self
            .find_page(&filter, offset, limit)
            .await?
            .into_iter()
            .map(ProjectListing::from)
            .collect())
    }

    async fn find_by_id(&self, project_id: &str) -> Result<Project> {
        let filter = FilterExpr::leaf(
            "project_id",
            Condition::Equals(Scalar::Text(project_id.trim().to_string())),
        );
        match self.find_first(&filter).await {
            Err(AppError::NoMatch(_)) => Err(AppError::NotFound(format!("Project {} not found", project_id))),
            other => other,
        }
    }
}

/// Bound parameter for a compiled filter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Number(f64),
    Integer(i64),
}

impl From<&Scalar> for SqlParam {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Text(s) => SqlParam::Text(s.clone()),
            Scalar::Number(n) => SqlParam::Number(*n),
            // json_extract yields 1/0 for JSON booleans
            Scalar::Bool(b) => SqlParam::Integer(i64::from(*b)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub where_clause: String,
    pub params: Vec<SqlParam>,
}

/// Compiles filter expressions into SQLite `WHERE` clauses.
pub struct FilterCompiler {
    schema: SchemaDescriptor,
    document_column: &'static str,
}

impl FilterCompiler {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema,
            document_column: "document",
        }
    }

    pub fn compile(&self, filter: &FilterExpr) -> Result<CompiledFilter> {
        let mut params = Vec::new();
        let where_clause = self.compile_expr(filter, &mut params)?;
        Ok(CompiledFilter {
            where_clause,
            params,
        })
    }

    fn compile_expr(&self, expr: &FilterExpr, params: &mut Vec<SqlParam>) -> Result<String> {
        match expr {
            FilterExpr::And(children) if children.is_empty() => Ok("1 = 1".to_string()),
            FilterExpr::Or(children) if children.is_empty() => Ok("1 = 0".to_string()),
            FilterExpr::And(children) => self.join(children, " AND ", params),
            FilterExpr::Or(children) => self.join(children, " OR ", params),
            FilterExpr::Leaf(predicate) => self.compile_predicate(predicate, params),
        }
    }

    fn join(&self, children: &[FilterExpr], sep: &str, params: &mut Vec<SqlParam>) -> Result<String> {
        let parts = children
            .iter()
            .map(|child| self.compile_expr(child, params))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", parts.join(sep)))
    }

    fn compile_predicate(&self, predicate: &Predicate, params: &mut Vec<SqlParam>) -> Result<String> {
        let field_spec = self
            .schema
            .field(&predicate.field)
            .ok_or_else(|| AppError::UnknownField(predicate.field.clone()))?;
        if !is_valid_path(field_spec.path) {
            return Err(AppError::SecurityError(format!(
                "Refusing to compile field path: {}",
                field_spec.path
            )));
        }
        let json_path = format!("'$.{}'", field_spec.path);

        if field_spec.kind == FieldKind::TextList {
            let condition = self.compile_condition("value", &predicate.condition, params);
            return Ok(format!(
                "EXISTS (SELECT 1 FROM json_each({}, {}) WHERE {})",
                self.document_column, json_path, condition
            ));
        }

        let target = format!("json_extract({}, {})", self.document_column, json_path);
        Ok(self.compile_condition(&target, &predicate.condition, params))
    }

    fn compile_condition(&self, target: &str, condition: &Condition, params: &mut Vec<SqlParam>) -> String {
        match condition {
            Condition::Equals(value) => {
                params.push(SqlParam::from(value));
                format!("{} = ?", target)
            }
            Condition::OneOf(values) if values.is_empty() => "1 = 0".to_string(),
            Condition::OneOf(values) => {
                params.extend(values.iter().map(SqlParam::from));
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("{} IN ({})", target, placeholders)
            }
            Condition::Contains(needle) => {
                params.push(SqlParam::Text(format!("%{}%", escape_like(&needle.to_lowercase()))));
                format!("lower({}) LIKE ? ESCAPE '\\'", target)
            }
            Condition::Compare { op, value } => {
                params.push(SqlParam::from(value));
                format!("{} {} ?", target, op.sql())
            }
        }
    }
}

/// Dotted lowercase identifiers only.
fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn decode_document(raw: &str) -> Result<Project> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::DatabaseError(format!("Stored project is not valid JSON: {}", e)))
}

pub struct SqliteProjectStore {
    pool: SqlitePool,
    compiler: FilterCompiler,
}

impl SqliteProjectStore {
    pub async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT UNIQUE,
                document TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create projects table: {}", e)))?;

        Ok(Self {
            pool,
            compiler: FilterCompiler::new(SchemaDescriptor::projects()),
        })
    }

    async fn fetch_documents(&self, filter: &FilterExpr, page: Option<(i64, i64)>) -> Result<Vec<String>> {
        let compiled = self.compiler.compile(filter)?;
        let mut sql = format!(
            "SELECT document FROM projects WHERE {} ORDER BY id",
            compiled.where_clause
        );
        if page.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }
        debug!(sql = %sql, params = compiled.params.len(), "Compiled project lookup");

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for param in compiled.params {
            query = match param {
                SqlParam::Text(s) => query.bind(s),
                SqlParam::Number(n) => query.bind(n),
                SqlParam::Integer(i) => query.bind(i),
            };
        }
        if let Some((offset, limit)) = page {
            query = query.bind(limit).bind(offset);
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to query projects: {}", e)))
    }
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn find_first(&self, filter: &FilterExpr) -> Result<Project> {
        let documents = self.fetch_documents(filter, Some((0, 1))).await?;
        let raw = documents
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NoMatch(NO_MATCH_MESSAGE.to_string()))?;
        decode_document(&raw)
    }

    async fn find_all(&self, filter: &FilterExpr) -> Result<Vec<Project>> {
        self.fetch_documents(filter, None)
            .await?
            .iter()
            .map(|raw| decode_document(raw))
            .collect()
    }

    async fn find_page(&self, filter: &FilterExpr, offset: u32, limit: u32) -> Result<Vec<Project>> {
        self.fetch_documents(filter, Some((i64::from(offset), i64::from(limit))))
            .await?
            .iter()
            .map(|raw| decode_document(raw))
            .collect()
    }

    async fn insert(&self, project: &Project) -> Result<()> {
        let document = serde_json::to_string(&project.clone().with_canonical_dates())
            .map_err(|e| AppError::Internal(format!("Failed to encode project: {}", e)))?;

        sqlx::query(
            "INSERT INTO projects (project_id, document) VALUES (?, ?)
             ON CONFLICT(project_id) DO UPDATE SET document = excluded.document",
        )
        .bind(&project.project_id)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to save project: {}", e)))?;

        info!(project_id = ?project.project_id, "Project stored");
        Ok(())
    }
}

/// Evaluates filters directly against JSON documents, in insertion order.
#[derive(Default)]
pub struct InMemoryProjectStore {
    documents: Mutex<Vec<Value>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: Vec<Project>) -> Result<Self> {
        let documents = projects
            .into_iter()
            .map(|project| serde_json::to_value(project.with_canonical_dates()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to encode project: {}", e)))?;
        Ok(Self {
            documents: Mutex::new(documents),
        })
    }

    fn matching(&self, filter: &FilterExpr) -> Result<Vec<Value>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| AppError::Internal("Project store lock poisoned".to_string()))?;
        Ok(documents.iter().filter(|d| filter.matches(d)).cloned().collect())
    }
}

fn from_value(document: Value) -> Result<Project> {
    serde_json::from_value(document)
        .map_err(|e| AppError::DatabaseError(format!("Stored project is malformed: {}", e)))
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn find_first(&self, filter: &FilterExpr) -> Result<Project> {
        let document = self
            .matching(filter)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NoMatch(NO_MATCH_MESSAGE.to_string()))?;
        from_value(document)
    }

    async fn find_all(&self, filter: &FilterExpr) -> Result<Vec<Project>> {
        self.matching(filter)?.into_iter().map(from_value).collect()
    }

    async fn find_page(&self, filter: &FilterExpr, offset: u32, limit: u32) -> Result<Vec<Project>> {
        self.matching(filter)?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(from_value)
            .collect()
    }

    async fn insert(&self, project: &Project) -> Result<()> {
        let document = serde_json::to_value(project.clone().with_canonical_dates())
            .map_err(|e| AppError::Internal(format!("Failed to encode project: {}", e)))?;
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| AppError::Internal("Project store lock poisoned".to_string()))?;
        let existing = project.project_id.as_deref().and_then(|id| {
            documents
                .iter()
                .position(|doc| doc.get("project_id").and_then(Value::as_str) == Some(id))
        });
        match existing {
            Some(idx) => documents[idx] = document,
            None => documents.push(document),
        }
        Ok(())
    }
}
