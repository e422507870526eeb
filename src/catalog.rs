//! Schema Catalog
//!
//! The allowlist of tables/views a generated query may touch. A loaded
//! catalog is an immutable [`CatalogSnapshot`]; refreshing builds a new
//! snapshot and swaps it in, so readers never see a half-updated catalog.

use crate::error::{NlSqlError, Result};
use itertools::Itertools;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Table,
    View,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Table => "table",
            ObjectType::View => "view",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub schema: String,
    pub name: String,
    pub object_type: ObjectType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl CatalogEntry {
    /// Identity key: (schema, name, type).
    pub fn key(&self) -> (&str, &str, ObjectType) {
        (&self.schema, &self.name, self.object_type)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Text used when embedding this entry for similarity search.
    pub fn embedding_text(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{}: {}", c.name, c.description))
            .join("; ");
        format!(
            "{} {}\nDescription: {}\nColumns: {}",
            self.object_type.as_str().to_uppercase(),
            self.qualified_name(),
            self.description,
            columns
        )
    }
}

/// On-disk metadata document.
#[derive(Debug, Clone, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    dialect: Option<String>,
    #[serde(default, alias = "defaultschema")]
    default_schema: Option<String>,
    #[serde(default)]
    tables: Vec<ObjectDocument>,
    #[serde(default)]
    views: Vec<ObjectDocument>,
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectDocument {
    #[serde(default)]
    schema: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    columns: Vec<Column>,
}

/// Immutable view of the catalog at one point in time.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    dialect: String,
    default_schema: String,
    entries: Vec<CatalogEntry>,
    allowed_objects: HashSet<String>,
    allowed_columns: HashSet<String>,
    schema_text: String,
}

impl CatalogSnapshot {
    pub fn new(dialect: impl Into<String>, default_schema: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        let allowed_objects = entries
            .iter()
            .map(|e| e.qualified_name().to_lowercase())
            .collect();
        let allowed_columns = entries
            .iter()
            .flat_map(|e| e.columns.iter().map(|c| c.name.to_lowercase()))
            .collect();
        let schema_text = render_schema_text(&entries);

        Self {
            dialect: dialect.into(),
            default_schema: default_schema.into(),
            entries,
            allowed_objects,
            allowed_columns,
            schema_text,
        }
    }

    /// Parse a metadata JSON document. Tables are listed before views.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)
            .map_err(|e| NlSqlError::Catalog(format!("Failed to parse metadata: {}", e)))?;

        let dialect = doc.dialect.unwrap_or_else(|| "postgresql".to_string());
        let default_schema = doc.default_schema.unwrap_or_else(|| "public".to_string());

        let mut entries = Vec::with_capacity(doc.tables.len() + doc.views.len());
        for (objects, object_type) in [(doc.tables, ObjectType::Table), (doc.views, ObjectType::View)] {
            for obj in objects {
                entries.push(CatalogEntry {
                    schema: obj.schema.unwrap_or_else(|| default_schema.clone()),
                    name: obj.name,
                    object_type,
                    description: obj.description,
                    columns: obj.columns,
                });
            }
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.key()) {
                return Err(NlSqlError::Catalog(format!(
                    "Duplicate {} '{}' in metadata",
                    entry.object_type,
                    entry.qualified_name()
                )));
            }
        }

        Ok(Self::new(dialect, default_schema, entries))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            NlSqlError::Catalog(format!("Failed to read metadata {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn views(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.object_type == ObjectType::View)
    }

    /// Lower-cased `schema.name` of every allowed object.
    pub fn allowed_objects(&self) -> &HashSet<String> {
        &self.allowed_objects
    }

    /// Lower-cased column names across all allowed objects.
    pub fn allowed_columns(&self) -> &HashSet<String> {
        &self.allowed_columns
    }

    /// Allowed objects in catalog order, for prompts and error messages.
    pub fn allowed_object_list(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.qualified_name().to_lowercase())
            .collect()
    }

    pub fn schema_text(&self) -> &str {
        &self.schema_text
    }
}

fn render_schema_text(entries: &[CatalogEntry]) -> String {
    let mut lines = Vec::new();
    for entry in entries {
        let label = match entry.object_type {
            ObjectType::Table => "Table",
            ObjectType::View => "View",
        };
        lines.push(format!("{}: {}", label, entry.qualified_name()));
        if !entry.description.is_empty() {
            lines.push(format!("  Description: {}", entry.description));
        }
        lines.push("  Columns:".to_string());
        for column in &entry.columns {
            lines.push(format!(
                "    - {} ({}) - {}",
                column.name, column.data_type, column.description
            ));
        }
        lines.push(String::new());
    }
    lines.join("\n").trim().to_string()
}

/// Process-wide holder of the current catalog snapshot.
pub struct SchemaCatalog {
    source: Option<PathBuf>,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl SchemaCatalog {
    /// Load the catalog from a metadata file; `refresh` re-reads the same file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = CatalogSnapshot::load(&path)?;
        info!(
            "Loaded catalog from {} ({} objects)",
            path.display(),
            snapshot.entries().len()
        );
        Ok(Self {
            source: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Catalog with a fixed snapshot and no backing file.
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&*self.current.read())
    }

    /// Swap in a new snapshot. In-flight readers keep the one they hold.
    pub fn replace(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Arc::clone(&snapshot);
        snapshot
    }

    /// Re-read the backing file. On failure the current snapshot stays in place.
    pub fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| NlSqlError::Catalog("Catalog has no backing metadata file".to_string()))?;
        let snapshot = CatalogSnapshot::load(path)?;
        info!(
            "Refreshed catalog from {} ({} objects)",
            path.display(),
            snapshot.entries().len()
        );
        Ok(self.replace(snapshot))
    }
}
