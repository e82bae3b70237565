//! Schema Context Store
//!
//! Holds the tenant's table/column catalog, human descriptions, foreign-key
//! relationships and concept-to-table join hints. Loaded once, read-only
//! afterwards; `reload` rebuilds the whole context, never patches in place.

use crate::error::{QueryGptError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub is_primary: bool,
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

/// Foreign-key style relationship between two concrete columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Generic "these columns usually join to that table" hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnToTableMapping {
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Column descriptions are authored either as a bare string or as an object
/// with an example value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnDescription {
    Text(String),
    Detailed {
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        example: Option<String>,
    },
}

impl ColumnDescription {
    pub fn description(&self) -> &str {
        match self {
            ColumnDescription::Text(s) => s,
            ColumnDescription::Detailed { description, .. } => description,
        }
    }

    pub fn example(&self) -> Option<&str> {
        match self {
            ColumnDescription::Text(_) => None,
            ColumnDescription::Detailed { example, .. } => example.as_deref(),
        }
    }
}

/// On-disk metadata file: descriptions, relationships, join hints, tenants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    #[serde(default)]
    pub table_descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub column_descriptions: BTreeMap<String, BTreeMap<String, ColumnDescription>>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub column_to_table_mappings: Vec<ColumnToTableMapping>,
    #[serde(default = "default_tenants")]
    pub tenants: Vec<String>,
}

pub fn default_tenants() -> Vec<String> {
    vec!["default".to_string()]
}

/// Fully loaded, immutable schema context.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub table_descriptions: BTreeMap<String, String>,
    pub column_descriptions: BTreeMap<String, BTreeMap<String, ColumnDescription>>,
    pub schema: Vec<TableSchema>,
    pub relationships: Vec<Relationship>,
    pub column_to_table_mappings: Vec<ColumnToTableMapping>,
    pub tenants: Vec<String>,
}

impl SchemaContext {
    /// Case-insensitive table lookup returning the stored schema entry.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.schema
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_description(&self, name: &str) -> Option<&str> {
        self.table_descriptions
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn column_description(&self, table: &str, column: &str) -> Option<&ColumnDescription> {
        self.column_descriptions
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(table))
            .and_then(|(_, cols)| {
                cols.iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(column))
                    .map(|(_, d)| d)
            })
    }
}

/// Explicitly owned schema store with a documented "not yet loaded" state.
/// Readers go through `context()` and get `SchemaNotLoaded` before the first
/// successful load instead of observing a half-populated global.
#[derive(Debug, Default)]
pub struct SchemaStore {
    context: Option<SchemaContext>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self { context: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Result<&SchemaContext> {
        self.context.as_ref().ok_or(QueryGptError::SchemaNotLoaded)
    }

    /// Build and install a fresh context from raw inputs. Replaces any
    /// previously loaded context wholesale.
    pub fn load(&mut self, schema_csv: &str, metadata: SchemaMetadata) -> Result<()> {
        let schema = parse_csv_schema(schema_csv)?;
        if schema.is_empty() {
            return Err(QueryGptError::Schema(
                "no tables found in schema CSV".to_string(),
            ));
        }
        self.context = Some(SchemaContext {
            table_descriptions: metadata.table_descriptions,
            column_descriptions: metadata.column_descriptions,
            schema,
            relationships: metadata.relationships,
            column_to_table_mappings: metadata.column_to_table_mappings,
            tenants: metadata.tenants,
        });
        Ok(())
    }

    pub fn load_from_files(&mut self, schema_csv: &Path, metadata: &Path) -> Result<()> {
        let csv_text = fs::read_to_string(schema_csv)?;
        let metadata_text = fs::read_to_string(metadata)?;
        let metadata: SchemaMetadata = serde_json::from_str(&metadata_text)?;
        self.load(&csv_text, metadata)
    }

    /// Rebuild the context from the same files. Alias for `load_from_files`;
    /// the previous context stays visible until the new one parses.
    pub fn reload(&mut self, schema_csv: &Path, metadata: &Path) -> Result<()> {
        self.load_from_files(schema_csv, metadata)
    }
}

/// Strip zero-width characters and stray whitespace that leak into exported
/// schema dumps.
fn clean_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{2060}' && *c != '\u{200B}')
        .collect()
}

/// Parse a `table,column,type,nullable,key,default` CSV export into sorted
/// table schemas. Backup tables are skipped, duplicate columns dropped,
/// fields sorted primary-key-first then alphabetical, tables alphabetical.
pub fn parse_csv_schema(csv_text: &str) -> Result<Vec<TableSchema>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut table_map: BTreeMap<String, Vec<Field>> = BTreeMap::new();

    for record in reader.records() {
        let record = record?;
        if record.len() < 4 {
            continue;
        }

        let table_name = clean_identifier(record.get(0).unwrap_or(""));
        let column_name = clean_identifier(record.get(1).unwrap_or(""));
        if table_name.is_empty() || column_name.is_empty() {
            continue;
        }
        // Backup tables just add noise to the catalog
        if table_name.contains("_bkp_") || table_name.contains("_backup") {
            continue;
        }

        let data_type = record.get(2).unwrap_or("").trim();
        let is_nullable = record.get(3).unwrap_or("").trim();
        let column_key = record.get(4).unwrap_or("").trim();
        let default_value = record
            .get(5)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        let fields = table_map.entry(table_name).or_default();
        if fields.iter().any(|f| f.name == column_name) {
            continue;
        }
        fields.push(Field {
            name: column_name,
            data_type: if data_type.is_empty() {
                "varchar".to_string()
            } else {
                data_type.to_string()
            },
            is_primary: column_key == "PRI",
            is_nullable: is_nullable != "NO",
            default_value,
        });
    }

    let mut tables: Vec<TableSchema> = table_map
        .into_iter()
        .map(|(name, mut fields)| {
            fields.sort_by(|a, b| {
                b.is_primary
                    .cmp(&a.is_primary)
                    .then_with(|| a.name.cmp(&b.name))
            });
            TableSchema { name, fields }
        })
        .collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tables)
}
