//! Prompt Compiler
//!
//! Renders the bounded session-opening instruction (schema, joins, concept
//! hints, optional ticket context, output rules) and the lighter per-turn
//! user message. The instruction is compiled once per session; follow-up
//! turns send only the bare question.

use crate::jira::TicketContext;
use crate::schema::SchemaContext;

const ASSISTANT_RULES: &str = r#"You are QueryGPT. QueryGPT ONLY helps with SQL query generation, optimization, and database-related questions.
Rules:
- When the user asks something NOT related to SQL (math, general knowledge, other topics), reply briefly: "QueryGPT only supports SQL query generation and optimization." Do not use "I"; always refer to yourself as QueryGPT.
- Generate queries ONLY against the tables and columns listed in the SCHEMA section below. Never invent tables or columns."#;

const OUTPUT_FORMAT_RULES: &str = r#"RESPONSE FORMAT - when the user asks for a SQL query, reply ONLY in this exact format with no other text, markdown, or headers:
sql query: <your SQL here>
explanation: <brief explanation of what the query does>
suggested indexes: <one CREATE INDEX suggestion per line, or None>
Do not include any fourth field or extra content.
Use named placeholders of the form ${paramName} for every runtime-supplied filter value instead of hard-coding it.
Only suggest indexes on columns that appear in the SCHEMA section."#;

/// Static, tenant-independent glossary biasing the model toward the
/// canonical tables and join columns for common ambiguous business terms.
pub const CONCEPT_HINTS: &str = r#"BUSINESS CONCEPTS (canonical tables and join columns for common terms):
- user: ck_user, joined via user_id = ck_user.id
- outlet: ck_outlet_details, joined via outlet_id = ck_outlet_details.outlet_id; when asked for an outlet "name", select outlet_name, not outlet_code
- product: ck_product_master, joined via product_id = ck_product_master.product_id; prefer product_name over product_code when the user asks for a "name"
- location: ck_location_hierarchy, joined via location_id = ck_location_hierarchy.location_id
- order: ck_orders, keyed by order_id; reaches outlets via outlet_id and users via user_id
- sale: ck_sales_invoice, keyed by invoice_id; reaches outlets via outlet_id
- loadout: ck_loadout, keyed by loadout_id; reaches users via user_id and products via product_id"#;

/// Build the session-opening instruction for the caller-selected tables.
/// Tables and columns outside the selection never appear; joins are emitted
/// only when both endpoints are selected.
pub fn build_instruction(
    selected_tables: &[String],
    ctx: &SchemaContext,
    ticket: Option<&TicketContext>,
) -> String {
    let mut out = String::new();
    out.push_str(ASSISTANT_RULES);
    out.push_str("\n\n");

    out.push_str("SCHEMA (use ONLY these tables and columns):\n");
    for name in selected_tables {
        let table = match ctx.table(name) {
            Some(t) => t,
            None => continue,
        };
        out.push_str(&format!("\nTable: {}\n", table.name));
        if let Some(desc) = ctx.table_description(&table.name) {
            out.push_str(&format!("Description: {}\n", desc));
        }
        out.push_str("Columns:\n");
        for field in &table.fields {
            let mut line = format!("  - {} ({}", field.name, field.data_type);
            if field.is_primary {
                line.push_str(", PRI");
            }
            line.push(')');
            if let Some(desc) = ctx.column_description(&table.name, &field.name) {
                line.push_str(&format!(" - {}", desc.description()));
                if let Some(example) = desc.example() {
                    line.push_str(&format!(" [Example: {}]", example));
                }
            }
            line.push('\n');
            out.push_str(&line);
        }
    }

    let joins = joins_block(selected_tables, ctx);
    if !joins.is_empty() {
        out.push_str("\nJOINS (relationships between the tables above):\n");
        out.push_str(&joins);
    }

    let hints = column_hints_block(selected_tables, ctx);
    if !hints.is_empty() {
        out.push_str("\nCOLUMN JOIN HINTS:\n");
        out.push_str(&hints);
    }

    out.push('\n');
    out.push_str(CONCEPT_HINTS);
    out.push('\n');

    if let Some(ticket) = ticket {
        out.push('\n');
        out.push_str(&ticket_block(ticket));
    }

    out.push('\n');
    out.push_str(OUTPUT_FORMAT_RULES);
    out
}

/// Per-turn user message. Follow-up turns carry only this, never the
/// instruction.
pub fn build_turn_message(question: &str, tenant: &str) -> String {
    format!("User (tenant: {}): {}", tenant, question)
}

fn selected(selected_tables: &[String], name: &str) -> bool {
    selected_tables.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// Relationships where BOTH endpoints are in the selected set. The filter is
/// symmetric, not a one-sided lookup.
fn joins_block(selected_tables: &[String], ctx: &SchemaContext) -> String {
    let mut out = String::new();
    for rel in &ctx.relationships {
        if !selected(selected_tables, &rel.from_table) || !selected(selected_tables, &rel.to_table)
        {
            continue;
        }
        out.push_str(&format!(
            "  - {}.{} = {}.{}",
            rel.from_table, rel.from_column, rel.to_table, rel.to_column
        ));
        if let Some(desc) = &rel.description {
            out.push_str(&format!(" ({})", desc));
        }
        out.push('\n');
    }
    out
}

fn column_hints_block(selected_tables: &[String], ctx: &SchemaContext) -> String {
    let mut out = String::new();
    for mapping in &ctx.column_to_table_mappings {
        if !selected(selected_tables, &mapping.to_table) {
            continue;
        }
        out.push_str(&format!(
            "  - columns [{}] join to {}.{}",
            mapping.from_columns.join(", "),
            mapping.to_table,
            mapping.to_column
        ));
        if let Some(desc) = &mapping.description {
            out.push_str(&format!(" ({})", desc));
        }
        out.push('\n');
    }
    out
}

fn ticket_block(ticket: &TicketContext) -> String {
    let mut out = String::new();
    out.push_str("TICKET CONTEXT:\n");
    out.push_str(&format!("Key: {}\n", ticket.key));
    out.push_str(&format!("Summary: {}\n", ticket.summary));
    if let Some(status) = &ticket.status {
        out.push_str(&format!("Status: {}\n", status));
    }
    if let Some(project) = &ticket.project {
        out.push_str(&format!("Project: {}\n", project));
    }
    out.push_str(&format!("Description: {}\n", ticket.description));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        ColumnDescription, Field, Relationship, SchemaContext, TableSchema,
    };
    use std::collections::BTreeMap;

    fn field(name: &str, data_type: &str, primary: bool) -> Field {
        Field {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_primary: primary,
            is_nullable: !primary,
            default_value: None,
        }
    }

    fn fixture() -> SchemaContext {
        let mut table_descriptions = BTreeMap::new();
        table_descriptions.insert("ck_user".to_string(), "application users".to_string());
        table_descriptions.insert("ck_orders".to_string(), "order records".to_string());

        let mut user_cols = BTreeMap::new();
        user_cols.insert(
            "role".to_string(),
            ColumnDescription::Detailed {
                description: "user role".to_string(),
                example: Some("admin".to_string()),
            },
        );
        let mut column_descriptions = BTreeMap::new();
        column_descriptions.insert("ck_user".to_string(), user_cols);

        SchemaContext {
            table_descriptions,
            column_descriptions,
            schema: vec![
                TableSchema {
                    name: "ck_orders".to_string(),
                    fields: vec![
                        field("order_id", "bigint", true),
                        field("outlet_id", "bigint", false),
                        field("user_id", "bigint", false),
                    ],
                },
                TableSchema {
                    name: "ck_outlet_details".to_string(),
                    fields: vec![
                        field("outlet_id", "bigint", true),
                        field("outlet_name", "varchar", false),
                    ],
                },
                TableSchema {
                    name: "ck_user".to_string(),
                    fields: vec![
                        field("id", "bigint", true),
                        field("last_login", "datetime", false),
                        field("role", "varchar", false),
                        field("status", "varchar", false),
                    ],
                },
            ],
            relationships: vec![
                Relationship {
                    from_table: "ck_orders".to_string(),
                    from_column: "user_id".to_string(),
                    to_table: "ck_user".to_string(),
                    to_column: "id".to_string(),
                    description: Some("order placed by user".to_string()),
                },
                Relationship {
                    from_table: "ck_orders".to_string(),
                    from_column: "outlet_id".to_string(),
                    to_table: "ck_outlet_details".to_string(),
                    to_column: "outlet_id".to_string(),
                    description: None,
                },
            ],
            column_to_table_mappings: Vec::new(),
            tenants: vec!["default".to_string()],
        }
    }

    #[test]
    fn test_schema_block_restricted_to_selection() {
        let ctx = fixture();
        let instruction = build_instruction(&["ck_user".to_string()], &ctx, None);

        assert!(instruction.contains("Table: ck_user"));
        assert!(instruction.contains("- id (bigint, PRI)"));
        assert!(instruction.contains("- role (varchar) - user role [Example: admin]"));
        assert!(instruction.contains("- last_login (datetime)"));
        assert!(instruction.contains("- status (varchar)"));

        // Nothing outside the selection may leak in
        assert!(!instruction.contains("Table: ck_orders"));
        assert!(!instruction.contains("Table: ck_outlet_details"));
        assert!(!instruction.contains("outlet_name"));
    }

    #[test]
    fn test_joins_require_both_endpoints_selected() {
        let ctx = fixture();

        let one_sided = build_instruction(&["ck_orders".to_string()], &ctx, None);
        assert!(!one_sided.contains("ck_orders.user_id = ck_user.id"));

        let both = build_instruction(
            &["ck_orders".to_string(), "ck_user".to_string()],
            &ctx,
            None,
        );
        assert!(both.contains("ck_orders.user_id = ck_user.id (order placed by user)"));
        assert!(!both.contains("ck_outlet_details.outlet_id"));
    }

    #[test]
    fn test_output_directive_and_concept_hints_present() {
        let ctx = fixture();
        let instruction = build_instruction(&["ck_user".to_string()], &ctx, None);
        assert!(instruction.contains("sql query:"));
        assert!(instruction.contains("explanation:"));
        assert!(instruction.contains("suggested indexes:"));
        assert!(instruction.contains("${paramName}"));
        assert!(instruction.contains("BUSINESS CONCEPTS"));
        assert!(instruction.contains("outlet_name, not outlet_code"));
    }

    #[test]
    fn test_ticket_context_embedded_verbatim() {
        let ctx = fixture();
        let ticket = TicketContext {
            key: "CAV-1868".to_string(),
            summary: "Slow outlet report".to_string(),
            description: "Report times out for large tenants".to_string(),
            status: Some("Open".to_string()),
            project: None,
        };
        let instruction = build_instruction(&["ck_user".to_string()], &ctx, Some(&ticket));
        assert!(instruction.contains("TICKET CONTEXT:"));
        assert!(instruction.contains("Key: CAV-1868"));
        assert!(instruction.contains("Summary: Slow outlet report"));
        assert!(instruction.contains("Status: Open"));
        assert!(!instruction.contains("Project:"));
    }

    #[test]
    fn test_turn_message_carries_tenant_tag() {
        assert_eq!(
            build_turn_message("show active users", "lbpl"),
            "User (tenant: lbpl): show active users"
        );
    }
}
