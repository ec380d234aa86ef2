//! Prompt construction for SQL synthesis

use crate::context::NlpContext;
use crate::llm::ChatMessage;

/// Columns listed per table before eliding the rest
pub const MAX_PROMPT_COLUMNS: usize = 10;

pub const SYSTEM_PROMPT: &str = r#"You are a SQL assistant. Generate clean SQL queries using the provided table and column names.

**CRITICAL RULES:**
- Use ONLY the table names exactly as shown (e.g., if shown "DimCustomer", use "DimCustomer")
- Use ONLY the column names exactly as shown
- Do NOT add any schema prefixes like "dbo.", "sales.", etc.
- Write simple, standard SQL syntax
- When using GROUP BY, ensure ALL non-aggregate columns in SELECT are also in GROUP BY
- When selecting time periods, include the time columns (Year, Month, etc.) in both SELECT and GROUP BY

**Output Format:**
```sql
-- Your SQL query here
```

Generate only the SQL query in the code block above. No explanations needed."#;

pub const EXPLAIN_SYSTEM_PROMPT: &str =
    "You are a helpful database tutor who explains SQL queries in simple terms.";

pub const SUGGEST_SYSTEM_PROMPT: &str =
    "You are an expert SQL performance analyst and code reviewer.";

/// Last dotted segment of a qualified name
pub fn short_table_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Render the schema block listing tables by short name
pub fn schema_to_prompt(context: &NlpContext) -> String {
    let mut prompt = String::from("Available tables and columns:\n\n");

    for table in &context.tables {
        prompt.push_str(&format!("Table: {}\n", short_table_name(&table.name)));
        for column in table.columns.iter().take(MAX_PROMPT_COLUMNS) {
            prompt.push_str(&format!("  - {} ({})\n", column.name, column.data_type));
        }
        if table.columns.len() > MAX_PROMPT_COLUMNS {
            prompt.push_str(&format!(
                "  ... and {} more columns\n",
                table.columns.len() - MAX_PROMPT_COLUMNS
            ));
        }
        prompt.push('\n');
    }

    prompt
}

pub fn build_user_prompt(context: &NlpContext, question: &str) -> String {
    format!(
        "{}\nQuestion: {}\n\nGenerate SQL query using the tables above:",
        schema_to_prompt(context),
        question
    )
}

/// System and user messages for one synthesis request
pub fn build_messages(context: &NlpContext, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(context, question)),
    ]
}

fn context_block(context: Option<&str>) -> String {
    match context {
        Some(json) => format!("Database Context:\n{}\n\n", json),
        None => String::new(),
    }
}

/// Messages asking for a plain-language explanation of `sql`
///
/// `context` is the pretty-printed JSON of the database context, if any.
pub fn build_explain_messages(sql: &str, context: Option<&str>) -> Vec<ChatMessage> {
    let prompt = format!(
        r#"{}Explain this SQL query in simple, non-technical language:

{}

Please explain:
1. What data this query retrieves
2. How it processes the data
3. What the results will look like
4. Any important considerations

Keep the explanation clear and accessible to non-technical users."#,
        context_block(context),
        sql
    );
    vec![
        ChatMessage::system(EXPLAIN_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ]
}

/// Messages asking for review suggestions on `sql`
pub fn build_suggest_messages(sql: &str, context: &str) -> Vec<ChatMessage> {
    let prompt = format!(
        r#"Analyze this SQL query and suggest improvements:

{}SQL Query:
{}

Please provide:
1. Performance optimization suggestions
2. Code readability improvements
3. Potential issues or risks
4. Alternative approaches

Format as JSON:
{{
    "performance_suggestions": ["suggestion1", "suggestion2"],
    "readability_improvements": ["improvement1", "improvement2"],
    "potential_issues": ["issue1", "issue2"],
    "alternative_approaches": ["approach1", "approach2"],
    "overall_assessment": "assessment"
}}"#,
        context_block(Some(context)),
        sql
    );
    vec![
        ChatMessage::system(SUGGEST_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextColumn, ContextMode, ContextTable};
    use crate::llm::Role;

    fn column(name: &str) -> ContextColumn {
        ContextColumn {
            name: name.to_string(),
            data_type: "int".to_string(),
            semantic_type: None,
            description: String::new(),
            sample_values: None,
        }
    }

    fn context() -> NlpContext {
        NlpContext {
            database_id: 1,
            database_name: "erp".to_string(),
            engine_type: "mssql".to_string(),
            mode: ContextMode::Compact,
            tables: vec![
                ContextTable {
                    table_id: 1,
                    name: "dbo.FactSales".to_string(),
                    description: String::new(),
                    row_count: None,
                    columns: (0..13).map(|i| column(&format!("C{}", i))).collect(),
                },
                ContextTable {
                    table_id: 2,
                    name: "Regions".to_string(),
                    description: String::new(),
                    row_count: None,
                    columns: vec![column("RegionId")],
                },
            ],
        }
    }

    #[test]
    fn test_short_table_name() {
        assert_eq!(short_table_name("dbo.FactSales"), "FactSales");
        assert_eq!(short_table_name("db.sales.Orders"), "Orders");
        assert_eq!(short_table_name("Orders"), "Orders");
    }

    #[test]
    fn test_schema_block() {
        let block = schema_to_prompt(&context());
        assert!(block.starts_with("Available tables and columns:\n\nTable: FactSales\n"));
        assert!(!block.contains("dbo."));
        assert!(block.contains("  - C9 (int)\n"));
        assert!(!block.contains("  - C10 (int)"));
        assert!(block.contains("  ... and 3 more columns\n\nTable: Regions\n  - RegionId (int)\n\n"));
    }

    #[test]
    fn test_messages() {
        let messages = build_messages(&context(), "total sales by year");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("GROUP BY"));
        assert!(messages[1]
            .content
            .ends_with("Question: total sales by year\n\nGenerate SQL query using the tables above:"));
    }

    #[test]
    fn test_explain_messages_context() {
        let without = build_explain_messages("SELECT 1", None);
        assert!(without[1].content.starts_with("Explain this SQL query"));

        let with = build_explain_messages("SELECT 1", Some("{}"));
        assert!(with[1].content.starts_with("Database Context:\n{}\n\nExplain"));
    }
}
