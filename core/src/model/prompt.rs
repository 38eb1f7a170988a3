//! Instruction text and response schema sent with every compile request

use crate::config::ProjectionDefault;
use crate::data::Row;
use serde_json::{json, Value};

pub fn user_message(requirement: &str) -> String {
    format!("User Requirement: \"{requirement}\"")
}

pub fn system_instruction(headers: &[String], sample_rows: &[Row], projection: ProjectionDefault) -> String {
    let headers_json = serde_json::to_string(headers).unwrap_or_else(|_| "[]".to_string());
    let samples_json = serde_json::to_string(sample_rows).unwrap_or_else(|_| "[]".to_string());

    let columns_rule = match projection {
        ProjectionDefault::AllHeaders => {
            "Return EVERY header from \"Available Headers\" unless the user explicitly asks to narrow, select, show only or hide columns."
        }
        ProjectionDefault::RequestedOnly => {
            "Return only the headers relevant to the requirement. Return an empty list to keep all columns."
        }
    };

    format!(
        r#"You are an expert Data Analyst and JavaScript Engineer. Your task is to take a natural language requirement and convert it into a filter predicate that is evaluated once per row.

Data Schema Information:
- Available Headers: {headers_json}
- Sample Data Records: {samples_json}

CRITICAL RULES for the 'code' field:
1. The 'code' MUST be a JavaScript function body over a single parameter named `row` that returns a boolean.
2. ALWAYS use bracket notation to read columns, so spaces and special characters are safe: row['Column Name'] or row?.['Column Name'].
3. Numbers: use parseFloat(row['Col']) and check isNaN before comparing.
4. Text: use String(row['Col'] ?? '').toLowerCase().includes('search term').
5. Handle missing and empty values gracefully; empty cells are empty strings.
6. Only use: const/let, if/else, return, the ternary operator, comparisons, && || ?? !, array literals, regex literals, parseFloat, parseInt, Number, String, Boolean, isNaN, isFinite, Math.abs/round/floor/ceil/min/max, new Date(...) with getFullYear/getMonth/getDate/getDay/getTime, string methods (toLowerCase, toUpperCase, trim, includes, startsWith, endsWith, indexOf, slice, substring, split, replace, match), Object.keys/values/entries(row), and array methods (includes, indexOf, join, plus some/every/find/findIndex/filter/map with an inline arrow callback such as t => ...). No loops, no assignments, no function declarations, no template literals.
7. Example: "const val = parseFloat(row['Revenue']); return !isNaN(val) && val > 50000;"

Output Schema (JSON):
- code: (string) The function body.
- columns: (array of strings) Headers to display, using the exact casing from "Available Headers". {columns_rule}
- explanation: (string) A clear, professional summary of the filtering logic.
- error: (string, optional) Use this if the requirement is nonsensical or refers to columns that don't exist."#
    )
}

/// JSON schema constraining the model's structured output
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "code": {
                "type": "STRING",
                "description": "Function body with a return statement"
            },
            "columns": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Headers to display"
            },
            "explanation": {
                "type": "STRING",
                "description": "Explanation of the applied filter"
            },
            "error": {
                "type": "STRING",
                "description": "Error message if the requirement is invalid"
            }
        },
        "required": ["code", "explanation", "columns"]
    })
}
