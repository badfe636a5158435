use crate::analysis::QueryAnalysis;
use crate::analysis::templates::QueryTemplate;
use crate::llm::models::{ChatMessage, CompletionRequest, PromptMode, ResponseFormat};
use serde_json::Value;
use std::fmt::Write;

const GUIDELINES: &str = "\
1. ALWAYS include 'name' and 'ISO_A3' in SELECT clause
2. Use LIKE '%value%' for partial string matches (case-insensitive)
3. Fields like 'languages', 'currencies', 'borders' contain comma-separated values
4. For flag queries, use 'flagDescription' field (contains detailed flag descriptions)
5. Population and area are numeric fields - use comparison operators (>, <, =)
6. Common regions: Europe, Asia, Africa, Americas, Oceania
7. Add ORDER BY name for consistent results";

const EXAMPLES: &str = "\
Geographic Queries:
- \"Countries in Europe\" → SELECT name, ISO_A3 FROM countries WHERE region = 'Europe' ORDER BY name
- \"Largest countries by area\" → SELECT name, ISO_A3 FROM countries ORDER BY area DESC LIMIT 10
- \"Most populated countries\" → SELECT name, ISO_A3 FROM countries ORDER BY population DESC LIMIT 10

Language & Culture:
- \"Spanish speaking countries\" → SELECT name, ISO_A3 FROM countries WHERE languages LIKE '%Spanish%' ORDER BY name
- \"Countries using Euro\" → SELECT name, ISO_A3 FROM countries WHERE currencies LIKE '%Euro%' ORDER BY name

Flag Descriptions:
- \"Countries with red flags\" → SELECT name, ISO_A3 FROM countries WHERE flagDescription LIKE '%red%' ORDER BY name
- \"Countries with stars on flags\" → SELECT name, ISO_A3 FROM countries WHERE flagDescription LIKE '%star%' ORDER BY name
- \"Countries with crosses in flags\" → SELECT name, ISO_A3 FROM countries WHERE flagDescription LIKE '%cross%' ORDER BY name

Complex Combinations:
- \"European countries with crosses\" → SELECT name, ISO_A3 FROM countries WHERE region = 'Europe' AND flagDescription LIKE '%cross%' ORDER BY name
- \"Island nations in Pacific\" → SELECT name, ISO_A3 FROM countries WHERE (name LIKE '%island%' OR flagDescription LIKE '%island%') AND region = 'Oceania' ORDER BY name

Border Queries:
- \"Countries bordering France\" → SELECT name, ISO_A3 FROM countries WHERE borders LIKE '%France%' ORDER BY name

Size & Population:
- \"Countries larger than 1 million km²\" → SELECT name, ISO_A3 FROM countries WHERE area > 1000000 ORDER BY area DESC
- \"Countries with population over 100M\" → SELECT name, ISO_A3 FROM countries WHERE population > 100000000 ORDER BY population DESC";

/// Renders the text sent to the completion engine. Pure: identical inputs give
/// an identical prompt.
pub fn build_prompt(
    query: &str,
    analysis: &QueryAnalysis,
    schema_fields: &[String],
    sample_row: &Value,
    mode: PromptMode,
) -> String {
    let sample = serde_json::to_string_pretty(sample_row).unwrap_or_else(|_| "{}".to_string());
    let mut prompt = String::new();

    match mode {
        PromptMode::Plain => {
            prompt.push_str(
                "You are a SQL expert helping users explore world countries data. \
                 Generate a SQL query for the countries table based on the user's request.\n\n",
            );
        }
        PromptMode::Structured => {
            prompt.push_str(
                "You are a SQL expert helping users explore world countries data. \
                 Generate a structured response for the user's request.\n\n",
            );
            // The entities serialize from plain vectors and numbers; this cannot fail.
            let entities = serde_json::to_string(&analysis.entities).unwrap_or_default();
            let _ = writeln!(prompt, "QUERY ANALYSIS:");
            let _ = writeln!(prompt, "Intent: {}", analysis.intent);
            let _ = writeln!(prompt, "Complexity: {}", analysis.complexity);
            let _ = writeln!(prompt, "Extracted entities: {}", entities);
            if !analysis.suggestions.is_empty() {
                let _ = writeln!(prompt, "Suggestions: {}", analysis.suggestions.join(", "));
            }
            if let Some(sql) = QueryTemplate::for_intent(analysis.intent)
                .and_then(|template| template.render(&analysis.entities))
            {
                let _ = writeln!(prompt, "Closest template: {}", sql);
            }
            prompt.push('\n');
        }
    }

    let _ = writeln!(prompt, "DATABASE SCHEMA:");
    let _ = writeln!(prompt, "Table: countries");
    let _ = writeln!(prompt, "Available fields: {}\n", schema_fields.join(", "));
    let _ = writeln!(prompt, "SAMPLE DATA:\n{}\n", sample);
    let _ = writeln!(prompt, "IMPORTANT GUIDELINES:\n{}\n", GUIDELINES);
    let _ = writeln!(prompt, "QUERY PATTERNS & EXAMPLES:\n\n{}\n", EXAMPLES);
    let _ = writeln!(prompt, "USER QUERY: \"{}\"\n", query);

    match mode {
        PromptMode::Plain => {
            prompt.push_str("Respond with only the SQL query.");
        }
        PromptMode::Structured => {
            let _ = write!(
                prompt,
                r#"Respond with ONLY a JSON object in this exact format:
{{
  "sql": "THE_SQL_QUERY_HERE",
  "explanation": "Brief explanation of what this query does",
  "queryType": "geographic|population|language|flag|complex|other",
  "confidence": 0.95,
  "intent": "{}",
  "complexity": "{}",
  "suggestions": []
}}

Ensure the SQL query follows all guidelines above."#,
                analysis.intent, analysis.complexity
            );
        }
    }

    prompt
}

/// Wraps a prompt into the single-message request used for SQL generation.
pub fn completion_request(prompt: String, mode: PromptMode, temperature: f32) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::user(prompt)],
        temperature,
        max_tokens: mode.max_tokens(),
        response_format: match mode {
            PromptMode::Plain => None,
            PromptMode::Structured => Some(ResponseFormat::JsonObject),
        },
        tools: Vec::new(),
    }
}
