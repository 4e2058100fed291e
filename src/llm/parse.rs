use crate::llm::LlmError;

const DEFAULT_EXPLANATION: &str = "SQL query generated to answer your question.";

/// Decomposes raw model text into (sql, explanation).
///
/// The contract between model text and structured output is fuzzy, so this
/// lives in its own step with a typed failure: no extractable SQL is
/// `LlmError::Parse`. A missing explanation falls back to a fixed default
/// rather than failing.
pub fn parse_response(content: &str) -> Result<(String, String), LlmError> {
    let sql = extract_sql(content);

    if sql.trim().is_empty() {
        return Err(LlmError::Parse(format!(
            "No SQL statement found in model response: {}",
            truncate(content, 200)
        )));
    }

    let explanation = extract_explanation(content)
        .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());

    Ok((sql, explanation))
}

fn extract_sql(content: &str) -> String {
    // Preferred: fenced ```sql block.
    if let Some(start) = content.find("```sql") {
        let after = &content[start + 6..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Fallback: plain ``` fence without a language tag.
    if let Some(start) = content.find("```") {
        let after = &content[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Last resort: a line that starts like a statement, collected to the
    // terminating semicolon.
    let keywords = ["SELECT", "WITH"];
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let upper = line.trim().to_uppercase();
        if keywords.iter().any(|kw| upper.starts_with(kw)) {
            let mut sql = line.trim().to_string();
            for next in &lines[i + 1..] {
                let next = next.trim();
                if next.is_empty() || next.starts_with("```") || next.starts_with("Explanation:") {
                    break;
                }
                sql.push(' ');
                sql.push_str(next);
                if next.ends_with(';') {
                    break;
                }
            }
            return sql;
        }
    }

    String::new()
}

fn extract_explanation(content: &str) -> Option<String> {
    let marker = "Explanation:";
    let start = content.find(marker)?;
    let text = content[start + marker.len()..]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() { None } else { Some(text) }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_sql_and_explanation() {
        let content = "Here is the query.\n```sql\nSELECT * FROM users LIMIT 10;\n```\n\nExplanation: Lists the first ten users.";
        let (sql, explanation) = parse_response(content).unwrap();
        assert_eq!(sql, "SELECT * FROM users LIMIT 10;");
        assert_eq!(explanation, "Lists the first ten users.");
    }

    #[test]
    fn parses_bare_fence() {
        let content = "```\nSELECT count(*) FROM orders;\n```\nExplanation: Counts orders.";
        let (sql, explanation) = parse_response(content).unwrap();
        assert_eq!(sql, "SELECT count(*) FROM orders;");
        assert_eq!(explanation, "Counts orders.");
    }

    #[test]
    fn falls_back_to_statement_scan() {
        let content = "SELECT id,\n  name\nFROM users;\n\nExplanation: Plain response without fences.";
        let (sql, _) = parse_response(content).unwrap();
        assert_eq!(sql, "SELECT id, name FROM users;");
    }

    #[test]
    fn missing_explanation_gets_default() {
        let content = "```sql\nSELECT 1;\n```";
        let (_, explanation) = parse_response(content).unwrap();
        assert_eq!(explanation, DEFAULT_EXPLANATION);
    }

    #[test]
    fn multiline_explanation_is_joined() {
        let content =
            "```sql\nSELECT 1;\n```\nExplanation: First line\ncontinues on the second line.";
        let (_, explanation) = parse_response(content).unwrap();
        assert_eq!(explanation, "First line continues on the second line.");
    }

    #[test]
    fn prose_only_response_is_a_parse_error() {
        let err = parse_response("I cannot answer that question.").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn empty_fence_is_a_parse_error() {
        let err = parse_response("```sql\n\n```\nExplanation: nothing").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }
}
