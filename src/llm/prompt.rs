use crate::llm::models::GenerationRequest;

/// Output contract the parser in `parse.rs` relies on: a fenced ```sql
/// block followed by an `Explanation:` section.
const RESPONSE_FORMAT: &str = r#"Response format:
```sql
[Your SQL query here]
```

Explanation: [Brief explanation of what the query does]"#;

/// Builds the prompt for a generation call. A request carrying prior-attempt
/// context produces a refinement prompt, a genuinely different shape from a
/// fresh generation.
pub fn build_prompt(request: &GenerationRequest) -> String {
    match &request.prior {
        Some(prior) => {
            let error_block = match &prior.error {
                Some(error) => format!("<error_message>\n{}\n</error_message>\n\n", error),
                None => String::new(),
            };
            let refinement_block = if prior.refinement.is_empty() {
                String::new()
            } else {
                format!("<user_refinement>\n{}\n</user_refinement>\n\n", prior.refinement)
            };

            format!(
                r#"You are an expert SQL database assistant. A previous SQL query needs to be corrected.

<database_schema>
{schema}
</database_schema>

<original_question>
{question}
</original_question>

<previous_sql>
{previous_sql}
</previous_sql>

{error_block}{refinement_block}Instructions:
1. Analyze the error message carefully, if one is present
2. Correct the SQL query to fix the specific problem
3. If the user provided refinement instructions, incorporate them
4. Ensure the corrected query still answers the original question
5. Explain what was wrong and how you fixed it

{format}

Generate the corrected SQL query now:"#,
                schema = request.schema_text,
                question = request.question,
                previous_sql = prior.sql,
                error_block = error_block,
                refinement_block = refinement_block,
                format = RESPONSE_FORMAT,
            )
        }
        None => format!(
            r#"You are an expert SQL database assistant. Generate a SQL query based on the user's natural language question.

<database_schema>
{schema}
</database_schema>

<user_question>
{question}
</user_question>

Instructions:
1. Generate a single valid SQL query that answers the user's question
2. Use proper JOIN syntax when combining tables
3. Include appropriate WHERE clauses for filtering
4. Use meaningful column aliases when helpful
5. Return reasonable result sizes (use LIMIT when appropriate)
6. Never generate DELETE, UPDATE, TRUNCATE, or DROP statements

{format}

Generate the SQL query now:"#,
            schema = request.schema_text,
            question = request.question,
            format = RESPONSE_FORMAT,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::PriorAttempt;

    fn request(prior: Option<PriorAttempt>) -> GenerationRequest {
        GenerationRequest {
            question: "Show me all users".to_string(),
            schema_text: "CREATE TABLE users (id INT);".to_string(),
            prior,
        }
    }

    #[test]
    fn initial_prompt_carries_schema_and_question() {
        let prompt = build_prompt(&request(None));
        assert!(prompt.contains("CREATE TABLE users"));
        assert!(prompt.contains("Show me all users"));
        assert!(prompt.contains("```sql"));
        assert!(!prompt.contains("<previous_sql>"));
    }

    #[test]
    fn refinement_prompt_carries_prior_context() {
        let prompt = build_prompt(&request(Some(PriorAttempt {
            sql: "SELECT * FROM user".to_string(),
            error: Some("relation \"user\" does not exist".to_string()),
            refinement: "the table is called users".to_string(),
        })));
        assert!(prompt.contains("<previous_sql>\nSELECT * FROM user"));
        assert!(prompt.contains("relation \"user\" does not exist"));
        assert!(prompt.contains("the table is called users"));
        assert!(prompt.contains("<original_question>"));
    }

    #[test]
    fn refinement_prompt_omits_empty_sections() {
        let prompt = build_prompt(&request(Some(PriorAttempt {
            sql: "SELECT 1".to_string(),
            error: None,
            refinement: String::new(),
        })));
        assert!(!prompt.contains("<error_message>"));
        assert!(!prompt.contains("<user_refinement>"));
    }
}
