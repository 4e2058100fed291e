use regex::Regex;
use tracing::warn;

use crate::phase::Phase;

/// Maximum row count a production query should ask for.
pub const MAX_RESULT_ROWS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Blocks execution in production.
    High,
    /// Advisory only, never blocks.
    Low,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn high(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: Severity::High,
            message: message.into(),
        }
    }

    fn low(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: Severity::Low,
            message: message.into(),
        }
    }
}

/// Outcome of validating one SQL statement. Validation never raises:
/// unparseable SQL is itself a high-severity issue.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub is_safe: bool,
    pub syntax_valid: bool,
    pub issues: Vec<Issue>,
    pub complexity_score: u8,
    pub phase: Phase,
}

impl ValidationReport {
    /// Whether the active phase refuses to execute this statement.
    pub fn blocks_execution(&self) -> bool {
        self.phase.blocks_unsafe() && !self.is_safe
    }

    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }

    fn has_high_severity(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::High)
    }
}

const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER", "CREATE", "SHOW",
    "EXPLAIN",
];

/// Rule engine classifying generated SQL. Detection rules are
/// phase-independent; only the consequence varies (POC and BREAKING_DEMO
/// record issues without blocking, PRODUCTION blocks on any high-severity
/// issue).
pub struct Validator {
    stacked_statement: Regex,
    line_comment: Regex,
    block_comment: Regex,
    union_select: Regex,
    tautology: Regex,
    from_table: Regex,
    join_table: Regex,
    destructive: Regex,
    schema_destructive: Regex,
    limit_value: Regex,
}

impl Validator {
    pub fn new() -> Self {
        // The patterns run against the uppercased statement.
        Self {
            stacked_statement: Regex::new(
                r";\s*(DROP|DELETE|UPDATE|INSERT|ALTER|TRUNCATE|CREATE|SELECT|WITH)\b",
            )
            .unwrap(),
            line_comment: Regex::new(r"--").unwrap(),
            block_comment: Regex::new(r"/\*").unwrap(),
            union_select: Regex::new(r"\bUNION\s+(ALL\s+)?SELECT\b").unwrap(),
            tautology: Regex::new(r"'\s*OR\s+('1'\s*=\s*'1|1\s*=\s*1)").unwrap(),
            from_table: Regex::new(r"\bFROM\s+([A-Z_][A-Z0-9_]*)").unwrap(),
            join_table: Regex::new(r"\bJOIN\s+([A-Z_][A-Z0-9_]*)").unwrap(),
            destructive: Regex::new(r"\b(DELETE|UPDATE)\b").unwrap(),
            schema_destructive: Regex::new(r"\b(DROP|TRUNCATE|ALTER)\b").unwrap(),
            limit_value: Regex::new(r"\bLIMIT\s+(\d+)").unwrap(),
        }
    }

    pub fn validate(&self, sql: &str, allowed_tables: &[String], phase: Phase) -> ValidationReport {
        let mut report = ValidationReport {
            is_safe: true,
            syntax_valid: true,
            issues: Vec::new(),
            complexity_score: 1,
            phase,
        };

        let upper = sql.to_uppercase();

        self.check_basic_syntax(sql, &upper, &mut report);
        self.check_injection(&upper, &mut report);
        self.check_destructive(&upper, &mut report);
        self.check_table_scope(&upper, allowed_tables, &mut report);

        if phase == Phase::Production {
            report.complexity_score = estimate_complexity(&upper);
            self.check_result_limit(&upper, &mut report);
        }

        report.is_safe = !report.has_high_severity();

        if !report.is_safe {
            warn!(
                phase = %phase,
                "SQL failed safety validation: {:?}",
                report.issue_messages()
            );
        }

        report
    }

    fn check_basic_syntax(&self, sql: &str, upper: &str, report: &mut ValidationReport) {
        let trimmed = upper.trim();

        if trimmed.is_empty() {
            report.syntax_valid = false;
            report
                .issues
                .push(Issue::high("syntax", "Empty SQL statement"));
            return;
        }

        if !STATEMENT_KEYWORDS
            .iter()
            .any(|kw| trimmed.starts_with(kw))
        {
            report.syntax_valid = false;
            report.issues.push(Issue::high(
                "syntax",
                "Statement does not begin with a recognized SQL keyword",
            ));
        }

        if sql.matches('(').count() != sql.matches(')').count() {
            report.syntax_valid = false;
            report
                .issues
                .push(Issue::high("syntax", "Unmatched parentheses in statement"));
        }
    }

    fn check_injection(&self, upper: &str, report: &mut ValidationReport) {
        if let Some(caps) = self.stacked_statement.captures(upper) {
            report.syntax_valid = false;
            report.issues.push(Issue::high(
                "stacked_statement",
                format!(
                    "Multiple statements detected: trailing {} after statement terminator",
                    &caps[1]
                ),
            ));
        }

        if self.line_comment.is_match(upper) {
            report.issues.push(Issue::high(
                "comment_obfuscation",
                "Line comment (--) in generated SQL",
            ));
        }

        if self.block_comment.is_match(upper) {
            report.issues.push(Issue::high(
                "comment_obfuscation",
                "Block comment (/*) in generated SQL",
            ));
        }

        if self.union_select.is_match(upper) {
            report.issues.push(Issue::high(
                "union_injection",
                "UNION SELECT pattern detected",
            ));
        }

        if self.tautology.is_match(upper) {
            report.issues.push(Issue::high(
                "tautology",
                "Always-true predicate pattern detected",
            ));
        }
    }

    fn check_destructive(&self, upper: &str, report: &mut ValidationReport) {
        if let Some(caps) = self.destructive.captures(upper) {
            let op = caps[1].to_string();
            if !upper.contains("WHERE") {
                report.issues.push(Issue::high(
                    "destructive_without_filter",
                    format!("{} without WHERE clause affects all rows", op),
                ));
            } else {
                report.issues.push(Issue::low(
                    "destructive_operation",
                    format!("{} statement requires confirmation", op),
                ));
            }
        }

        if let Some(caps) = self.schema_destructive.captures(upper) {
            report.issues.push(Issue::high(
                "schema_destructive",
                format!("{} is not permitted through the pipeline", &caps[1]),
            ));
        }

        if upper.contains("INSERT") || upper.trim_start().starts_with("CREATE") {
            report.issues.push(Issue::low(
                "write_operation",
                "Write operation detected in generated SQL",
            ));
        }
    }

    fn check_table_scope(
        &self,
        upper: &str,
        allowed_tables: &[String],
        report: &mut ValidationReport,
    ) {
        let allowed: Vec<String> = allowed_tables.iter().map(|t| t.to_uppercase()).collect();

        let mut referenced: Vec<String> = Vec::new();
        for caps in self
            .from_table
            .captures_iter(upper)
            .chain(self.join_table.captures_iter(upper))
        {
            let name = caps[1].to_string();
            if !referenced.contains(&name) {
                referenced.push(name);
            }
        }

        for table in referenced {
            if !allowed.contains(&table) {
                report.issues.push(Issue::high(
                    "table_scope",
                    format!("Unauthorized table reference: {}", table),
                ));
            }
        }
    }

    fn check_result_limit(&self, upper: &str, report: &mut ValidationReport) {
        match self.limit_value.captures(upper) {
            None => {
                report.issues.push(Issue::low(
                    "result_limit",
                    format!("Query should include a LIMIT clause (max {} rows)", MAX_RESULT_ROWS),
                ));
            }
            Some(caps) => {
                if let Ok(limit) = caps[1].parse::<u64>() {
                    if limit > MAX_RESULT_ROWS {
                        report.issues.push(Issue::low(
                            "result_limit",
                            format!("LIMIT {} exceeds maximum of {} rows", limit, MAX_RESULT_ROWS),
                        ));
                    }
                }
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rough complexity score (1-10) from join count, subqueries, aggregation
/// and windowing.
fn estimate_complexity(upper: &str) -> u8 {
    let mut score: usize = 1;

    score += upper.matches("JOIN").count().min(3);

    let select_count = upper.matches("SELECT").count();
    score += (select_count.saturating_sub(1) * 2).min(4);

    let aggregates = ["SUM(", "COUNT(", "AVG(", "MAX(", "MIN("];
    if aggregates.iter().any(|a| upper.contains(a)) {
        score += 1;
    }

    if upper.contains("GROUP BY") {
        score += 1;
    }

    if upper.contains("OVER") {
        score += 2;
    }

    score.min(10) as u8
}
