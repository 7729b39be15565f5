//! Detection of statements that invalidate cached schema metadata.
//!
//! This is a lexical prefix check on the trimmed statement text. Only
//! `CREATE` and `DROP` are recognised; `ALTER` and statements that start
//! with a comment are not.

use crate::pipeline::LogEntry;

const SCHEMA_KEYWORDS: [&str; 2] = ["create", "drop"];

/// Returns `true` when any successfully executed statement in `log` starts
/// with a schema-changing keyword.
pub fn has_schema_change(log: &[LogEntry]) -> bool {
    log.iter()
        .filter(|entry| entry.succeeded)
        .any(|entry| starts_with_schema_keyword(&entry.sql))
}

fn starts_with_schema_keyword(sql: &str) -> bool {
    let sql = sql.trim_start();
    SCHEMA_KEYWORDS.iter().any(|keyword| {
        sql.get(..keyword.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
            && sql[keyword.len()..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace)
    })
}
