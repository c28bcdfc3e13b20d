//! SQL dump producer and selective-apply filter.
//!
//! Dumps render every value through SQLite's `quote()` so literal escaping,
//! NULLs and blobs follow the engine's own rules. The apply side splits the
//! dump into statements with a scanner that respects single-quoted literals,
//! then filters each statement by its target table so a selective restore
//! never touches data outside the chosen modules.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::constants::{AVG_ROW_BYTES, AVG_ROW_BYTES_DEFAULT};
use crate::error::{AppError, Result};
use crate::models::module::DataModule;

/// Outcome of applying a dump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Produce a SQL text dump scoped to the given modules' tables.
///
/// Each table contributes a `DELETE FROM` followed by one `INSERT` per row,
/// so applying the dump replaces the covered tables wholesale while leaving
/// every other table untouched.
pub async fn dump_modules(pool: &SqlitePool, modules: &[DataModule]) -> Result<String> {
    let tables = DataModule::tables_for(modules);
    let mut out = String::new();

    out.push_str("-- healthrec sql_dump\n");
    out.push_str(&format!("-- generated: {}\n", Utc::now().to_rfc3339()));
    out.push_str(&format!("-- modules: {}\n", DataModule::join(modules)));

    for table in tables {
        dump_table(pool, table, &mut out).await?;
    }

    Ok(out)
}

/// Append one table's DELETE + INSERT statements to the dump
async fn dump_table(pool: &SqlitePool, table: &str, out: &mut String) -> Result<()> {
    let columns: Vec<String> =
        sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{}') ORDER BY cid", table))
            .fetch_all(pool)
            .await?;

    if columns.is_empty() {
        return Err(AppError::Dump(format!("Unknown table: {}", table)));
    }

    out.push_str(&format!("-- table: {}\n", table));
    out.push_str(&format!("DELETE FROM {};\n", table));

    // quote() renders each value as a ready-to-embed SQL literal
    let select_list = columns
        .iter()
        .map(|c| format!("quote(\"{}\")", c))
        .collect::<Vec<_>>()
        .join(", ");
    let rows = sqlx::query(&format!("SELECT {} FROM {}", select_list, table))
        .fetch_all(pool)
        .await?;

    let column_list = columns.join(", ");
    for row in rows {
        let mut values = Vec::with_capacity(row.columns().len());
        for i in 0..row.columns().len() {
            let literal: String = row.try_get(i)?;
            values.push(literal);
        }
        out.push_str(&format!(
            "INSERT INTO {} ({}) VALUES ({});\n",
            table,
            column_list,
            values.join(", ")
        ));
    }

    Ok(())
}

/// Split a SQL dump into individual statements.
///
/// The scanner tracks single-quoted literals (with `''` escapes) so
/// semicolons and newlines embedded in data never split a statement.
/// Line comments outside literals are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            current.push(c);
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    // Escaped quote, still inside the literal
                    current.push(chars.next().unwrap());
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match c {
            '\'' => {
                in_string = true;
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') && current.trim().is_empty() => {
                // Comment line; discard up to the newline
                for comment_char in chars.by_ref() {
                    if comment_char == '\n' {
                        break;
                    }
                }
                current.clear();
            }
            ';' => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let trailing = current.trim();
    if !trailing.is_empty() {
        statements.push(trailing.to_string());
    }

    statements
}

/// Determine which table a statement touches, if recognizable
pub fn statement_table(statement: &str) -> Option<String> {
    let mut words = statement.split_whitespace();
    let first = words.next()?.to_ascii_uppercase();
    let table_word = match first.as_str() {
        "INSERT" | "REPLACE" => {
            // INSERT [OR ...] INTO <table>
            let mut word = words.next()?;
            while !word.eq_ignore_ascii_case("into") {
                word = words.next()?;
            }
            words.next()?
        }
        "DELETE" => {
            // DELETE FROM <table>
            let from = words.next()?;
            if !from.eq_ignore_ascii_case("from") {
                return None;
            }
            words.next()?
        }
        "UPDATE" => words.next()?,
        "CREATE" | "DROP" | "ALTER" => {
            let kind = words.next()?;
            if !kind.eq_ignore_ascii_case("table") {
                return None;
            }
            // Skip IF [NOT] EXISTS
            let mut word = words.next()?;
            while word.eq_ignore_ascii_case("if")
                || word.eq_ignore_ascii_case("not")
                || word.eq_ignore_ascii_case("exists")
            {
                word = words.next()?;
            }
            word
        }
        _ => return None,
    };

    // Strip identifier quoting and anything glued on (e.g. `patients(` )
    let cleaned: String = table_word
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Apply a SQL dump inside a single transaction.
///
/// When `allowed_tables` is given, statements are executed only if their
/// target table is in the set; statements targeting other tables, or whose
/// target cannot be determined, are skipped. This guarantees data belonging
/// to non-selected modules is left untouched.
pub async fn apply_dump(
    pool: &SqlitePool,
    sql: &str,
    allowed_tables: Option<&[&str]>,
) -> Result<ApplyStats> {
    let statements = split_statements(sql);
    let mut stats = ApplyStats::default();
    let mut tx = pool.begin().await?;

    for statement in &statements {
        if let Some(allowed) = allowed_tables {
            match statement_table(statement) {
                Some(table) if allowed.iter().any(|t| *t == table) => {}
                other => {
                    tracing::debug!(
                        "Skipping statement outside selected modules (table: {:?})",
                        other
                    );
                    stats.skipped += 1;
                    continue;
                }
            }
        }
        sqlx::query(statement).execute(&mut *tx).await?;
        stats.applied += 1;
    }

    tx.commit().await?;
    Ok(stats)
}

/// Advisory, uncompressed size estimate in MB for the selected modules.
/// Sums live row counts times per-table average-row-size heuristics.
pub async fn estimate_size_mb(pool: &SqlitePool, modules: &[DataModule]) -> Result<f64> {
    let mut total_bytes: u64 = 0;
    for table in DataModule::tables_for(modules) {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        let avg = AVG_ROW_BYTES
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, bytes)| *bytes)
            .unwrap_or(AVG_ROW_BYTES_DEFAULT);
        total_bytes += count as u64 * avg;
    }
    Ok((total_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0)
}
