//! DDL parser: turns arbitrary SQL text containing one or more
//! `CREATE TABLE` clauses into [`TableStructure`] values.

use regex::Regex;

use super::{Column, SqlDialect, TableStructure};
use crate::errors::{JdiError, Result};

/// Parses every top-level `CREATE TABLE [IF NOT EXISTS] <name> (...)` clause
/// out of `sql`, returning one [`TableStructure`] per clause.
pub fn parse_sql(sql: &str, dialect: SqlDialect) -> Result<Vec<TableStructure>> {
    get_create_table_clauses(sql)
        .into_iter()
        .map(|clause| parse_create_table_clause(&clause, dialect))
        .collect()
}

/// Splits `sql` into the top-level `CREATE TABLE ...;` clauses by tracking
/// parenthesis depth and single/double-quote state; a clause ends at the
/// first `;` seen once depth returns to zero after the opening paren.
fn get_create_table_clauses(sql: &str) -> Vec<String> {
    let starts = Regex::new(r"(?i)create\s+table\s+(?:if\s+not\s+exists\s+)?").unwrap();
    let bytes: Vec<char> = sql.chars().collect();
    let mut clauses = Vec::new();

    for mat in starts.find_iter(sql) {
        let start = char_index_of_byte_offset(sql, mat.start());
        let mut depth = 0i32;
        let mut seen_paren = false;
        let mut in_single = false;
        let mut in_double = false;
        let mut end = bytes.len() - 1;
        let mut i = start;
        while i < bytes.len() {
            let c = bytes[i];
            if in_single {
                if c == '\'' {
                    in_single = false;
                }
            } else if in_double {
                if c == '"' {
                    in_double = false;
                }
            } else {
                match c {
                    '\'' => in_single = true,
                    '"' => in_double = true,
                    '(' => {
                        depth += 1;
                        seen_paren = true;
                    }
                    ')' => depth -= 1,
                    ';' if seen_paren && depth == 0 => {
                        end = i;
                        break;
                    }
                    _ => {}
                }
            }
            i += 1;
        }
        let clause: String = bytes[start..=end.min(bytes.len() - 1)].iter().collect();
        clauses.push(clause);
    }
    clauses
}

fn char_index_of_byte_offset(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

/// Splits `content` on commas that sit at paren-depth 0 and outside quoted
/// text.
fn split_top_level_commas(content: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut current = String::new();

    for c in content.chars() {
        if in_single {
            current.push(c);
            if c == '\'' {
                in_single = false;
            }
            continue;
        }
        if in_double {
            current.push(c);
            if c == '"' {
                in_double = false;
            }
            continue;
        }
        match c {
            '\'' => {
                in_single = true;
                current.push(c);
            }
            '"' => {
                in_double = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        parts.push(trimmed);
    }
    parts
}

fn parse_create_table_clause(clause: &str, dialect: SqlDialect) -> Result<TableStructure> {
    let header = Regex::new(r#"(?is)create\s+table\s+(?:if\s+not\s+exists\s+)?["'`]?(\w+)["'`]?\s*\("#).unwrap();
    let caps = header
        .captures(clause)
        .ok_or_else(|| JdiError::Schema(format!("could not find a table name in clause: {clause}")))?;
    let table_name = caps.get(1).unwrap().as_str().to_string();

    let open_paren = caps.get(0).unwrap().end() - 1;
    let body = extract_balanced_parens(clause, open_paren)
        .ok_or_else(|| JdiError::Schema(format!("unbalanced parentheses in clause: {clause}")))?;

    let parts = split_top_level_commas(&body);

    let mut columns = Vec::new();
    let mut primary_keys: Vec<String> = Vec::new();
    let mut unique_keys: Vec<Vec<String>> = Vec::new();
    let mut fk_by_column: std::collections::HashMap<String, (String, String)> = std::collections::HashMap::new();

    for part in &parts {
        if is_table_constraint(part) {
            parse_table_constraint(part, &mut primary_keys, &mut unique_keys, &mut fk_by_column)?;
        }
    }

    for part in &parts {
        if !is_table_constraint(part) {
            let mut column = parse_column_sql(part)?;
            if column.autoincrement || part.to_uppercase().contains("PRIMARY KEY") {
                if !primary_keys.contains(&column.name) {
                    primary_keys.push(column.name.clone());
                }
            }
            if part.to_uppercase().contains("UNIQUE") && !part.to_uppercase().contains("FOREIGN KEY") {
                unique_keys.push(vec![column.name.clone()]);
            }
            if let Some(fk) = fk_by_column.remove(&column.name) {
                column.foreign_key = Some(fk);
            }
            columns.push(column);
        }
    }

    // Non-SQLite dialects implicitly mark table-level-PRIMARY-KEY columns NOT NULL.
    if dialect != SqlDialect::Sqlite {
        for column in &mut columns {
            if primary_keys.contains(&column.name) {
                column.not_null = true;
            }
        }
    }

    Ok(TableStructure {
        name: table_name,
        columns,
        unique_keys,
        primary_keys,
        raw_ddl: Some(clause.trim().to_string()),
    })
}

fn extract_balanced_parens(s: &str, open_paren_char_index: usize) -> Option<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.get(open_paren_char_index) != Some(&'(') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = open_paren_char_index;
    let start = open_paren_char_index + 1;
    while i < chars.len() {
        let c = chars[i];
        if in_single {
            if c == '\'' {
                in_single = false;
            }
        } else if in_double {
            if c == '"' {
                in_double = false;
            }
        } else {
            match c {
                '\'' => in_single = true,
                '"' => in_double = true,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(chars[start..i].iter().collect());
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn is_table_constraint(part: &str) -> bool {
    let upper = part.trim_start().to_uppercase();
    upper.starts_with("PRIMARY KEY")
        || upper.starts_with("UNIQUE")
        || upper.starts_with("FOREIGN KEY")
        || upper.starts_with("CONSTRAINT")
}

fn parse_table_constraint(
    part: &str,
    primary_keys: &mut Vec<String>,
    unique_keys: &mut Vec<Vec<String>>,
    fk_by_column: &mut std::collections::HashMap<String, (String, String)>,
) -> Result<()> {
    let upper = part.to_uppercase();
    let cols_re = Regex::new(r"\(([^)]*)\)").unwrap();

    if upper.starts_with("PRIMARY KEY") {
        if let Some(caps) = cols_re.captures(part) {
            for col in split_col_list(caps.get(1).unwrap().as_str()) {
                if !primary_keys.contains(&col) {
                    primary_keys.push(col);
                }
            }
        }
    } else if upper.starts_with("UNIQUE") {
        if let Some(caps) = cols_re.captures(part) {
            unique_keys.push(split_col_list(caps.get(1).unwrap().as_str()));
        }
    } else if upper.starts_with("FOREIGN KEY") || upper.starts_with("CONSTRAINT") {
        let fk_re =
            Regex::new(r"(?i)FOREIGN KEY\s*\(([^)]+)\)\s*REFERENCES\s*(\w+)\s*\((\w+)\)").unwrap();
        if let Some(caps) = fk_re.captures(part) {
            let col = caps.get(1).unwrap().as_str().trim().to_string();
            let ref_table = caps.get(2).unwrap().as_str().to_string();
            let ref_column = caps.get(3).unwrap().as_str().to_string();
            fk_by_column.insert(col, (ref_table, ref_column));
        }
    }
    Ok(())
}

fn split_col_list(s: &str) -> Vec<String> {
    s.split(',').map(|c| c.trim().trim_matches('"').trim_matches('\'').to_string()).collect()
}

/// Parses a single column definition:
/// `<name> <type_token> [NOT NULL] [AUTOINCREMENT] [DEFAULT <literal>] [UNIQUE] [PRIMARY KEY] [FOREIGN KEY (…) REFERENCES <t>(<c>)]`.
fn parse_column_sql(column_sql: &str) -> Result<Column> {
    let head_re = Regex::new(r#"^\s*["'`]?(\w+)["'`]?\s+(.*)$"#).unwrap();
    let caps = head_re
        .captures(column_sql)
        .ok_or_else(|| JdiError::Schema(format!("could not parse column definition: {column_sql}")))?;
    let name = caps.get(1).unwrap().as_str().to_string();
    let rest = caps.get(2).unwrap().as_str();

    let type_re = Regex::new(r"^(\S+)").unwrap();
    let type_token = type_re
        .captures(rest)
        .map(|c| c.get(1).unwrap().as_str().to_string())
        .unwrap_or_default();

    let upper_rest = rest.to_uppercase();
    let not_null = upper_rest.contains("NOT NULL");
    let autoincrement = upper_rest.contains("AUTOINCREMENT");

    let default_re = Regex::new(
        r#"(?i)DEFAULT\s+((?:'.*?')|(?:".*?")|(?:-?\b\d+(?:\.\d+)?\b)|(?:[a-zA-Z_][a-zA-Z0-9_]*))"#,
    )
    .unwrap();
    let default_literal = default_re
        .captures(rest)
        .map(|c| c.get(1).unwrap().as_str().to_string());

    let fk_re =
        Regex::new(r"(?i)FOREIGN KEY\s*(?:\(.+?\))?\s*REFERENCES\s*(\w+)\s*\((\w+)\)").unwrap();
    let foreign_key = fk_re.captures(rest).map(|c| {
        (
            c.get(1).unwrap().as_str().to_string(),
            c.get(2).unwrap().as_str().to_string(),
        )
    });

    Ok(Column {
        name,
        type_token,
        not_null,
        autoincrement,
        default_literal,
        foreign_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_table() {
        let ddl = "CREATE TABLE u(id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)";
        let tables = parse_sql(ddl, SqlDialect::Sqlite).unwrap();
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.name, "u");
        assert_eq!(t.primary_keys, vec!["id".to_string()]);
        assert_eq!(t.unique_keys, vec![vec!["name".to_string()]]);
        let name_col = t.column("name").unwrap();
        assert!(name_col.not_null);
    }

    #[test]
    fn non_sqlite_dialect_implies_not_null_on_table_level_primary_key() {
        let ddl = "CREATE TABLE u(id INTEGER, name TEXT, PRIMARY KEY(id))";
        let tables = parse_sql(ddl, SqlDialect::Other).unwrap();
        let id_col = tables[0].column("id").unwrap();
        assert!(id_col.not_null);

        let tables_sqlite = parse_sql(ddl, SqlDialect::Sqlite).unwrap();
        let id_col_sqlite = tables_sqlite[0].column("id").unwrap();
        assert!(!id_col_sqlite.not_null);
    }

    #[test]
    fn parses_foreign_key_and_default() {
        let ddl = "CREATE TABLE t(
            parent_id INTEGER,
            status TEXT DEFAULT 'active',
            FOREIGN KEY (parent_id) REFERENCES parents(id)
        )";
        let tables = parse_sql(ddl, SqlDialect::Sqlite).unwrap();
        let t = &tables[0];
        let parent_col = t.column("parent_id").unwrap();
        assert_eq!(
            parent_col.foreign_key,
            Some(("parents".to_string(), "id".to_string()))
        );
        let status_col = t.column("status").unwrap();
        assert_eq!(status_col.default_literal.as_deref(), Some("'active'"));
    }

    #[test]
    fn handles_multiple_clauses_in_one_document() {
        let ddl = "CREATE TABLE a(id INTEGER); CREATE TABLE b(id INTEGER, a_id INTEGER, FOREIGN KEY(a_id) REFERENCES a(id));";
        let tables = parse_sql(ddl, SqlDialect::Sqlite).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].name, "b");
    }
}
