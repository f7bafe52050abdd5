//! Read/write splitting.
//!
//! A statement may go to a replica only when the session carries no state
//! pinned to the primary and the statement itself is a plain read. Anything
//! that cannot be parsed is reported to the caller instead of being routed.

use shardctl_common::{ReadWriteSeparationStrategy, Result, ShardCtlError, TabletType};
use sqlparser::ast::{visit_expressions, Expr, Query, SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::ops::ControlFlow;

/// Tablet type used whenever read/write splitting does not apply
pub const DEFAULT_TABLET_TYPE: TabletType = TabletType::Primary;

/// Functions whose result depends on the connection they run on
const SESSION_BOUND_FUNCTIONS: &[&str] = &[
    "LAST_INSERT_ID",
    "GET_LOCK",
    "RELEASE_LOCK",
    "IS_USED_LOCK",
    "IS_FREE_LOCK",
    "RELEASE_ALL_LOCKS",
];

/// Suggest the tablet type a statement should be sent to.
///
/// Only an enabled strategy, outside a transaction, with no temporary
/// tables and no advisory lock held in the session, can route a read-only
/// statement to a replica.
pub fn suggest_tablet_type(
    strategy: ReadWriteSeparationStrategy,
    in_transaction: bool,
    has_created_temp_tables: bool,
    has_advisory_lock: bool,
    sql: &str,
) -> Result<TabletType> {
    if !strategy.is_enabled() {
        return Ok(DEFAULT_TABLET_TYPE);
    }
    if in_transaction || has_created_temp_tables || has_advisory_lock {
        return Ok(DEFAULT_TABLET_TYPE);
    }
    if is_read_only(sql)? {
        return Ok(TabletType::Replica);
    }
    Ok(DEFAULT_TABLET_TYPE)
}

/// Whether the statement could be served by a read-only tablet
pub fn is_read_only(sql: &str) -> Result<bool> {
    let dialect = MySqlDialect {};

    // Raw literals, so tokens render back to the text they came from.
    let tokens = Tokenizer::new(&dialect, sql)
        .with_unescape(false)
        .tokenize()
        .map_err(|e| ShardCtlError::SqlParse {
            message: e.to_string(),
        })?;
    let locking = scan_locking_clauses(&tokens);

    let parse_input = locking.stripped.as_deref().unwrap_or(sql);
    let mut statements =
        Parser::parse_sql(&dialect, parse_input).map_err(|e| ShardCtlError::SqlParse {
            message: e.to_string(),
        })?;
    if statements.len() != 1 {
        return Err(ShardCtlError::SqlParse {
            message: format!("expected exactly one statement, found {}", statements.len()),
        });
    }
    let statement = statements.remove(0);

    if calls_session_bound_function(&statement) {
        return Ok(false);
    }
    if locking.found {
        return Ok(false);
    }
    Ok(is_pure_select(&statement))
}

struct LockingScan {
    found: bool,
    /// Statement text with clauses the parser does not understand removed,
    /// when there were any
    stripped: Option<String>,
}

/// Find row-locking clauses at the token level, so keywords inside string
/// literals or comments never count.
fn scan_locking_clauses(tokens: &[Token]) -> LockingScan {
    let words: Vec<(usize, String)> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| !matches!(token, Token::Whitespace(_)))
        .map(|(i, token)| match token {
            Token::Word(w) if w.quote_style.is_none() => (i, w.value.to_ascii_uppercase()),
            _ => (i, String::new()),
        })
        .collect();

    let mut found = false;
    let mut dropped = Vec::new();
    for (pos, (_, word)) in words.iter().enumerate() {
        let next = |n: usize| words.get(pos + n).map(|(_, w)| w.as_str());
        match word.as_str() {
            "FOR" if matches!(next(1), Some("UPDATE") | Some("SHARE")) => found = true,
            "LOCK" if next(1) == Some("IN") && next(2) == Some("SHARE") && next(3) == Some("MODE") => {
                found = true;
                dropped.extend(words[pos..pos + 4].iter().map(|(i, _)| *i));
            }
            _ => {}
        }
    }

    let stripped = (!dropped.is_empty()).then(|| {
        tokens
            .iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, token)| token.to_string())
            .collect()
    });

    LockingScan { found, stripped }
}

fn calls_session_bound_function(statement: &Statement) -> bool {
    let flow = visit_expressions(statement, |expr| {
        if let Expr::Function(function) = expr {
            let name = function.name.to_string();
            let base = name.rsplit('.').next().unwrap_or(&name).trim_matches('`');
            if SESSION_BOUND_FUNCTIONS
                .iter()
                .any(|f| f.eq_ignore_ascii_case(base))
            {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });
    flow.is_break()
}

fn is_pure_select(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => is_pure_query(query),
        _ => false,
    }
}

fn is_pure_query(query: &Query) -> bool {
    if !query.locks.is_empty() {
        return false;
    }
    let ctes_pure = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_pure_query(&cte.query)));
    ctes_pure && is_pure_set_expr(&query.body)
}

fn is_pure_set_expr(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_pure_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_pure_set_expr(left) && is_pure_set_expr(right)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_reads() {
        assert!(is_read_only("SELECT * FROM users;").unwrap());
        assert!(is_read_only("select * from users union all select * from users;").unwrap());
        assert!(is_read_only("select count(*) from (select id from users) t").unwrap());
        assert!(is_read_only("with recent as (select id from users) select * from recent").unwrap());
    }

    #[test]
    fn test_writes() {
        assert!(!is_read_only("INSERT INTO users (id, name) VALUES (1, 'foo');").unwrap());
        assert!(!is_read_only("UPDATE users SET name = 'foo' WHERE id = 1;").unwrap());
        assert!(!is_read_only("DELETE FROM users WHERE id = 1;").unwrap());
        assert!(!is_read_only("CREATE TABLE t (id INT)").unwrap());
    }

    #[test]
    fn test_locking_clauses() {
        assert!(!is_read_only("SELECT * FROM users for update;").unwrap());
        assert!(!is_read_only("SELECT * FROM users FOR SHARE").unwrap());
        assert!(!is_read_only("SELECT * FROM users lock in share mode;").unwrap());
    }

    #[test]
    fn test_escaped_literals() {
        assert!(is_read_only("SELECT * FROM users WHERE name = 'O''Brien'").unwrap());
        assert!(is_read_only(r"SELECT * FROM users WHERE name = 'x\'y'").unwrap());
        assert!(!is_read_only("UPDATE users SET name = 'O''Brien' WHERE id = 1").unwrap());
        // Rebuilt text keeps escapes intact.
        assert!(!is_read_only("SELECT * FROM users WHERE name = 'O''Brien' LOCK IN SHARE MODE").unwrap());
        assert!(!is_read_only(r"SELECT * FROM users WHERE name = 'x\'y' LOCK IN SHARE MODE").unwrap());
    }

    #[test]
    fn test_keywords_in_literals_do_not_lock() {
        assert!(is_read_only("SELECT 'for update' FROM users").unwrap());
        assert!(is_read_only("SELECT * FROM users WHERE note = 'lock in share mode'").unwrap());
    }

    #[test]
    fn test_session_bound_functions() {
        for sql in [
            "SELECT last_insert_id();",
            "SELECT get_lock('lock', 10);",
            "SELECT release_lock('lock');",
            "SELECT is_used_lock('lock');",
            "SELECT is_free_lock('lock');",
            "SELECT release_all_locks();",
            "SELECT id FROM users WHERE id = LAST_INSERT_ID()",
        ] {
            assert!(!is_read_only(sql).unwrap(), "{sql}");
        }
    }

    #[test]
    fn test_unparseable() {
        assert!(matches!(is_read_only("SELEC * FROM"), Err(ShardCtlError::SqlParse { .. })));
        assert!(matches!(is_read_only(""), Err(ShardCtlError::SqlParse { .. })));
        assert!(matches!(
            is_read_only("SELECT 1; SELECT 2"),
            Err(ShardCtlError::SqlParse { .. })
        ));
    }

    #[test]
    fn test_suggest_respects_session_state() {
        let enable = ReadWriteSeparationStrategy::Enable;
        let sql = "SELECT * FROM users;";
        assert_eq!(suggest_tablet_type(enable, false, false, false, sql).unwrap(), TabletType::Replica);
        assert_eq!(suggest_tablet_type(enable, true, false, false, sql).unwrap(), TabletType::Primary);
        assert_eq!(suggest_tablet_type(enable, false, true, false, sql).unwrap(), TabletType::Primary);
        assert_eq!(suggest_tablet_type(enable, false, false, true, sql).unwrap(), TabletType::Primary);
    }

    #[test]
    fn test_disabled_never_parses() {
        // Garbage is fine when the statement is not inspected.
        assert_eq!(
            suggest_tablet_type(ReadWriteSeparationStrategy::Disable, false, false, false, "SELEC").unwrap(),
            TabletType::Primary
        );
        assert!(suggest_tablet_type(ReadWriteSeparationStrategy::Enable, false, false, false, "SELEC").is_err());
    }
}
