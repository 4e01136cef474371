use crate::error::MatdbError;
use crate::value::SqlValue;

/// Placeholder style a statement is compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// MySQL-style positional placeholders (`?`).
    MySql,
    /// SQL Server numbered placeholders (`@P1`, `@P2`, ...).
    Mssql,
}

/// A SQL statement with named bind parameters.
///
/// Statements are written with `:name` markers and compiled to the
/// backend's placeholder style right before execution:
///
/// ```
/// use matdb::Query;
///
/// let query = Query::new("INSERT INTO emp(emp_id, emp_name) VALUES (:emp_id, :emp_name)")
///     .bind("emp_id", 9331)
///     .bind("emp_name", "Vijay");
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    sql: String,
    binds: Vec<(String, SqlValue)>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Bind a value to a named parameter. Re-binding a name replaces
    /// the previous value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.binds.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.binds.push((name, value));
        }
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn lookup(&self, name: &str) -> Option<&SqlValue> {
        self.binds
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Compile `:name` markers to the target placeholder style and
    /// order the bound values accordingly.
    ///
    /// Markers inside string literals, quoted identifiers, and comments
    /// are left untouched; `::` is not a bind marker. Bound values that
    /// never appear in the statement are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MatdbError::ParameterError`] when a marker has no bound
    /// value.
    pub(crate) fn compile(&self, style: ParamStyle) -> Result<(String, Vec<SqlValue>), MatdbError> {
        let sql = &self.sql;
        let bytes = sql.as_bytes();
        let mut out = String::with_capacity(sql.len() + 8);
        let mut values: Vec<SqlValue> = Vec::new();
        let mut slots: Vec<&str> = Vec::new();
        let mut state = State::Normal;
        let mut copied = 0;
        let mut idx = 0;

        while idx < bytes.len() {
            let b = bytes[idx];
            match state {
                State::Normal => match b {
                    b'\'' => state = State::SingleQuoted,
                    b'"' => state = State::DoubleQuoted,
                    b'`' => state = State::Backtick,
                    b'[' => state = State::Bracket,
                    b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                        state = State::LineComment;
                        idx += 1;
                    }
                    // `#` starts a line comment in MySQL; in T-SQL it
                    // prefixes temp table names.
                    b'#' if style == ParamStyle::MySql => state = State::LineComment,
                    b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                        state = State::BlockComment(1);
                        idx += 1;
                    }
                    b':' => {
                        if bytes.get(idx + 1) == Some(&b':') {
                            idx += 1;
                        } else if let Some((end, name)) = scan_ident(sql, idx + 1) {
                            let value = self.lookup(name).ok_or_else(|| {
                                MatdbError::ParameterError(format!(
                                    "no value bound for parameter :{name}"
                                ))
                            })?;
                            out.push_str(&sql[copied..idx]);
                            match style {
                                ParamStyle::MySql => {
                                    out.push('?');
                                    values.push(value.clone());
                                }
                                ParamStyle::Mssql => {
                                    let slot = match slots.iter().position(|s| *s == name) {
                                        Some(slot) => slot,
                                        None => {
                                            slots.push(name);
                                            values.push(value.clone());
                                            slots.len() - 1
                                        }
                                    };
                                    out.push_str(&format!("@P{}", slot + 1));
                                }
                            }
                            copied = end;
                            idx = end;
                            continue;
                        }
                    }
                    _ => {}
                },
                State::SingleQuoted => {
                    if b == b'\'' {
                        if bytes.get(idx + 1) == Some(&b'\'') {
                            idx += 1; // skip escaped quote
                        } else {
                            state = State::Normal;
                        }
                    }
                }
                State::DoubleQuoted => {
                    if b == b'"' {
                        if bytes.get(idx + 1) == Some(&b'"') {
                            idx += 1; // skip escaped quote
                        } else {
                            state = State::Normal;
                        }
                    }
                }
                State::Backtick => {
                    if b == b'`' {
                        state = State::Normal;
                    }
                }
                State::Bracket => {
                    if b == b']' {
                        state = State::Normal;
                    }
                }
                State::LineComment => {
                    if b == b'\n' {
                        state = State::Normal;
                    }
                }
                State::BlockComment(depth) => {
                    if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                        state = State::BlockComment(depth + 1);
                        idx += 1;
                    } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                        state = if depth == 1 {
                            State::Normal
                        } else {
                            State::BlockComment(depth - 1)
                        };
                        idx += 1;
                    }
                }
            }
            idx += 1;
        }
        out.push_str(&sql[copied..]);

        let flattened = out.replace(" \n", " ").replace('\n', " ");
        tracing::debug!(query = %flattened, args = ?values, "compiled statement");

        Ok((out, values))
    }
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    Bracket,
    LineComment,
    BlockComment(u32),
}

/// Scan a parameter identifier (`[A-Za-z_][A-Za-z0-9_]*`) starting at
/// `start`; returns the end offset and the name.
fn scan_ident(sql: &str, start: usize) -> Option<(usize, &str)> {
    let bytes = sql.as_bytes();
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut idx = start + 1;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    Some((idx, &sql[start..idx]))
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_to_mysql_positional() {
        let query = Query::new("select * from emp where id = :id and name = :name")
            .bind("id", 3)
            .bind("name", "x");
        let (sql, values) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(sql, "select * from emp where id = ? and name = ?");
        assert_eq!(values, vec![SqlValue::Int(3), SqlValue::Text("x".into())]);
    }

    #[test]
    fn compiles_to_mssql_numbered() {
        let query = Query::new("update t set a = :a where b = :b").bind("a", 1).bind("b", 2);
        let (sql, values) = query.compile(ParamStyle::Mssql).unwrap();
        assert_eq!(sql, "update t set a = @P1 where b = @P2");
        assert_eq!(values, vec![SqlValue::Int(1), SqlValue::Int(2)]);
    }

    #[test]
    fn repeated_name_repeats_value_for_mysql() {
        let query = Query::new("select :v, :v").bind("v", 9);
        let (sql, values) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(sql, "select ?, ?");
        assert_eq!(values, vec![SqlValue::Int(9), SqlValue::Int(9)]);
    }

    #[test]
    fn repeated_name_shares_slot_for_mssql() {
        let query = Query::new("select :v, :w, :v").bind("v", 9).bind("w", 8);
        let (sql, values) = query.compile(ParamStyle::Mssql).unwrap();
        assert_eq!(sql, "select @P1, @P2, @P1");
        assert_eq!(values, vec![SqlValue::Int(9), SqlValue::Int(8)]);
    }

    #[test]
    fn skips_literals_and_comments() {
        let query = Query::new("select ':x', \":x\" -- :y\n/* :z */ from t where a = :a")
            .bind("a", 1);
        let (sql, _) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(sql, "select ':x', \":x\" -- :y\n/* :z */ from t where a = ?");
    }

    #[test]
    fn hash_comments_are_skipped_for_mysql() {
        let query = Query::new("select 1 # :y\nfrom t where a = :a").bind("a", 1);
        let (sql, values) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(sql, "select 1 # :y\nfrom t where a = ?");
        assert_eq!(values, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn hash_is_not_a_comment_for_mssql() {
        let query = Query::new("select * from #tmp where a = :a").bind("a", 1);
        let (sql, _) = query.compile(ParamStyle::Mssql).unwrap();
        assert_eq!(sql, "select * from #tmp where a = @P1");
    }

    #[test]
    fn skips_quoted_identifiers() {
        let query = Query::new("select `a:b`, [c:d] from t where e = :e").bind("e", 1);
        let (sql, _) = query.compile(ParamStyle::Mssql).unwrap();
        assert_eq!(sql, "select `a:b`, [c:d] from t where e = @P1");
    }

    #[test]
    fn double_colon_is_not_a_marker() {
        let query = Query::new("select a::text from t where b = :b").bind("b", 1);
        let (sql, _) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(sql, "select a::text from t where b = ?");
    }

    #[test]
    fn missing_bind_is_an_error() {
        let query = Query::new("select :a");
        let err = query.compile(ParamStyle::MySql).unwrap_err();
        assert!(matches!(err, MatdbError::ParameterError(_)));
    }

    #[test]
    fn extra_binds_are_ignored() {
        let query = Query::new("select 1").bind("unused", 5);
        let (sql, values) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(sql, "select 1");
        assert!(values.is_empty());
    }

    #[test]
    fn rebinding_replaces_value() {
        let query = Query::new("select :a").bind("a", 1).bind("a", 2);
        let (_, values) = query.compile(ParamStyle::MySql).unwrap();
        assert_eq!(values, vec![SqlValue::Int(2)]);
    }
}
