//! SQL Server identifier validation and escaping.
//!
//! Every name that ends up inside `[...]` in the generated SQL (column
//! names, view/table names, option identifiers) must pass
//! [`validate_identifier`] first: leading `[A-Za-z_@#]`, tail
//! `[A-Za-z0-9_@#$]`, at most 128 characters, and not a reserved T-SQL
//! keyword.

/// T-SQL reserved keywords, sorted for binary search (uppercase).
const RESERVED_WORDS: &[&str] = &[
    "ADD",
    "ALL",
    "ALTER",
    "AND",
    "ANY",
    "AS",
    "ASC",
    "AUTHORIZATION",
    "BACKUP",
    "BEGIN",
    "BETWEEN",
    "BREAK",
    "BROWSE",
    "BULK",
    "BY",
    "CASCADE",
    "CASE",
    "CHECK",
    "CHECKPOINT",
    "CLOSE",
    "CLUSTERED",
    "COALESCE",
    "COLLATE",
    "COLUMN",
    "COMMIT",
    "COMPUTE",
    "CONSTRAINT",
    "CONTAINS",
    "CONTAINSTABLE",
    "CONTINUE",
    "CONVERT",
    "CREATE",
    "CROSS",
    "CURRENT",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "CURSOR",
    "DATABASE",
    "DBCC",
    "DEALLOCATE",
    "DECLARE",
    "DEFAULT",
    "DELETE",
    "DENY",
    "DESC",
    "DISK",
    "DISTINCT",
    "DISTRIBUTED",
    "DOUBLE",
    "DROP",
    "DUMP",
    "ELSE",
    "END",
    "ERRLVL",
    "ESCAPE",
    "EXCEPT",
    "EXEC",
    "EXECUTE",
    "EXISTS",
    "EXIT",
    "EXTERNAL",
    "FETCH",
    "FILE",
    "FILLFACTOR",
    "FOR",
    "FOREIGN",
    "FREETEXT",
    "FREETEXTTABLE",
    "FROM",
    "FULL",
    "FUNCTION",
    "GOTO",
    "GRANT",
    "GROUP",
    "HAVING",
    "HOLDLOCK",
    "IDENTITY",
    "IDENTITYCOL",
    "IDENTITY_INSERT",
    "IF",
    "IN",
    "INDEX",
    "INNER",
    "INSERT",
    "INTERSECT",
    "INTO",
    "IS",
    "JOIN",
    "KEY",
    "KILL",
    "LEFT",
    "LIKE",
    "LINENO",
    "LOAD",
    "MERGE",
    "NATIONAL",
    "NOCHECK",
    "NONCLUSTERED",
    "NOT",
    "NULL",
    "NULLIF",
    "OF",
    "OFF",
    "OFFSETS",
    "ON",
    "OPEN",
    "OPENDATASOURCE",
    "OPENQUERY",
    "OPENROWSET",
    "OPENXML",
    "OPTION",
    "OR",
    "ORDER",
    "OUTER",
    "OVER",
    "PERCENT",
    "PIVOT",
    "PLAN",
    "PRECISION",
    "PRIMARY",
    "PRINT",
    "PROC",
    "PROCEDURE",
    "PUBLIC",
    "RAISERROR",
    "READ",
    "READTEXT",
    "RECONFIGURE",
    "REFERENCES",
    "REPLICATION",
    "RESTORE",
    "RESTRICT",
    "RETURN",
    "REVERT",
    "REVOKE",
    "RIGHT",
    "ROLLBACK",
    "ROWCOUNT",
    "ROWGUIDCOL",
    "RULE",
    "SAVE",
    "SCHEMA",
    "SECURITYAUDIT",
    "SELECT",
    "SESSION_USER",
    "SET",
    "SETUSER",
    "SHUTDOWN",
    "SOME",
    "STATISTICS",
    "SYSTEM_USER",
    "TABLE",
    "TABLESAMPLE",
    "TEXTSIZE",
    "THEN",
    "TO",
    "TOP",
    "TRAN",
    "TRANSACTION",
    "TRIGGER",
    "TRUNCATE",
    "TRY_CONVERT",
    "TSEQUAL",
    "UNION",
    "UNIQUE",
    "UNPIVOT",
    "UPDATE",
    "UPDATETEXT",
    "USE",
    "USER",
    "VALUES",
    "VARYING",
    "VIEW",
    "WAITFOR",
    "WHEN",
    "WHERE",
    "WHILE",
    "WITH",
    "WRITETEXT",
];

/// Maximum identifier length accepted by SQL Server.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Check whether `name` is a valid SQL Server identifier.
///
/// Returns a message describing the violation, or `None` when valid.
pub(crate) fn identifier_error(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("identifier is empty".to_string());
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Some(format!(
            "identifier '{name}' exceeds {MAX_IDENTIFIER_LEN} characters"
        ));
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Some("identifier is empty".to_string());
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '@' || first == '#') {
        return Some(format!(
            "identifier '{name}' must start with a letter, '_', '@' or '#'"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '#' || c == '$') {
            return Some(format!(
                "identifier '{name}' contains invalid character '{c}'"
            ));
        }
    }

    let upper = name.to_ascii_uppercase();
    if RESERVED_WORDS.binary_search(&upper.as_str()).is_ok() {
        return Some(format!("identifier '{name}' is a reserved word"));
    }

    None
}

/// True when `name` passes the SQL Server identifier rules.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    identifier_error(name).is_none()
}

/// Wrap a validated identifier in brackets.
///
/// Closing brackets are doubled; with validation in place none occur,
/// but escaping unconditionally keeps the emitter safe on its own.
pub(crate) fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal with `''` doubling.
pub(crate) fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words_sorted() {
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("patient_id"));
        assert!(is_valid_identifier("_internal"));
        assert!(is_valid_identifier("@param"));
        assert!(is_valid_identifier("#temp"));
        assert!(is_valid_identifier("col$1"));
        assert!(is_valid_identifier("BirthDate"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1col"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier("semi;colon"));
        assert!(!is_valid_identifier("bracket]"));
        assert!(!is_valid_identifier(&"x".repeat(129)));
    }

    #[test]
    fn test_reserved_words_rejected_case_insensitively() {
        let err = identifier_error("Select").unwrap();
        assert!(err.contains("reserved word"), "got: {err}");
        assert!(!is_valid_identifier("WHERE"));
        assert!(!is_valid_identifier("from"));
    }

    #[test]
    fn test_bracket_escaping() {
        assert_eq!(bracket("name"), "[name]");
        assert_eq!(bracket("a]b"), "[a]]b]");
    }

    #[test]
    fn test_quote_str_doubling() {
        assert_eq!(quote_str("official"), "'official'");
        assert_eq!(quote_str("it's"), "'it''s'");
    }
}
