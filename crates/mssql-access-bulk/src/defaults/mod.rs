//! Column default value resolution.
//!
//! Catalog defaults arrive as vendor expressions (`((0))`, `(N'abc')`,
//! `"text"`, `#1/1/2000#`). [`DefaultValueResolver`] strips the vendor
//! wrapper, parses the remainder for the column's type, lets an optional
//! [`DefaultValueHook`] override the result, and falls back to the type's
//! zero value for NOT NULL columns.

pub mod parse;
pub mod zero;

use std::fmt;
use std::sync::Arc;

use crate::core::SqlValue;
use crate::schema::{ColumnSchema, ColumnType, OleDbType, SqlDbType};

pub use zero::zero_value;

/// Default expression with its vendor wrapper removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedDefault {
    pub value: String,
    /// True when the expression was a quoted literal.
    pub quoted: bool,
}

/// Remove balanced outer parentheses, repeatedly.
fn strip_parens(mut s: &str) -> &str {
    loop {
        let t = s.trim();
        if !(t.starts_with('(') && t.ends_with(')')) || !outer_parens_match(t) {
            return t;
        }
        s = &t[1..t.len() - 1];
    }
}

/// True when the first `(` closes at the last character.
fn outer_parens_match(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn unquote(s: &str, quote: char) -> Option<String> {
    let inner = s.strip_prefix(quote)?.strip_suffix(quote)?;
    let doubled: String = [quote, quote].iter().collect();
    Some(inner.replace(&doubled, &quote.to_string()))
}

/// Strip a SQL Server default expression: `((0))` → `0`, `(N'a''b')` → `a'b`.
pub fn strip_sql_server_default(raw: &str) -> StrippedDefault {
    let s = strip_parens(raw);
    let literal = s
        .strip_prefix('N')
        .or_else(|| s.strip_prefix('n'))
        .filter(|rest| rest.starts_with('\''))
        .unwrap_or(s);

    if literal.len() >= 2 {
        if let Some(value) = unquote(literal, '\'') {
            return StrippedDefault {
                value,
                quoted: true,
            };
        }
    }
    StrippedDefault {
        value: s.to_string(),
        quoted: false,
    }
}

/// Strip an Access default expression: `="abc"` → `abc`, `#1/1/2000#` → `1/1/2000`.
pub fn strip_access_default(raw: &str) -> StrippedDefault {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix('=') {
        s = rest.trim();
    }
    if s.len() >= 2 {
        for quote in ['"', '\''] {
            if let Some(value) = unquote(s, quote) {
                return StrippedDefault {
                    value,
                    quoted: true,
                };
            }
        }
        if let Some(inner) = s.strip_prefix('#').and_then(|r| r.strip_suffix('#')) {
            return StrippedDefault {
                value: inner.to_string(),
                quoted: false,
            };
        }
    }
    StrippedDefault {
        value: s.to_string(),
        quoted: false,
    }
}

fn parse_sql_server(t: SqlDbType, d: &StrippedDefault) -> Option<SqlValue<'static>> {
    let s = d.value.as_str();
    let v = match t {
        SqlDbType::BigInt => SqlValue::I64(parse::parse_int(s)?),
        SqlDbType::Int => SqlValue::I32(parse::parse_int(s)?),
        SqlDbType::SmallInt => SqlValue::I16(parse::parse_int(s)?),
        SqlDbType::TinyInt => SqlValue::U8(parse::parse_int(s)?),
        SqlDbType::Bit => SqlValue::Bool(parse::parse_bool(s)?),
        SqlDbType::Real => SqlValue::F32(parse::parse_f32(s)?),
        SqlDbType::Float => SqlValue::F64(parse::parse_f64(s)?),
        SqlDbType::Decimal | SqlDbType::Money | SqlDbType::SmallMoney => {
            SqlValue::Decimal(parse::parse_decimal(s)?)
        }
        SqlDbType::DateTime | SqlDbType::SmallDateTime | SqlDbType::DateTime2 => {
            SqlValue::DateTime(parse::parse_datetime(s)?)
        }
        SqlDbType::Date => SqlValue::Date(parse::parse_date(s)?),
        SqlDbType::Time => SqlValue::Time(parse::parse_time(s)?),
        SqlDbType::DateTimeOffset => SqlValue::DateTimeOffset(parse::parse_datetime_offset(s)?),
        SqlDbType::UniqueIdentifier => SqlValue::Uuid(parse::parse_guid(s)?),
        // Unquoted text defaults are function calls such as suser_sname().
        t if t.is_text() => {
            if !d.quoted {
                return None;
            }
            SqlValue::text_owned(d.value.clone())
        }
        SqlDbType::Binary | SqlDbType::VarBinary | SqlDbType::Image | SqlDbType::Timestamp => {
            SqlValue::bytes_owned(parse::parse_hex_binary(s)?)
        }
        _ => return None,
    };
    Some(v)
}

fn parse_ms_access(t: OleDbType, d: &StrippedDefault) -> Option<SqlValue<'static>> {
    let s = d.value.as_str();
    let v = match t {
        OleDbType::SmallInt => SqlValue::I16(parse::parse_int(s)?),
        OleDbType::UnsignedSmallInt => SqlValue::U16(parse::parse_int(s)?),
        OleDbType::Integer => SqlValue::I32(parse::parse_int(s)?),
        OleDbType::UnsignedInt => SqlValue::U32(parse::parse_int(s)?),
        OleDbType::BigInt => SqlValue::I64(parse::parse_int(s)?),
        OleDbType::UnsignedBigInt => SqlValue::U64(parse::parse_int(s)?),
        OleDbType::TinyInt => SqlValue::I8(parse::parse_int(s)?),
        OleDbType::UnsignedTinyInt => SqlValue::U8(parse::parse_int(s)?),
        OleDbType::Single => SqlValue::F32(parse::parse_f32(s)?),
        OleDbType::Double => SqlValue::F64(parse::parse_f64(s)?),
        OleDbType::Currency | OleDbType::Decimal | OleDbType::Numeric | OleDbType::VarNumeric => {
            SqlValue::Decimal(parse::parse_decimal(s)?)
        }
        OleDbType::Date | OleDbType::DBTimeStamp | OleDbType::Filetime => {
            SqlValue::DateTime(parse::parse_datetime(s)?)
        }
        OleDbType::DBDate => SqlValue::Date(parse::parse_date(s)?),
        OleDbType::DBTime => SqlValue::Time(parse::parse_time(s)?),
        OleDbType::Boolean => SqlValue::Bool(parse::parse_bool(s)?),
        OleDbType::Guid => SqlValue::Uuid(parse::parse_guid(s)?),
        t if t.is_text() => SqlValue::text_owned(d.value.clone()),
        OleDbType::Binary | OleDbType::VarBinary | OleDbType::LongVarBinary => {
            SqlValue::bytes_owned(parse::parse_hex_binary(s)?)
        }
        _ => return None,
    };
    Some(v)
}

/// Strip and parse a raw default for a column type.
pub fn parse_default(column_type: ColumnType, raw: &str) -> Option<SqlValue<'static>> {
    match column_type {
        ColumnType::SqlServer(t) => parse_sql_server(t, &strip_sql_server_default(raw)),
        ColumnType::MsAccess(t) => parse_ms_access(t, &strip_access_default(raw)),
    }
}

/// Everything a hook sees about one default value.
#[derive(Debug)]
pub struct DefaultValueContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub column_type: ColumnType,
    /// Default expression exactly as the catalog reported it.
    pub raw: &'a str,
    /// Result of the built-in parser.
    pub parsed: Option<&'a SqlValue<'static>>,
}

/// Custom default parser. Returning `Some` overrides the built-in result.
pub type DefaultValueHook =
    Arc<dyn Fn(&DefaultValueContext<'_>) -> Option<SqlValue<'static>> + Send + Sync>;

/// Resolves column defaults for a loader.
#[derive(Clone, Default)]
pub struct DefaultValueResolver {
    hook: Option<DefaultValueHook>,
}

impl fmt::Debug for DefaultValueResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultValueResolver")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl DefaultValueResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a hook consulted after the built-in parser.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DefaultValueContext<'_>) -> Option<SqlValue<'static>> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn set_hook(&mut self, hook: Option<DefaultValueHook>) {
        self.hook = hook;
    }

    /// Resolve the default of `column` from the catalog's raw expression.
    pub fn resolve(&self, table: &str, column: &ColumnSchema, raw: Option<&str>) -> SqlValue<'static> {
        let resolved = match raw.filter(|r| !r.trim().is_empty()) {
            None => None,
            Some(raw) => {
                let parsed = parse_default(column.column_type, raw);
                let overridden = self.hook.as_ref().and_then(|hook| {
                    hook(&DefaultValueContext {
                        table,
                        column: column.name(),
                        column_type: column.column_type,
                        raw,
                        parsed: parsed.as_ref(),
                    })
                });
                overridden.or(parsed)
            }
        };

        match resolved {
            Some(v) if !v.is_null() => v,
            _ if !column.allow_null => zero_value(column.column_type)
                .unwrap_or(SqlValue::Null(column.column_type.null_type())),
            _ => SqlValue::Null(column.column_type.null_type()),
        }
    }
}
