//! `key=value;` connection string parsing shared by both drivers.

/// Split a connection string into `(lowercase key, value)` pairs.
///
/// Values may be wrapped in `{}` or quotes when they contain `;`.
pub fn parse(connection_string: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = connection_string.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().trim_start_matches(';').trim().to_lowercase();
        let after = rest[eq + 1..].trim_start();

        let (value, remaining) = match after.chars().next() {
            Some(open @ ('{' | '"' | '\'')) => {
                let close = if open == '{' { '}' } else { open };
                match after[1..].find(close) {
                    Some(end) => {
                        let value = &after[1..end + 1];
                        let tail = &after[end + 2..];
                        let tail = tail.find(';').map_or("", |i| &tail[i + 1..]);
                        (value.to_string(), tail)
                    }
                    None => (after[1..].to_string(), ""),
                }
            }
            _ => match after.find(';') {
                Some(i) => (after[..i].trim().to_string(), &after[i + 1..]),
                None => (after.trim().to_string(), ""),
            },
        };

        if !key.is_empty() {
            pairs.push((key, value));
        }
        rest = remaining.trim_start();
    }

    pairs
}

/// First value whose key matches one of `keys` (lowercase).
pub fn get<'a>(pairs: &'a [(String, String)], keys: &[&str]) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| keys.contains(&k.as_str()))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ado_string() {
        let pairs = parse("Server=tcp:db01,1433;Initial Catalog=Sales;User Id=sa;Password={p;w}");
        assert_eq!(get(&pairs, &["server"]), Some("tcp:db01,1433"));
        assert_eq!(get(&pairs, &["database", "initial catalog"]), Some("Sales"));
        assert_eq!(get(&pairs, &["password"]), Some("p;w"));
    }

    #[test]
    fn test_parse_odbc_string() {
        let pairs = parse("Driver={Microsoft Access Driver (*.mdb, *.accdb)};DBQ=C:\\data\\a.accdb;");
        assert_eq!(get(&pairs, &["dbq"]), Some("C:\\data\\a.accdb"));
        assert_eq!(
            get(&pairs, &["driver"]),
            Some("Microsoft Access Driver (*.mdb, *.accdb)")
        );
    }

    #[test]
    fn test_empty_values_ignored_by_get() {
        let pairs = parse("Server=x;Database=;");
        assert_eq!(get(&pairs, &["database"]), None);
    }
}
