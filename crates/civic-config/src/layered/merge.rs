//! Deep merge of TOML tables, later layer wins.

use toml::{Table, Value};

/// Merge `overlay` into `base`. Tables merge key by key; any other value in
/// `overlay` replaces what `base` had.
pub(crate) fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Set `value` at a dotted path, creating intermediate tables. A non-table
/// value sitting where a table is needed gets replaced.
pub(crate) fn insert_path(table: &mut Table, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut cursor = table;
    for segment in parents {
        let entry = cursor
            .entry(segment.clone())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        cursor = match entry {
            Value::Table(inner) => inner,
            _ => unreachable!("entry was just made a table"),
        };
    }
    cursor.insert(last.clone(), value);
}

/// Look up a dotted path.
pub(crate) fn lookup<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let first = segments.next()?;
    let mut current = table.get(first)?;
    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }
    Some(current)
}

/// Interpret a raw string from the environment or a secret store.
pub(crate) fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(b) = trimmed.parse::<bool>() {
        return Value::Boolean(b);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return Value::Float(f);
        }
    }
    Value::String(raw.to_string())
}
