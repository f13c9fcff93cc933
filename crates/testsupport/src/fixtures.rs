//! Common row and schema fixtures for tests.

use types::Value;

/// Build a row of integer values.
pub fn int_row(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}

/// Build a row of text values.
pub fn text_row(values: &[&str]) -> Vec<Value> {
    values.iter().map(|&v| Value::Text(v.to_string())).collect()
}

/// Sample `(id, name, age)` rows for the standard users fixture table.
pub mod data {
    use super::*;

    pub fn sample_users() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int(1), Value::Text("Alice".into()), Value::Int(30)],
            vec![Value::Int(2), Value::Text("Bob".into()), Value::Int(25)],
            vec![Value::Int(3), Value::Text("Charlie".into()), Value::Int(35)],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_row_builds_int_values() {
        assert_eq!(int_row(&[1, 2, 3]), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn text_row_builds_text_values() {
        assert_eq!(text_row(&["a", "b"]), vec![Value::Text("a".into()), Value::Text("b".into())]);
    }

    #[test]
    fn sample_users_has_three_rows() {
        assert_eq!(data::sample_users().len(), 3);
    }
}
