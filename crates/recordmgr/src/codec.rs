//! Fixed-width encoding of typed values into record/column bytes.
//!
//! Every field occupies `1 + column.fixed_width()` bytes: a leading null tag
//! (`0` present, `1` null) followed by the value's fixed-width encoding. Text
//! values are zero-padded to the column's declared length and must not
//! contain an embedded NUL byte, since decoding trims trailing zeros.

use catalog::Column;
use common::{DbError, DbResult};
use types::{SqlType, Value};

/// Total on-disk width of one field, null tag included.
pub fn field_width(column: &Column) -> usize {
    1 + column.fixed_width()
}

/// Total width of a full record (row format) given its column list.
pub fn record_width(columns: &[Column]) -> usize {
    columns.iter().map(field_width).sum()
}

pub fn encode_field(out: &mut [u8], column: &Column, value: &Value) -> DbResult<()> {
    let width = field_width(column);
    if out.len() != width {
        return Err(DbError::Storage(format!(
            "field buffer for '{}' expects {width} bytes, got {}",
            column.name,
            out.len()
        )));
    }
    if matches!(value, Value::Null) {
        out.fill(0);
        out[0] = 1;
        return Ok(());
    }
    out[0] = 0;
    let body = &mut out[1..];
    match (column.ty, value) {
        (SqlType::Int, Value::Int(v)) => body.copy_from_slice(&v.to_le_bytes()),
        (SqlType::Float, Value::Float(v)) => body.copy_from_slice(&v.to_le_bytes()),
        (SqlType::Bool, Value::Bool(v)) => body[0] = *v as u8,
        (SqlType::Date, Value::Date(v)) => body.copy_from_slice(&v.to_le_bytes()),
        (SqlType::Text, Value::Text(s)) => {
            let bytes = s.as_bytes();
            if bytes.len() > body.len() {
                return Err(DbError::Storage(format!(
                    "text value for '{}' exceeds declared length {}",
                    column.name,
                    body.len()
                )));
            }
            if bytes.contains(&0) {
                return Err(DbError::Storage(format!(
                    "text value for '{}' may not contain NUL bytes",
                    column.name
                )));
            }
            body.fill(0);
            body[..bytes.len()].copy_from_slice(bytes);
        }
        _ => {
            return Err(DbError::Storage(format!(
                "value type mismatch for column '{}'",
                column.name
            )));
        }
    }
    Ok(())
}

pub fn decode_field(input: &[u8], column: &Column) -> DbResult<Value> {
    let width = field_width(column);
    if input.len() != width {
        return Err(DbError::Storage(format!(
            "field buffer for '{}' expects {width} bytes, got {}",
            column.name,
            input.len()
        )));
    }
    if input[0] == 1 {
        return Ok(Value::Null);
    }
    let body = &input[1..];
    Ok(match column.ty {
        SqlType::Int => Value::Int(i64::from_le_bytes(body.try_into().unwrap())),
        SqlType::Float => Value::Float(f64::from_le_bytes(body.try_into().unwrap())),
        SqlType::Bool => Value::Bool(body[0] != 0),
        SqlType::Date => Value::Date(i32::from_le_bytes(body.try_into().unwrap())),
        SqlType::Text => {
            let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
            Value::Text(String::from_utf8_lossy(&body[..end]).into_owned())
        }
    })
}

/// Pack a full row (row-format layout) into one contiguous byte buffer.
pub fn encode_record(columns: &[Column], values: &[Value]) -> DbResult<Vec<u8>> {
    if values.len() != columns.len() {
        return Err(DbError::Storage(format!(
            "expected {} values, got {}",
            columns.len(),
            values.len()
        )));
    }
    let mut buf = vec![0u8; record_width(columns)];
    let mut offset = 0;
    for (column, value) in columns.iter().zip(values) {
        let width = field_width(column);
        encode_field(&mut buf[offset..offset + width], column, value)?;
        offset += width;
    }
    Ok(buf)
}

/// Unpack a full row (row-format layout) back into typed values.
pub fn decode_record(columns: &[Column], bytes: &[u8]) -> DbResult<Vec<Value>> {
    if bytes.len() != record_width(columns) {
        return Err(DbError::Storage(format!(
            "record buffer expects {} bytes, got {}",
            record_width(columns),
            bytes.len()
        )));
    }
    let mut values = Vec::with_capacity(columns.len());
    let mut offset = 0;
    for column in columns {
        let width = field_width(column);
        values.push(decode_field(&bytes[offset..offset + width], column)?);
        offset += width;
    }
    Ok(values)
}
