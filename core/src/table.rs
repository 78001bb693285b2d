//! The columnar table engine: deterministic, fixed-schema, sorted, non-null.
//!
//! Every table file has the same physical shape: a small header naming the
//! column schema, followed by row-major values tagged present/null. The
//! codec is custom rather than built on an Arrow/Parquet stack because those
//! formats embed writer identifiers, page sizes, and other metadata that are
//! not bit-reproducible across platforms by default -- exactly what §4.5
//! forbids. ZSTD at a fixed level is the only optional transform, applied to
//! the whole payload after encoding.

use std::io::{Read, Write as _};

use crate::error::{ErrorCode, ShardError};

const MAGIC: &[u8; 6] = b"SHTB1\0";
const FLAG_ZSTD: u8 = 0x01;

/// The physical type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Str,
    U64,
}

/// One column's name and physical type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub ty: ColumnType,
}

/// The fixed schema of one table (column order is part of the schema).
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSchema],
}

pub const ENTITIES_SCHEMA: TableSchema = TableSchema {
    name: "entities",
    columns: &[
        ColumnSchema { name: "entity_id", ty: ColumnType::Str },
        ColumnSchema { name: "namespace", ty: ColumnType::Str },
        ColumnSchema { name: "label", ty: ColumnType::Str },
        ColumnSchema { name: "entity_type", ty: ColumnType::Str },
    ],
};

pub const CLAIMS_SCHEMA: TableSchema = TableSchema {
    name: "claims",
    columns: &[
        ColumnSchema { name: "claim_id", ty: ColumnType::Str },
        ColumnSchema { name: "subject", ty: ColumnType::Str },
        ColumnSchema { name: "predicate", ty: ColumnType::Str },
        ColumnSchema { name: "object", ty: ColumnType::Str },
        ColumnSchema { name: "object_type", ty: ColumnType::Str },
        ColumnSchema { name: "tier", ty: ColumnType::U64 },
    ],
};

pub const PROVENANCE_SCHEMA: TableSchema = TableSchema {
    name: "provenance",
    columns: &[
        ColumnSchema { name: "provenance_id", ty: ColumnType::Str },
        ColumnSchema { name: "claim_id", ty: ColumnType::Str },
        ColumnSchema { name: "source_hash", ty: ColumnType::Str },
        ColumnSchema { name: "byte_start", ty: ColumnType::U64 },
        ColumnSchema { name: "byte_end", ty: ColumnType::U64 },
    ],
};

pub const SPANS_SCHEMA: TableSchema = TableSchema {
    name: "spans",
    columns: &[
        ColumnSchema { name: "span_id", ty: ColumnType::Str },
        ColumnSchema { name: "source_hash", ty: ColumnType::Str },
        ColumnSchema { name: "byte_start", ty: ColumnType::U64 },
        ColumnSchema { name: "byte_end", ty: ColumnType::U64 },
        ColumnSchema { name: "text", ty: ColumnType::Str },
    ],
};

/// One column value. The codec always writes a presence flag alongside each
/// value so a reader can positively detect a null slipped in by a
/// non-conforming writer, even though this writer never emits one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    U64(u64),
}

impl Value {
    fn column_type(&self) -> ColumnType {
        match self {
            Self::Str(_) => ColumnType::Str,
            Self::U64(_) => ColumnType::U64,
        }
    }
}

pub type Row = Vec<Value>;

const ZSTD_LEVEL: i32 = 19;

/// Encode `rows` under `schema`, sorted by the first column (every table's
/// primary key is its first column per §3.3), with optional ZSTD framing.
///
/// # Errors
///
/// [`ErrorCode::ESchemaType`] if a row's column count or column types don't
/// match `schema`.
pub fn write_table(
    schema: &TableSchema,
    mut rows: Vec<Row>,
    compress: bool,
) -> Result<Vec<u8>, ShardError> {
    for row in &rows {
        validate_row_shape(schema, row)?;
    }

    rows.sort_by(|a, b| match (&a[0], &b[0]) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    });

    let mut payload = Vec::new();
    for row in &rows {
        for value in row {
            encode_value(&mut payload, value);
        }
    }

    let (flag, body) = if compress {
        let compressed = zstd::encode_all(&payload[..], ZSTD_LEVEL).map_err(|e| {
            ShardError::shard(ErrorCode::ESchemaType, format!("zstd compression failed: {e}"))
        })?;
        (FLAG_ZSTD, compressed)
    } else {
        (0u8, payload)
    };

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(flag);
    out.extend_from_slice(&u32::try_from(rows.len()).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(&u16::try_from(schema.columns.len()).unwrap().to_be_bytes());
    for col in schema.columns {
        let name_bytes = col.name.as_bytes();
        out.push(u8::try_from(name_bytes.len()).unwrap());
        out.extend_from_slice(name_bytes);
        out.push(match col.ty {
            ColumnType::Str => 0,
            ColumnType::U64 => 1,
        });
    }
    out.extend_from_slice(&body);
    Ok(out)
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    out.push(1); // present
    match value {
        Value::Str(s) => {
            out.extend_from_slice(&u32::try_from(s.len()).unwrap_or(u32::MAX).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::U64(n) => out.extend_from_slice(&n.to_be_bytes()),
    }
}

fn validate_row_shape(schema: &TableSchema, row: &Row) -> Result<(), ShardError> {
    if row.len() != schema.columns.len() {
        return Err(ShardError::shard(
            ErrorCode::ESchemaType,
            format!(
                "{} row has {} columns, schema declares {}",
                schema.name,
                row.len(),
                schema.columns.len()
            ),
        ));
    }
    for (value, col) in row.iter().zip(schema.columns) {
        if value.column_type() != col.ty {
            return Err(ShardError::shard(
                ErrorCode::ESchemaType,
                format!("{}.{} has wrong physical type", schema.name, col.name),
            ));
        }
    }
    Ok(())
}

/// Decode a table file, validating it against `schema`.
///
/// # Errors
///
/// [`ErrorCode::ESchemaType`] on a malformed header, wrong column schema, or
/// truncated payload. [`ErrorCode::ESchemaNull`] if any value's presence
/// flag is unset.
pub fn read_table(bytes: &[u8], schema: &TableSchema) -> Result<Vec<Row>, ShardError> {
    let bad = |msg: &str| {
        ShardError::shard(ErrorCode::ESchemaType, format!("{}: {msg}", schema.name))
    };

    if bytes.len() < MAGIC.len() + 1 + 4 + 2 {
        return Err(bad("truncated header"));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(bad("bad magic"));
    }
    let mut pos = MAGIC.len();
    let flag = bytes[pos];
    pos += 1;
    let row_count = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let column_count = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap()) as usize;
    pos += 2;

    if column_count != schema.columns.len() {
        return Err(bad("column count mismatch"));
    }

    for col in schema.columns {
        if pos >= bytes.len() {
            return Err(bad("truncated column descriptor"));
        }
        let name_len = bytes[pos] as usize;
        pos += 1;
        if pos + name_len + 1 > bytes.len() {
            return Err(bad("truncated column descriptor"));
        }
        let name = std::str::from_utf8(&bytes[pos..pos + name_len]).map_err(|_| bad("non-utf8 column name"))?;
        pos += name_len;
        let type_tag = bytes[pos];
        pos += 1;
        if name != col.name {
            return Err(bad("column name mismatch"));
        }
        let ty = match type_tag {
            0 => ColumnType::Str,
            1 => ColumnType::U64,
            _ => return Err(bad("unknown column type tag")),
        };
        if ty != col.ty {
            return Err(bad("column type mismatch"));
        }
    }

    let raw_body = &bytes[pos..];
    let body = if flag & FLAG_ZSTD != 0 {
        let mut decoder = zstd::Decoder::new(raw_body).map_err(|e| bad(&format!("zstd init failed: {e}")))?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| bad(&format!("zstd decompression failed: {e}")))?;
        decompressed
    } else {
        raw_body.to_vec()
    };

    let mut cursor = &body[..];
    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut row = Row::with_capacity(schema.columns.len());
        for col in schema.columns {
            let value = decode_value(&mut cursor, col.ty, schema.name)?;
            row.push(value);
        }
        rows.push(row);
    }
    if !cursor.is_empty() {
        return Err(bad("trailing bytes after declared row count"));
    }
    Ok(rows)
}

fn decode_value(cursor: &mut &[u8], ty: ColumnType, table_name: &str) -> Result<Value, ShardError> {
    let truncated = || ShardError::shard(ErrorCode::ESchemaType, format!("{table_name}: truncated value"));
    if cursor.is_empty() {
        return Err(truncated());
    }
    let present = cursor[0];
    *cursor = &cursor[1..];
    if present == 0 {
        return Err(ShardError::shard(
            ErrorCode::ESchemaNull,
            format!("{table_name}: required column contains null"),
        ));
    }

    match ty {
        ColumnType::Str => {
            if cursor.len() < 4 {
                return Err(truncated());
            }
            let len = u32::from_be_bytes(cursor[..4].try_into().unwrap()) as usize;
            *cursor = &cursor[4..];
            if cursor.len() < len {
                return Err(truncated());
            }
            let s = std::str::from_utf8(&cursor[..len])
                .map_err(|_| ShardError::shard(ErrorCode::ESchemaType, format!("{table_name}: non-utf8 string column")))?
                .to_string();
            *cursor = &cursor[len..];
            Ok(Value::Str(s))
        }
        ColumnType::U64 => {
            if cursor.len() < 8 {
                return Err(truncated());
            }
            let n = u64::from_be_bytes(cursor[..8].try_into().unwrap());
            *cursor = &cursor[8..];
            Ok(Value::U64(n))
        }
    }
}
