//! Field-projection layer: interprets a record's 128 raw bytes through a
//! user-supplied schema string of the form `name:offset:length:type[,...]`.
//!
//! This is purely a consumer of the table manager's scan/get results — it
//! has no knowledge of pages, bitmaps, or chains, reaching back only as
//! far as already-materialized record bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::leaf::RECORD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Hex,
    U8,
    U16,
    U32,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub length: usize,
    pub ty: FieldType,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed schema clause: {0}")]
    MalformedClause(String),
    #[error("unknown field type: {0}")]
    UnknownType(String),
    #[error("field {name} (offset {offset}, length {length}) runs past the 128-byte record")]
    FieldOutOfBounds {
        name: String,
        offset: usize,
        length: usize,
    },
    #[error("field {name} has length {length}, which does not match its fixed-width type")]
    LengthMismatch { name: String, length: usize },
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedClause(_) => "invalid_argument",
            Error::UnknownType(_) => "invalid_argument",
            Error::FieldOutOfBounds { .. } => "invalid_argument",
            Error::LengthMismatch { .. } => "invalid_argument",
        }
    }
}

/// Parses a comma-separated `name:offset:length:type` schema string.
pub fn parse_schema(schema: &str) -> Result<Vec<Field>, Error> {
    schema.split(',').map(parse_clause).collect()
}

fn parse_clause(clause: &str) -> Result<Field, Error> {
    let parts: Vec<&str> = clause.split(':').collect();
    if parts.len() != 4 {
        return Err(Error::MalformedClause(clause.to_string()));
    }
    let name = parts[0].to_string();
    let offset: usize = parts[1]
        .parse()
        .map_err(|_| Error::MalformedClause(clause.to_string()))?;
    let length: usize = parts[2]
        .parse()
        .map_err(|_| Error::MalformedClause(clause.to_string()))?;
    let ty = match parts[3] {
        "s" => FieldType::Str,
        "hex" => FieldType::Hex,
        "u8" => FieldType::U8,
        "u16" => FieldType::U16,
        "u32" => FieldType::U32,
        other => return Err(Error::UnknownType(other.to_string())),
    };

    let fixed_width = match ty {
        FieldType::U8 => Some(1),
        FieldType::U16 => Some(2),
        FieldType::U32 => Some(4),
        FieldType::Str | FieldType::Hex => None,
    };
    if let Some(expected) = fixed_width {
        if length != expected {
            return Err(Error::LengthMismatch { name, length });
        }
    }
    if offset
        .checked_add(length)
        .map(|end| end > RECORD_SIZE)
        .unwrap_or(true)
    {
        return Err(Error::FieldOutOfBounds {
            name,
            offset,
            length,
        });
    }

    Ok(Field {
        name,
        offset,
        length,
        ty,
    })
}

/// Formats one field's bytes out of a 128-byte record payload.
pub fn format_field(record: &[u8], field: &Field) -> String {
    let bytes = &record[field.offset..field.offset + field.length];
    match field.ty {
        FieldType::Str => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        FieldType::Hex => hex::encode(bytes),
        FieldType::U8 => bytes[0].to_string(),
        FieldType::U16 => LittleEndian::read_u16(bytes).to_string(),
        FieldType::U32 => LittleEndian::read_u32(bytes).to_string(),
    }
}

/// Projects every field of `fields` out of `record`, preserving schema order.
pub fn project_record(record: &[u8], fields: &[Field]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|f| (f.name.clone(), format_field(record, f)))
        .collect()
}
