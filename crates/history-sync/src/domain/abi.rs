//! # ABI Serializer
//!
//! Decodes packed contract payloads into named-field JSON using an account's
//! ABI.
//!
//! ## Binary Format
//!
//! | Type | Encoding |
//! |------|----------|
//! | `bool` | one byte, 0 or 1 |
//! | `uint8`..`uint64`, `int8`..`int64` | fixed-width little endian |
//! | `varuint32` | LEB128, at most 5 bytes |
//! | `string` | `varuint32` length + UTF-8 |
//! | `bytes` | `varuint32` length + raw bytes (rendered as hex) |
//! | `account` | `uint64` instance (rendered as `1.2.N`) |
//! | `T[]` | `varuint32` count + elements |
//! | `T?` | one flag byte + `T` when the flag is 1 |
//! | struct | base struct fields, then own fields, in declaration order |
//!
//! Decoding must consume the payload exactly.

use crate::domain::errors::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::AccountId;
use std::collections::HashMap;

/// Bound on type nesting (arrays, optionals, structs, typedefs).
pub const MAX_DECODE_DEPTH: usize = 32;

// =============================================================================
// ABI DEFINITION
// =============================================================================

/// ABI document as published by a contract account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiDefinition {
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

/// Type alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Callable method: argument struct and optional return type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub result_type: Option<String>,
}

// =============================================================================
// BUILT-IN TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinType {
    Bool,
    Unsigned(usize),
    Signed(usize),
    VarUint32,
    String,
    Bytes,
    Account,
}

impl BuiltinType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "uint8" => Self::Unsigned(1),
            "uint16" => Self::Unsigned(2),
            "uint32" => Self::Unsigned(4),
            "uint64" => Self::Unsigned(8),
            "int8" => Self::Signed(1),
            "int16" => Self::Signed(2),
            "int32" => Self::Signed(4),
            "int64" => Self::Signed(8),
            "varuint32" => Self::VarUint32,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            "account" => Self::Account,
            _ => return None,
        })
    }

    fn read(self, reader: &mut Reader<'_>, ty: &str) -> Result<Value, SchemaError> {
        match self {
            Self::Bool => match reader.read_u8(ty)? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(decode_error(ty, format!("invalid bool byte {other}"))),
            },
            Self::Unsigned(width) => {
                let mut buf = [0u8; 8];
                buf[..width].copy_from_slice(reader.take(width, ty)?);
                Ok(Value::from(u64::from_le_bytes(buf)))
            }
            Self::Signed(width) => {
                let bytes = reader.take(width, ty)?;
                let fill = if bytes[width - 1] & 0x80 != 0 { 0xff } else { 0 };
                let mut buf = [fill; 8];
                buf[..width].copy_from_slice(bytes);
                Ok(Value::from(i64::from_le_bytes(buf)))
            }
            Self::VarUint32 => Ok(Value::from(reader.read_varuint32(ty)?)),
            Self::String => {
                let len = reader.read_varuint32(ty)? as usize;
                let bytes = reader.take(len, ty)?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| decode_error(ty, format!("invalid utf-8: {e}")))?;
                Ok(Value::String(text.to_string()))
            }
            Self::Bytes => {
                let len = reader.read_varuint32(ty)? as usize;
                Ok(Value::String(hex::encode(reader.take(len, ty)?)))
            }
            Self::Account => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(reader.take(8, ty)?);
                Ok(Value::String(
                    AccountId(u64::from_le_bytes(buf)).to_string(),
                ))
            }
        }
    }
}

fn decode_error(ty: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::Decode {
        type_name: ty.to_string(),
        message: message.into(),
    }
}

fn unknown_type(ty: &str) -> SchemaError {
    SchemaError::UnknownType {
        type_name: ty.to_string(),
    }
}

// =============================================================================
// READER
// =============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, ty: &str) -> Result<&'a [u8], SchemaError> {
        if n > self.remaining() {
            return Err(decode_error(
                ty,
                format!("need {n} bytes, {} left", self.remaining()),
            ));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self, ty: &str) -> Result<u8, SchemaError> {
        Ok(self.take(1, ty)?[0])
    }

    fn read_varuint32(&mut self, ty: &str) -> Result<u32, SchemaError> {
        let mut value: u64 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8(ty)?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return u32::try_from(value)
                    .map_err(|_| decode_error(ty, "varuint32 overflow"));
            }
        }
        Err(decode_error(ty, "varuint32 longer than 5 bytes"))
    }
}

// =============================================================================
// SERIALIZER
// =============================================================================

/// Validated, lookup-ready form of an [`AbiDefinition`].
#[derive(Debug, Clone)]
pub struct AbiSerializer {
    typedefs: HashMap<String, String>,
    structs: HashMap<String, StructDef>,
    actions: HashMap<String, ActionDef>,
}

impl AbiSerializer {
    /// Parse and validate ABI JSON.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let definition: AbiDefinition =
            serde_json::from_str(json).map_err(|e| SchemaError::Parse {
                message: e.to_string(),
            })?;
        Self::new(definition)
    }

    /// Validate a definition: unique names, every referenced type resolvable,
    /// base chains bounded.
    pub fn new(definition: AbiDefinition) -> Result<Self, SchemaError> {
        let mut serializer = Self {
            typedefs: HashMap::new(),
            structs: HashMap::new(),
            actions: HashMap::new(),
        };

        for typedef in definition.types {
            if serializer
                .typedefs
                .insert(typedef.new_type_name.clone(), typedef.type_name)
                .is_some()
            {
                return Err(duplicate("type", &typedef.new_type_name));
            }
        }
        for def in definition.structs {
            let name = def.name.clone();
            if serializer.structs.insert(name.clone(), def).is_some() {
                return Err(duplicate("struct", &name));
            }
        }
        for action in definition.actions {
            let name = action.name.clone();
            if serializer.actions.insert(name.clone(), action).is_some() {
                return Err(duplicate("action", &name));
            }
        }

        serializer.validate()?;
        Ok(serializer)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for target in self.typedefs.values() {
            self.check_type(target, 0)?;
        }
        for def in self.structs.values() {
            let mut base = def.base.as_str();
            let mut hops = 0;
            while !base.is_empty() {
                hops += 1;
                if hops > MAX_DECODE_DEPTH {
                    return Err(SchemaError::DepthExceeded {
                        max: MAX_DECODE_DEPTH,
                    });
                }
                base = self
                    .structs
                    .get(base)
                    .ok_or_else(|| unknown_type(base))?
                    .base
                    .as_str();
            }
            for field in &def.fields {
                self.check_type(&field.type_name, 0)?;
            }
        }
        for action in self.actions.values() {
            self.check_type(&action.type_name, 0)?;
            if let Some(result_type) = &action.result_type {
                self.check_type(result_type, 0)?;
            }
        }
        Ok(())
    }

    fn check_type(&self, ty: &str, depth: usize) -> Result<(), SchemaError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(SchemaError::DepthExceeded {
                max: MAX_DECODE_DEPTH,
            });
        }
        if let Some(inner) = ty.strip_suffix("[]").or_else(|| ty.strip_suffix('?')) {
            return self.check_type(inner, depth + 1);
        }
        if BuiltinType::parse(ty).is_some() || self.structs.contains_key(ty) {
            return Ok(());
        }
        match self.typedefs.get(ty) {
            Some(target) => self.check_type(target, depth + 1),
            None => Err(unknown_type(ty)),
        }
    }

    /// Decode call arguments. `Ok(None)` when the method is not declared.
    pub fn decode_action(&self, method: &str, data: &[u8]) -> Result<Option<Value>, SchemaError> {
        match self.actions.get(method) {
            Some(action) => self.decode(&action.type_name, data).map(Some),
            None => Ok(None),
        }
    }

    /// Decode a return value. `Ok(None)` when no result type is declared.
    pub fn decode_result(&self, method: &str, data: &[u8]) -> Result<Option<Value>, SchemaError> {
        match self
            .actions
            .get(method)
            .and_then(|action| action.result_type.as_deref())
        {
            Some(result_type) => self.decode(result_type, data).map(Some),
            None => Ok(None),
        }
    }

    /// Decode `data` as `type_name`, requiring every byte to be consumed.
    pub fn decode(&self, type_name: &str, data: &[u8]) -> Result<Value, SchemaError> {
        let mut reader = Reader::new(data);
        let value = self.read_value(type_name, &mut reader, 0)?;
        if reader.remaining() > 0 {
            return Err(decode_error(
                type_name,
                format!("{} trailing bytes", reader.remaining()),
            ));
        }
        Ok(value)
    }

    fn read_value(
        &self,
        ty: &str,
        reader: &mut Reader<'_>,
        depth: usize,
    ) -> Result<Value, SchemaError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(SchemaError::DepthExceeded {
                max: MAX_DECODE_DEPTH,
            });
        }

        if let Some(inner) = ty.strip_suffix("[]") {
            let count = reader.read_varuint32(ty)? as usize;
            // Every element occupies at least one byte.
            if count > reader.remaining() {
                return Err(decode_error(
                    ty,
                    format!("{count} elements but {} bytes left", reader.remaining()),
                ));
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(self.read_value(inner, reader, depth + 1)?);
            }
            return Ok(Value::Array(items));
        }

        if let Some(inner) = ty.strip_suffix('?') {
            return match reader.read_u8(ty)? {
                0 => Ok(Value::Null),
                1 => self.read_value(inner, reader, depth + 1),
                other => Err(decode_error(ty, format!("invalid optional flag {other}"))),
            };
        }

        if let Some(builtin) = BuiltinType::parse(ty) {
            return builtin.read(reader, ty);
        }

        if let Some(def) = self.structs.get(ty) {
            let mut object = Map::new();
            self.read_struct(def, reader, &mut object, depth + 1)?;
            return Ok(Value::Object(object));
        }

        match self.typedefs.get(ty) {
            Some(target) => self.read_value(target, reader, depth + 1),
            None => Err(unknown_type(ty)),
        }
    }

    fn read_struct(
        &self,
        def: &StructDef,
        reader: &mut Reader<'_>,
        object: &mut Map<String, Value>,
        depth: usize,
    ) -> Result<(), SchemaError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(SchemaError::DepthExceeded {
                max: MAX_DECODE_DEPTH,
            });
        }
        if !def.base.is_empty() {
            let base = self
                .structs
                .get(&def.base)
                .ok_or_else(|| unknown_type(&def.base))?;
            self.read_struct(base, reader, object, depth + 1)?;
        }
        for field in &def.fields {
            let value = self.read_value(&field.type_name, reader, depth + 1)?;
            object.insert(field.name.clone(), value);
        }
        Ok(())
    }
}

fn duplicate(kind: &str, name: &str) -> SchemaError {
    SchemaError::Parse {
        message: format!("duplicate {kind} {name}"),
    }
}
