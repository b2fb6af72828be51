//! Dynamic maps used for audit `details` and policy evaluation `context`.
//!
//! §9: "specify as mapping string -> scalar | nested with a canonical JSON encoding
//! for storage and transport; implementers choose any sum-type/variant
//! representation." We choose `serde_json::Value` directly: it already is a
//! string-keyed map of scalar-or-nested values, sqlx maps it to/from Postgres
//! `jsonb` via the `json` feature, and it round-trips through HTTP without any
//! custom variant type to keep in sync.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A canonical `string -> scalar | nested` map, as required by §9. Backed by
/// `BTreeMap` for deterministic key ordering (stable audit log serialization).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(transparent)]
pub struct DynamicMap(pub BTreeMap<String, Value>);

impl DynamicMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<DynamicMap> for Value {
    fn from(map: DynamicMap) -> Self {
        Value::Object(map.0.into_iter().collect())
    }
}

impl sqlx::Type<sqlx::Postgres> for DynamicMap {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Value as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for DynamicMap {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let value: Value = Value::Object(self.0.clone().into_iter().collect());
        <Value as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&value, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for DynamicMap {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <Value as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match raw {
            Value::Object(map) => Ok(DynamicMap(map.into_iter().collect())),
            Value::Null => Ok(DynamicMap::default()),
            other => Err(format!("expected a JSON object, got {other}").into()),
        }
    }
}
