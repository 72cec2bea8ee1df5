//! Validation schema fragments and their extension merge.
//!
//! # Responsibilities
//! - Parse the `schema` export of a module into per-target fragments
//! - Merge fragments for the same target by extension
//!
//! # Design Decisions
//! - Targets are a closed set; unknown targets are reported, not kept
//! - Extension is a deep merge: objects merge key by key, `required`
//!   arrays are unioned in order, anything else is replaced by the later value
//! - Merging zero fragments yields no schema at all, not an empty one

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// Part of a request a schema validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaTarget {
    Headers,
    Query,
    Querystring,
    Params,
    Body,
}

impl SchemaTarget {
    pub const ALL: [SchemaTarget; 5] = [
        SchemaTarget::Headers,
        SchemaTarget::Query,
        SchemaTarget::Querystring,
        SchemaTarget::Params,
        SchemaTarget::Body,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaTarget::Headers => "headers",
            SchemaTarget::Query => "query",
            SchemaTarget::Querystring => "querystring",
            SchemaTarget::Params => "params",
            SchemaTarget::Body => "body",
        }
    }
}

impl fmt::Display for SchemaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaTarget {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaTarget::ALL.iter().copied().find(|t| t.as_str() == s).ok_or(())
    }
}

/// A mapping from validation target to a JSON schema object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaFragment {
    targets: BTreeMap<SchemaTarget, Value>,
}

/// The merged schema attached to a route.
pub type RouteSchema = SchemaFragment;

impl SchemaFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: SchemaTarget, schema: Value) -> Self {
        self.targets.insert(target, schema);
        self
    }

    pub fn get(&self, target: SchemaTarget) -> Option<&Value> {
        self.targets.get(&target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SchemaTarget, &Value)> {
        self.targets.iter().map(|(t, v)| (*t, v))
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Parse a module's `schema` value.
    ///
    /// Returns the fragment and the names of keys that are not validation
    /// targets. Fails if the value, or any target's schema, is not an object.
    pub fn from_json(value: &Value) -> Result<(Self, Vec<String>), String> {
        let object = value
            .as_object()
            .ok_or_else(|| "`schema` must be a table".to_string())?;

        let mut fragment = SchemaFragment::new();
        let mut unknown = Vec::new();
        for (key, schema) in object {
            match key.parse::<SchemaTarget>() {
                Ok(target) => {
                    if !schema.is_object() {
                        return Err(format!("`schema.{}` must be a table", key));
                    }
                    fragment.targets.insert(target, schema.clone());
                }
                Err(()) => unknown.push(key.clone()),
            }
        }
        Ok((fragment, unknown))
    }

    /// Extend this fragment with `other`, target by target.
    pub fn extend(&mut self, other: &SchemaFragment) {
        for (target, schema) in &other.targets {
            match self.targets.get_mut(target) {
                Some(existing) => extend_schema(existing, schema),
                None => {
                    self.targets.insert(*target, schema.clone());
                }
            }
        }
    }
}

/// Merge fragments left to right; `None` when there is nothing to merge.
pub fn merge_fragments<'a, I>(fragments: I) -> Option<RouteSchema>
where
    I: IntoIterator<Item = &'a SchemaFragment>,
{
    let mut iter = fragments.into_iter();
    let mut merged = iter.next()?.clone();
    for fragment in iter {
        merged.extend(fragment);
    }
    Some(merged)
}

/// Deep-merge `ext` into `base`.
pub fn extend_schema(base: &mut Value, ext: &Value) {
    match (base, ext) {
        (Value::Object(base), Value::Object(ext)) => {
            for (key, value) in ext {
                match base.get_mut(key) {
                    Some(Value::Array(existing)) if key == "required" => {
                        if let Value::Array(extra) = value {
                            for item in extra {
                                if !existing.contains(item) {
                                    existing.push(item.clone());
                                }
                            }
                        } else {
                            *existing = vec![value.clone()];
                        }
                    }
                    Some(existing) if existing.is_object() && value.is_object() => {
                        extend_schema(existing, value);
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, ext) => *base = ext.clone(),
    }
}
