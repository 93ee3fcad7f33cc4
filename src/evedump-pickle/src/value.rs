//! Decoded object graph and its JSON rendering
//!
//! The machine builds [`Value`]s with memo references left in place so that
//! in-place mutation after a PUT is visible through every GET. References
//! are only resolved when the finished graph is rendered to JSON.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Number, Value as Json};

use crate::{Error, Result};

/// Maximum container nesting accepted while decoding and rendering
pub const MAX_DEPTH: usize = 512;

/// A value on the unpickler stack
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Global { module: String, name: String },
    Object(Box<Object>),
    /// Reference to a memo slot
    Ref(u32),
}

/// An instance reconstructed through REDUCE, NEWOBJ, OBJ or INST
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    pub class: String,
    pub args: Vec<Value>,
    pub state: Option<Value>,
    /// Items added with SETITEM(S), for mapping subclasses
    pub items: Vec<(Value, Value)>,
    /// Elements added with APPEND(S), for sequence subclasses
    pub elements: Vec<Value>,
}

impl Value {
    /// Short type name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Global { .. } => "global",
            Value::Object(_) => "object",
            Value::Ref(_) => "memo reference",
        }
    }
}

/// Python 2 `str` payloads: UTF-8 when valid, otherwise Latin-1
pub fn legacy_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Follow memo references until a concrete value is reached
pub fn deref<'a>(value: &'a Value, memo: &'a HashMap<u32, Value>) -> Result<&'a Value> {
    let mut current = value;
    let mut hops = 0;
    while let Value::Ref(id) = current {
        current = memo.get(id).ok_or(Error::MissingMemo(*id))?;
        hops += 1;
        if hops > memo.len() {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }
    }
    Ok(current)
}

/// Whether an owned value nests containers more than `limit` levels deep
///
/// Memo references count as leaves. Recursion never goes past `limit + 1`
/// frames, so this is safe to call on values of unknown shape.
pub fn nesting_exceeds(value: &Value, limit: usize) -> bool {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            children_exceed(items.iter(), limit)
        }
        Value::Dict(pairs) => children_exceed(pairs.iter().flat_map(|(k, v)| [k, v]), limit),
        Value::Object(obj) => children_exceed(
            obj.args
                .iter()
                .chain(obj.state.iter())
                .chain(obj.items.iter().flat_map(|(k, v)| [k, v]))
                .chain(obj.elements.iter()),
            limit,
        ),
        _ => false,
    }
}

fn children_exceed<'a>(mut children: impl Iterator<Item = &'a Value>, limit: usize) -> bool {
    limit == 0 || children.any(|child| nesting_exceeds(child, limit - 1))
}

/// Render a finished value as JSON, emitting at most `max_nodes` JSON values
///
/// Memo references are expanded at every use, so the budget bounds output
/// built from repeatedly shared slots.
pub fn to_json(value: &Value, memo: &HashMap<u32, Value>, max_nodes: usize) -> Result<Json> {
    Renderer {
        memo,
        remaining: max_nodes,
        max_nodes,
    }
    .render(value, 0)
}

struct Renderer<'m> {
    memo: &'m HashMap<u32, Value>,
    remaining: usize,
    max_nodes: usize,
}

impl Renderer<'_> {
    fn render(&mut self, value: &Value, depth: usize) -> Result<Json> {
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }
        self.remaining = self
            .remaining
            .checked_sub(1)
            .ok_or(Error::OutputTooLarge(self.max_nodes))?;
        let next = depth + 1;
        let memo = self.memo;

        Ok(match deref(value, memo)? {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => int_json(*i),
            Value::Float(f) => Json::from(*f),
            Value::Str(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(STANDARD.encode(b)),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                Json::Array(self.render_all(items, next)?)
            }
            Value::Dict(pairs) => Json::Object(self.render_pairs(pairs, next)?),
            Value::Global { module, name } => Json::String(format!("{}.{}", module, name)),
            Value::Object(obj) => self.render_object(obj, next)?,
            Value::Ref(_) => unreachable!("deref never returns a reference"),
        })
    }

    fn render_all(&mut self, items: &[Value], depth: usize) -> Result<Vec<Json>> {
        items.iter().map(|v| self.render(v, depth)).collect()
    }

    fn render_pairs(&mut self, pairs: &[(Value, Value)], depth: usize) -> Result<Map<String, Json>> {
        let mut map = Map::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = self.render_key(key, depth)?;
            map.insert(key, self.render(value, depth)?);
        }
        Ok(map)
    }

    /// JSON object keys must be strings; scalars use their JSON text
    fn render_key(&mut self, key: &Value, depth: usize) -> Result<String> {
        Ok(match self.render(key, depth)? {
            Json::String(s) => s,
            other => other.to_string(),
        })
    }

    fn render_object(&mut self, obj: &Object, depth: usize) -> Result<Json> {
        let mut map = Map::new();
        map.insert("__class__".to_string(), Json::String(obj.class.clone()));

        if !obj.args.is_empty() {
            let args = self.render_all(&obj.args, depth)?;
            map.insert("__args__".to_string(), Json::Array(args));
        }

        if let Some(state) = &obj.state {
            self.merge_state(&mut map, state, depth)?;
        }

        if !obj.items.is_empty() {
            let items = self.render_pairs(&obj.items, depth)?;
            map.insert("__items__".to_string(), Json::Object(items));
        }

        if !obj.elements.is_empty() {
            let elements = self.render_all(&obj.elements, depth)?;
            map.insert("__elements__".to_string(), Json::Array(elements));
        }

        Ok(Json::Object(map))
    }

    /// Dict state becomes the object's attributes; `(dict, slots)` pairs merge both
    fn merge_state(&mut self, map: &mut Map<String, Json>, state: &Value, depth: usize) -> Result<()> {
        let memo = self.memo;
        match deref(state, memo)? {
            Value::None => {}
            Value::Dict(pairs) => {
                let attrs = self.render_pairs(pairs, depth)?;
                map.extend(attrs);
            }
            Value::Tuple(parts)
                if parts.len() == 2
                    && parts.iter().all(|p| {
                        matches!(deref(p, memo), Ok(Value::Dict(_)) | Ok(Value::None))
                    }) =>
            {
                for part in parts {
                    self.merge_state(map, part, depth)?;
                }
            }
            _ => {
                let rendered = self.render(state, depth)?;
                map.insert("__state__".to_string(), rendered);
            }
        }
        Ok(())
    }
}

fn int_json(i: i128) -> Json {
    if let Ok(v) = i64::try_from(i) {
        Json::Number(Number::from(v))
    } else if let Ok(v) = u64::try_from(i) {
        Json::Number(Number::from(v))
    } else {
        Json::String(i.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BUDGET: usize = 1_000;

    fn no_memo() -> HashMap<u32, Value> {
        HashMap::new()
    }

    #[test]
    fn test_legacy_text() {
        assert_eq!(legacy_text(b"Jita"), "Jita");
        assert_eq!(legacy_text(&[0x41, 0xe9]), "A\u{e9}");
    }

    #[test]
    fn test_large_ints_become_strings() {
        let memo = no_memo();
        assert_eq!(to_json(&Value::Int(-5), &memo, BUDGET).unwrap(), json!(-5));
        assert_eq!(to_json(&Value::Int(u64::MAX as i128), &memo, BUDGET).unwrap(), json!(u64::MAX));
        assert_eq!(
            to_json(&Value::Int(1i128 << 70), &memo, BUDGET).unwrap(),
            json!("1180591620717411303424")
        );
    }

    #[test]
    fn test_non_string_keys() {
        let memo = no_memo();
        let dict = Value::Dict(vec![
            (Value::Int(30000001), Value::Str("Jita".into())),
            (Value::None, Value::Bool(true)),
            (
                Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
                Value::Int(3),
            ),
        ]);
        let rendered = to_json(&dict, &memo, BUDGET).unwrap();
        assert_eq!(rendered["30000001"], json!("Jita"));
        assert_eq!(rendered["null"], json!(true));
        assert_eq!(rendered["[1,2]"], json!(3));
    }

    #[test]
    fn test_object_state_merge() {
        let memo = no_memo();
        let obj = Value::Object(Box::new(Object {
            class: "util.KeyVal".into(),
            state: Some(Value::Dict(vec![(
                Value::Str("name".into()),
                Value::Str("Amarr".into()),
            )])),
            ..Object::default()
        }));
        assert_eq!(
            to_json(&obj, &memo, BUDGET).unwrap(),
            json!({"__class__": "util.KeyVal", "name": "Amarr"})
        );
    }

    #[test]
    fn test_memo_references_resolve() {
        let mut memo = HashMap::new();
        memo.insert(0, Value::List(vec![Value::Int(1)]));
        memo.insert(1, Value::Ref(0));
        let value = Value::Tuple(vec![Value::Ref(0), Value::Ref(1)]);
        assert_eq!(to_json(&value, &memo, BUDGET).unwrap(), json!([[1], [1]]));
    }

    #[test]
    fn test_self_reference_hits_limit() {
        let mut memo = HashMap::new();
        memo.insert(0, Value::List(vec![Value::Ref(0)]));
        let err = to_json(&Value::Ref(0), &memo, BUDGET).unwrap_err();
        assert!(matches!(err, Error::RecursionLimit(_)));
    }

    #[test]
    fn test_shared_slots_hit_node_budget() {
        // Each slot is a pair of references to the previous one
        let mut memo = HashMap::new();
        memo.insert(0, Value::Int(1));
        for id in 1..40 {
            memo.insert(id, Value::Tuple(vec![Value::Ref(id - 1), Value::Ref(id - 1)]));
        }
        let err = to_json(&Value::Ref(39), &memo, BUDGET).unwrap_err();
        assert!(matches!(err, Error::OutputTooLarge(BUDGET)));

        let small = to_json(&Value::Ref(3), &memo, BUDGET).unwrap();
        assert_eq!(small, json!([[[1, 1], [1, 1]], [[1, 1], [1, 1]]]));
    }

    #[test]
    fn test_nesting_exceeds() {
        let mut value = Value::Int(0);
        for _ in 0..10 {
            value = Value::List(vec![value]);
        }
        assert!(!nesting_exceeds(&value, 10));
        assert!(nesting_exceeds(&value, 9));
        assert!(!nesting_exceeds(&Value::Ref(3), 0));
        assert!(nesting_exceeds(&Value::Tuple(Vec::new()), 0));

        let obj = Value::Object(Box::new(Object {
            class: "x.Y".into(),
            state: Some(Value::Dict(vec![(Value::None, Value::List(Vec::new()))])),
            ..Object::default()
        }));
        assert!(!nesting_exceeds(&obj, 3));
        assert!(nesting_exceeds(&obj, 2));
    }

    #[test]
    fn test_missing_memo() {
        let err = to_json(&Value::Ref(7), &no_memo(), BUDGET).unwrap_err();
        assert!(matches!(err, Error::MissingMemo(7)));
    }
}
