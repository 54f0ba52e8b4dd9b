//! Type-preserving text serialisation of payloads.
//!
//! A plain JSON round trip loses dates, big integers, non-finite numbers and
//! the difference between `null` and "undefined". [`stringify`] therefore
//! writes the plain JSON projection of a [`Value`] together with a tree of
//! type annotations, and [`parse`] uses the tree to restore the original
//! types. The layout is the one superjson uses, so payloads written by a
//! JavaScript producer parse here and the other way round.
//!
//! # Text format
//!
//! ```text
//! {"json": <plain JSON>, "meta": {"values": <tree>}}
//! ```
//!
//! A `<tree>` is one of:
//!
//! - `["<annotation>"]`: the node itself has a type.
//! - `["<annotation>", {"<path>": <tree>, ...}]`: the node and some
//!   descendants have types.
//! - `{"<path>": <tree>, ...}`: only descendants have types.
//!
//! `meta` is omitted when nothing needs an annotation. `<path>` is relative to
//! the node and is the dot-joined list of object keys and array indices
//! leading to the descendant. Inside a key, `\` is written `\\` and `.` is
//! written `\.`. Other `meta` members, such as superjson's `v` and
//! `referentialEqualities`, are ignored.
//!
//! Annotations: `undefined`, `bigint`, `Date`, `regexp`, `number`, `set`, `map`.

pub mod value;

pub use value::{RegExp, Value};

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value as Json};
use thiserror::Error;

use value::{format_date, number_to_json, parse_date, parse_special_number, special_number};

/// Errors produced by [`parse`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text is not JSON at all.
    #[error("serialized payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The top level is not an object with a `json` member.
    #[error("serialized payload has no `json` member")]
    MissingJson,

    /// The `meta` member has the wrong shape.
    #[error("invalid type metadata: {0}")]
    InvalidMeta(String),

    /// An annotation name is not recognised.
    #[error("unknown type annotation: {0}")]
    UnknownAnnotation(String),

    /// The annotated JSON node cannot be converted to the annotated type.
    #[error("value at `{path}` is not a valid {annotation}")]
    InvalidAnnotatedValue {
        path: String,
        annotation: &'static str,
    },

    /// An annotation points at a node that does not exist.
    #[error("type annotation for `{0}` does not match any value")]
    UnresolvedPath(String),
}

/// Type annotation attached to a node of the JSON projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Annotation {
    Undefined,
    BigInt,
    Date,
    RegExp,
    Number,
    Set,
    Map,
}

impl Annotation {
    fn name(self) -> &'static str {
        match self {
            Annotation::Undefined => "undefined",
            Annotation::BigInt => "bigint",
            Annotation::Date => "Date",
            Annotation::RegExp => "regexp",
            Annotation::Number => "number",
            Annotation::Set => "set",
            Annotation::Map => "map",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "undefined" => Annotation::Undefined,
            "bigint" => Annotation::BigInt,
            "Date" => Annotation::Date,
            "regexp" => Annotation::RegExp,
            "number" => Annotation::Number,
            "set" => Annotation::Set,
            "map" => Annotation::Map,
            _ => return None,
        })
    }
}

/// Annotations flattened to absolute paths, as [`parse`] consumes them.
type Annotations = HashMap<Vec<String>, Annotation>;

// ---------------------------------------------------------------------------
// stringify
// ---------------------------------------------------------------------------

/// Serialise `value` to text that [`parse`] restores exactly.
pub fn stringify(value: &Value) -> String {
    let (json, tree) = project(value);

    let mut envelope = Map::new();
    envelope.insert("json".into(), json);
    if let Some(tree) = tree {
        let mut meta = Map::new();
        meta.insert("values".into(), tree);
        envelope.insert("meta".into(), Json::Object(meta));
    }
    Json::Object(envelope).to_string()
}

/// Build the JSON projection of `value` and its annotation tree.
fn project(value: &Value) -> (Json, Option<Json>) {
    let leaf = |a: Annotation| Children::default().finish(Some(a));
    match value {
        Value::Undefined => (Json::Null, leaf(Annotation::Undefined)),
        Value::Null => (Json::Null, None),
        Value::Bool(b) => (Json::Bool(*b), None),
        Value::Number(n) => match number_to_json(*n) {
            Some(json) => (json, None),
            None => (
                Json::String(special_number(*n).into()),
                leaf(Annotation::Number),
            ),
        },
        Value::BigInt(i) => (Json::String(i.to_string()), leaf(Annotation::BigInt)),
        Value::String(s) => (Json::String(s.clone()), None),
        Value::Date(d) => (Json::String(format_date(d)), leaf(Annotation::Date)),
        Value::RegExp(r) => (Json::String(r.to_literal()), leaf(Annotation::RegExp)),
        Value::Array(items) => project_items(items, None),
        Value::Set(items) => project_items(items, Some(Annotation::Set)),
        Value::Map(pairs) => {
            let mut children = Children::default();
            let mut out = Vec::with_capacity(pairs.len());
            for (i, (k, v)) in pairs.iter().enumerate() {
                let (key, key_tree) = project(k);
                let (val, val_tree) = project(v);
                let mut pair = Children::default();
                pair.add("0", key_tree);
                pair.add("1", val_tree);
                children.add(&i.to_string(), pair.finish(None));
                out.push(Json::Array(vec![key, val]));
            }
            (Json::Array(out), children.finish(Some(Annotation::Map)))
        }
        Value::Object(map) => {
            let mut children = Children::default();
            let mut out = Map::new();
            for (k, v) in map {
                let (json, tree) = project(v);
                children.add(k, tree);
                out.insert(k.clone(), json);
            }
            (Json::Object(out), children.finish(None))
        }
    }
}

fn project_items(items: &[Value], annotation: Option<Annotation>) -> (Json, Option<Json>) {
    let mut children = Children::default();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let (json, tree) = project(item);
        children.add(&i.to_string(), tree);
        out.push(json);
    }
    (Json::Array(out), children.finish(annotation))
}

/// Annotation trees of a container's children, keyed by relative path.
#[derive(Default)]
struct Children(Map<String, Json>);

impl Children {
    /// Record the tree of the child at `key`. A child that only has typed
    /// descendants is folded into this map under dotted paths.
    fn add(&mut self, key: &str, tree: Option<Json>) {
        match tree {
            None => {}
            Some(Json::Object(nested)) => {
                for (path, tree) in nested {
                    self.0.insert(format!("{}.{path}", escape_key(key)), tree);
                }
            }
            Some(tree) => {
                self.0.insert(escape_key(key), tree);
            }
        }
    }

    fn finish(self, own: Option<Annotation>) -> Option<Json> {
        match (own, self.0.is_empty()) {
            (Some(a), true) => Some(Json::Array(vec![a.name().into()])),
            (Some(a), false) => Some(Json::Array(vec![a.name().into(), Json::Object(self.0)])),
            (None, true) => None,
            (None, false) => Some(Json::Object(self.0)),
        }
    }
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

/// Parse serialised text back into a [`Value`].
///
/// Accepts the output of [`stringify`] and of superjson.
///
/// # Errors
///
/// Returns [`ParseError`] if `text` is not well-formed serialised output.
pub fn parse(text: &str) -> Result<Value, ParseError> {
    let Json::Object(mut envelope) = serde_json::from_str::<Json>(text)? else {
        return Err(ParseError::MissingJson);
    };
    let json = envelope.remove("json").ok_or(ParseError::MissingJson)?;

    let mut annotations = match envelope.remove("meta") {
        None | Some(Json::Null) => Annotations::new(),
        Some(meta) => read_meta(meta)?,
    };

    let value = revive(json, &mut Vec::new(), &mut annotations)?;

    if let Some(unused) = annotations.keys().next() {
        return Err(ParseError::UnresolvedPath(join_path(unused)));
    }
    Ok(value)
}

fn read_meta(meta: Json) -> Result<Annotations, ParseError> {
    let Json::Object(mut meta) = meta else {
        return Err(ParseError::InvalidMeta("`meta` must be an object".into()));
    };

    let mut out = Annotations::new();
    match meta.remove("values") {
        None | Some(Json::Null) => {}
        Some(tree) => read_tree(tree, &mut Vec::new(), &mut out)?,
    }
    Ok(out)
}

/// Flatten the annotation tree rooted at `origin` into `out`.
fn read_tree(
    tree: Json,
    origin: &mut Vec<String>,
    out: &mut Annotations,
) -> Result<(), ParseError> {
    let items = match tree {
        Json::Object(children) => return read_children(children, origin, out),
        Json::Array(items) => items,
        _ => {
            return Err(ParseError::InvalidMeta(
                "annotation must be an array or an object".into(),
            ))
        }
    };

    let mut items = items.into_iter();
    let annotation = match items.next() {
        Some(Json::String(name)) => match Annotation::from_name(&name) {
            Some(a) => a,
            None => return Err(ParseError::UnknownAnnotation(name)),
        },
        _ => {
            return Err(ParseError::InvalidMeta(
                "annotation must start with a type name".into(),
            ))
        }
    };
    match items.next() {
        None | Some(Json::Null) => {}
        Some(Json::Object(children)) => read_children(children, origin, out)?,
        Some(_) => {
            return Err(ParseError::InvalidMeta(
                "annotation children must be an object".into(),
            ))
        }
    }
    if items.next().is_some() {
        return Err(ParseError::InvalidMeta(
            "annotation has more than two elements".into(),
        ));
    }

    if out.insert(origin.clone(), annotation).is_some() {
        return Err(ParseError::InvalidMeta(format!(
            "`{}` is annotated twice",
            join_path(origin)
        )));
    }
    Ok(())
}

fn read_children(
    children: Map<String, Json>,
    origin: &mut Vec<String>,
    out: &mut Annotations,
) -> Result<(), ParseError> {
    for (path, tree) in children {
        let depth = origin.len();
        origin.extend(split_path(&path)?);
        read_tree(tree, origin, out)?;
        origin.truncate(depth);
    }
    Ok(())
}

/// Rebuild a [`Value`] from `json`, children first, then the annotation at `path`.
fn revive(
    json: Json,
    path: &mut Vec<String>,
    annotations: &mut Annotations,
) -> Result<Value, ParseError> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                path.push(i.to_string());
                out.push(revive(item, path, annotations)?);
                path.pop();
            }
            Value::Array(out)
        }
        Json::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                path.push(k.clone());
                out.insert(k, revive(v, path, annotations)?);
                path.pop();
            }
            Value::Object(out)
        }
    };

    match annotations.remove(path.as_slice()) {
        Some(a) => apply(a, value, path),
        None => Ok(value),
    }
}

fn apply(annotation: Annotation, value: Value, path: &[String]) -> Result<Value, ParseError> {
    let invalid = || ParseError::InvalidAnnotatedValue {
        path: join_path(path),
        annotation: annotation.name(),
    };

    match (annotation, value) {
        (Annotation::Undefined, Value::Null) => Ok(Value::Undefined),
        (Annotation::BigInt, Value::String(s)) => s.parse().map(Value::BigInt).map_err(|_| invalid()),
        (Annotation::Date, Value::String(s)) => parse_date(&s).map(Value::Date).ok_or_else(invalid),
        (Annotation::RegExp, Value::String(s)) => {
            RegExp::from_literal(&s).map(Value::RegExp).ok_or_else(invalid)
        }
        (Annotation::Number, Value::String(s)) => {
            parse_special_number(&s).map(Value::Number).ok_or_else(invalid)
        }
        (Annotation::Set, Value::Array(items)) => Ok(Value::Set(items)),
        (Annotation::Map, Value::Array(pairs)) => pairs
            .into_iter()
            .map(|pair| match pair {
                Value::Array(kv) => <[Value; 2]>::try_from(kv)
                    .map(|[k, v]| (k, v))
                    .map_err(|_| invalid()),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Map),
        _ => Err(invalid()),
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\").replace('.', "\\.")
}

fn join_path(path: &[String]) -> String {
    path.iter()
        .map(|s| escape_key(s))
        .collect::<Vec<_>>()
        .join(".")
}

fn split_path(s: &str) -> Result<Vec<String>, ParseError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(e @ ('\\' | '.')) => current.push(e),
                _ => return Err(ParseError::InvalidMeta(format!("bad escape in path `{s}`"))),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    Ok(segments)
}
