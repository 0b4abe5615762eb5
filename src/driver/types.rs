//! Driver Types
//!
//! Client-side values. Records arrive as PackStream values and are hydrated
//! into [`Value`], turning the graph structures into [`Node`],
//! [`Relationship`] and [`Path`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DriverError;
use crate::bolt::packstream::marker;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

// ============================================================================
// Value
// ============================================================================

/// A value in a record or a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer (i64)
    Integer(i64),
    /// Float (f64)
    Float(f64),
    /// String
    String(String),
    /// Bytes
    Bytes(Vec<u8>),
    /// List
    List(Vec<Value>),
    /// Map
    Map(HashMap<String, Value>),
    /// Node
    Node(Node),
    /// Relationship
    Relationship(Relationship),
    /// Path
    Path(Path),
    /// Structure the driver has no type for
    Structure {
        /// Signature byte
        tag: u8,
        /// Hydrated fields
        fields: Vec<Value>,
    },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::Path(_) => "Path",
            Value::Structure { .. } => "Structure",
        }
    }

    /// Parameter normalization: byte strings that hold UTF-8 text are sent as
    /// strings, everything else is left alone.
    pub(crate) fn normalized(self) -> Value {
        match self {
            Value::Bytes(raw) => match String::from_utf8(raw) {
                Ok(text) => Value::String(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, entries[key])?;
                }
                write!(f, "}}")
            }
            Value::Node(n) => write!(f, "{}", n),
            Value::Relationship(r) => write!(f, "{}", r),
            Value::Path(p) => write!(f, "{}", p),
            Value::Structure { tag, fields } => {
                write!(f, "<Structure 0x{:02X}, {} fields>", tag, fields.len())
            }
        }
    }
}

// ============================================================================
// From implementations
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Node
// ============================================================================

/// A node and its properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, Value>) -> Self {
        Self {
            id,
            labels,
            properties,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(_{}", self.id)?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        write!(f, ")")
    }
}

// ============================================================================
// Relationship
// ============================================================================

/// A relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl Relationship {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(_{})-[:{}]->(_{})",
            self.start_node_id, self.rel_type, self.end_node_id
        )
    }
}

// ============================================================================
// Path
// ============================================================================

/// An alternating sequence of nodes and relationships. `nodes` has one more
/// entry than `relationships`; relationship `i` joins node `i` and node
/// `i + 1` in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl Path {
    /// Number of relationships.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Path: {} nodes, {} rels>", self.nodes.len(), self.relationships.len())
    }
}

// ============================================================================
// Hydration: PackStreamValue -> Value
// ============================================================================

impl From<PackStreamValue> for Value {
    fn from(value: PackStreamValue) -> Self {
        match value {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => Value::Integer(i),
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::List(l) => Value::List(l.into_iter().map(Into::into).collect()),
            PackStreamValue::Map(m) => Value::Map(hydrate_map(m)),
            PackStreamValue::Structure(s) => hydrate_structure(s),
        }
    }
}

fn hydrate_map(map: HashMap<String, PackStreamValue>) -> HashMap<String, Value> {
    map.into_iter().map(|(k, v)| (k, v.into())).collect()
}

fn hydrate_structure(s: PackStreamStructure) -> Value {
    let hydrated = match s.tag {
        marker::NODE => node_from_fields(&s.fields).map(Value::Node),
        marker::RELATIONSHIP => relationship_from_fields(&s.fields).map(Value::Relationship),
        marker::PATH => path_from_fields(&s.fields).map(Value::Path),
        _ => None,
    };
    // Unbound relationships only make sense inside a path; on their own, and
    // for malformed graph structures, the raw fields are kept.
    hydrated.unwrap_or_else(|| Value::Structure {
        tag: s.tag,
        fields: s.fields.into_iter().map(Into::into).collect(),
    })
}

fn node_from_fields(fields: &[PackStreamValue]) -> Option<Node> {
    match fields {
        [id, labels, properties] => Some(Node {
            id: id.as_int()?,
            labels: labels
                .as_list()?
                .iter()
                .map(|l| l.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?,
            properties: hydrate_map(properties.as_map()?.clone()),
        }),
        _ => None,
    }
}

fn relationship_from_fields(fields: &[PackStreamValue]) -> Option<Relationship> {
    match fields {
        [id, start, end, rel_type, properties] => Some(Relationship {
            id: id.as_int()?,
            start_node_id: start.as_int()?,
            end_node_id: end.as_int()?,
            rel_type: rel_type.as_str()?.to_string(),
            properties: hydrate_map(properties.as_map()?.clone()),
        }),
        _ => None,
    }
}

/// An unbound relationship: `(id, type, properties)`, endpoints known only
/// from its position in a path.
fn unbound_from_value(value: &PackStreamValue) -> Option<(i64, String, HashMap<String, Value>)> {
    let s = value.as_structure()?;
    if s.tag != marker::UNBOUND_RELATIONSHIP {
        return None;
    }
    match s.fields.as_slice() {
        [id, rel_type, properties] => Some((
            id.as_int()?,
            rel_type.as_str()?.to_string(),
            hydrate_map(properties.as_map()?.clone()),
        )),
        _ => None,
    }
}

/// Rebuilds a path from `(nodes, unbound relationships, sequence)`.
///
/// The sequence holds pairs `(rel, node)`: `rel` is a 1-based index into the
/// relationships, negative when traversed against its direction, and `node`
/// indexes the node reached.
fn path_from_fields(fields: &[PackStreamValue]) -> Option<Path> {
    let [nodes, rels, sequence] = fields else {
        return None;
    };
    let nodes = nodes
        .as_list()?
        .iter()
        .map(|n| node_from_fields(&n.as_structure()?.fields))
        .collect::<Option<Vec<_>>>()?;
    let rels = rels
        .as_list()?
        .iter()
        .map(unbound_from_value)
        .collect::<Option<Vec<_>>>()?;
    let sequence = sequence
        .as_list()?
        .iter()
        .map(PackStreamValue::as_int)
        .collect::<Option<Vec<_>>>()?;
    if sequence.len() % 2 != 0 {
        return None;
    }

    let mut last = nodes.first()?.clone();
    let mut path_nodes = vec![last.clone()];
    let mut path_rels = Vec::with_capacity(sequence.len() / 2);
    for pair in sequence.chunks(2) {
        let (rel_index, node_index) = (pair[0], pair[1]);
        let next = nodes.get(usize::try_from(node_index).ok()?)?.clone();
        let (id, rel_type, properties) = rels
            .get(usize::try_from(rel_index.unsigned_abs()).ok()?.checked_sub(1)?)?
            .clone();
        let (start_node_id, end_node_id) = if rel_index > 0 {
            (last.id, next.id)
        } else {
            (next.id, last.id)
        };
        path_rels.push(Relationship {
            id,
            start_node_id,
            end_node_id,
            rel_type,
            properties,
        });
        path_nodes.push(next.clone());
        last = next;
    }

    Some(Path {
        nodes: path_nodes,
        relationships: path_rels,
    })
}

// ============================================================================
// Dehydration: Value -> PackStreamValue (parameters)
// ============================================================================

impl From<Value> for PackStreamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(b),
            Value::Integer(i) => PackStreamValue::Integer(i),
            Value::Float(f) => PackStreamValue::Float(f),
            Value::String(s) => PackStreamValue::String(s),
            Value::Bytes(b) => PackStreamValue::Bytes(b),
            Value::List(l) => PackStreamValue::List(l.into_iter().map(Into::into).collect()),
            Value::Map(m) => PackStreamValue::Map(dehydrate_map(m)),
            Value::Node(n) => node_structure(n),
            Value::Relationship(r) => PackStreamValue::Structure(PackStreamStructure::new(
                marker::RELATIONSHIP,
                vec![
                    r.id.into(),
                    r.start_node_id.into(),
                    r.end_node_id.into(),
                    r.rel_type.into(),
                    PackStreamValue::Map(dehydrate_map(r.properties)),
                ],
            )),
            Value::Path(p) => path_structure(p),
            Value::Structure { tag, fields } => PackStreamValue::Structure(
                PackStreamStructure::new(tag, fields.into_iter().map(Into::into).collect()),
            ),
        }
    }
}

fn dehydrate_map(map: HashMap<String, Value>) -> HashMap<String, PackStreamValue> {
    map.into_iter().map(|(k, v)| (k, v.into())).collect()
}

fn node_structure(n: Node) -> PackStreamValue {
    PackStreamValue::Structure(PackStreamStructure::new(
        marker::NODE,
        vec![
            n.id.into(),
            PackStreamValue::List(n.labels.into_iter().map(Into::into).collect()),
            PackStreamValue::Map(dehydrate_map(n.properties)),
        ],
    ))
}

fn path_structure(p: Path) -> PackStreamValue {
    let mut sequence = Vec::with_capacity(p.relationships.len() * 2);
    for (i, rel) in p.relationships.iter().enumerate() {
        let forward = p.nodes.get(i).map(|n| n.id) == Some(rel.start_node_id);
        let index = i as i64 + 1;
        sequence.push(PackStreamValue::Integer(if forward { index } else { -index }));
        sequence.push(PackStreamValue::Integer(i as i64 + 1));
    }
    let rels = p
        .relationships
        .into_iter()
        .map(|r| {
            PackStreamValue::Structure(PackStreamStructure::new(
                marker::UNBOUND_RELATIONSHIP,
                vec![
                    r.id.into(),
                    r.rel_type.into(),
                    PackStreamValue::Map(dehydrate_map(r.properties)),
                ],
            ))
        })
        .collect();
    PackStreamValue::Structure(PackStreamStructure::new(
        marker::PATH,
        vec![
            PackStreamValue::List(p.nodes.into_iter().map(node_structure).collect()),
            PackStreamValue::List(rels),
            PackStreamValue::List(sequence),
        ],
    ))
}

// ============================================================================
// TryFrom implementations
// ============================================================================

macro_rules! impl_try_from_value {
    ($target:ty, $name:literal, $($pattern:pat => $out:expr),+ $(,)?) => {
        impl TryFrom<Value> for $target {
            type Error = DriverError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $($pattern => Ok($out),)+
                    other => Err(DriverError::type_conversion(format!(
                        "Cannot convert {} to {}",
                        other.type_name(),
                        $name
                    ))),
                }
            }
        }
    };
}

impl_try_from_value!(bool, "bool", Value::Boolean(b) => b);
impl_try_from_value!(i64, "i64", Value::Integer(i) => i);
impl_try_from_value!(f64, "f64", Value::Float(f) => f, Value::Integer(i) => i as f64);
impl_try_from_value!(String, "String", Value::String(s) => s);
impl_try_from_value!(Vec<Value>, "List", Value::List(l) => l);
impl_try_from_value!(HashMap<String, Value>, "Map", Value::Map(m) => m);
impl_try_from_value!(Node, "Node", Value::Node(n) => n);
impl_try_from_value!(Relationship, "Relationship", Value::Relationship(r) => r);
impl_try_from_value!(Path, "Path", Value::Path(p) => p);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, label: &str) -> PackStreamValue {
        PackStreamValue::Structure(PackStreamStructure::new(
            marker::NODE,
            vec![
                id.into(),
                PackStreamValue::List(vec![label.into()]),
                PackStreamValue::Map(HashMap::new()),
            ],
        ))
    }

    fn unbound(id: i64, rel_type: &str) -> PackStreamValue {
        PackStreamValue::Structure(PackStreamStructure::new(
            marker::UNBOUND_RELATIONSHIP,
            vec![id.into(), rel_type.into(), PackStreamValue::Map(HashMap::new())],
        ))
    }

    #[test]
    fn test_hydrate_node() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), PackStreamValue::from("Keanu"));
        let raw = PackStreamValue::Structure(PackStreamStructure::new(
            marker::NODE,
            vec![
                42i64.into(),
                PackStreamValue::List(vec!["Person".into()]),
                PackStreamValue::Map(props),
            ],
        ));

        let value = Value::from(raw);
        let node = value.as_node().unwrap();
        assert_eq!(node.id, 42);
        assert!(node.has_label("Person"));
        assert_eq!(node.get("name"), Some(&Value::from("Keanu")));
        assert_eq!(node.to_string(), "(_42:Person)");
    }

    #[test]
    fn test_hydrate_relationship() {
        let raw = PackStreamValue::Structure(PackStreamStructure::new(
            marker::RELATIONSHIP,
            vec![
                7i64.into(),
                1i64.into(),
                2i64.into(),
                "ACTED_IN".into(),
                PackStreamValue::Map(HashMap::new()),
            ],
        ));
        let rel = Relationship::try_from(Value::from(raw)).unwrap();
        assert_eq!((rel.start_node_id, rel.end_node_id), (1, 2));
        assert_eq!(rel.to_string(), "(_1)-[:ACTED_IN]->(_2)");
    }

    #[test]
    fn test_hydrate_path_follows_sequence_direction() {
        // (a)-[:KNOWS]->(b)<-[:LIKES]-(c)
        let raw = PackStreamValue::Structure(PackStreamStructure::new(
            marker::PATH,
            vec![
                PackStreamValue::List(vec![node(1, "A"), node(2, "B"), node(3, "C")]),
                PackStreamValue::List(vec![unbound(10, "KNOWS"), unbound(11, "LIKES")]),
                PackStreamValue::List(vec![1i64.into(), 1i64.into(), (-2i64).into(), 2i64.into()]),
            ],
        ));

        let path = Path::try_from(Value::from(raw.clone())).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.start().unwrap().id, 1);
        assert_eq!(path.end().unwrap().id, 3);
        assert_eq!(
            (path.relationships[0].start_node_id, path.relationships[0].end_node_id),
            (1, 2)
        );
        assert_eq!(
            (path.relationships[1].start_node_id, path.relationships[1].end_node_id),
            (3, 2)
        );

        assert_eq!(PackStreamValue::from(Value::Path(path)), raw);
    }

    #[test]
    fn test_malformed_graph_structure_kept_raw() {
        let raw = PackStreamValue::Structure(PackStreamStructure::new(
            marker::NODE,
            vec!["not an id".into()],
        ));
        assert!(matches!(
            Value::from(raw),
            Value::Structure { tag: marker::NODE, .. }
        ));
    }

    #[test]
    fn test_try_from_mismatch() {
        let err = i64::try_from(Value::from("x")).unwrap_err();
        assert!(matches!(err, DriverError::TypeConversion(_)));
        assert_eq!(f64::try_from(Value::Integer(2)).unwrap(), 2.0);
    }

    #[test]
    fn test_normalized_bytes() {
        assert_eq!(
            Value::Bytes(b"Keanu".to_vec()).normalized(),
            Value::from("Keanu")
        );
        assert_eq!(
            Value::Bytes(vec![0xFF, 0x00]).normalized(),
            Value::Bytes(vec![0xFF, 0x00])
        );
    }

    #[test]
    fn test_display() {
        let list = Value::from(vec![Value::Null, Value::from(1), Value::from("a")]);
        assert_eq!(list.to_string(), "[null, 1, \"a\"]");
    }
}
