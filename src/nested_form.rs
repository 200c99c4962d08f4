//! Bracketed form decoding.
//!
//! Kommo posts webhook bodies as flat `application/x-www-form-urlencoded`
//! pairs such as `message[add][0][text]=hi`. This module rebuilds the tree
//! those keys describe.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Largest list index accepted in a key. Every skipped index is padded, so
/// this also bounds the memory a single key can claim.
pub const MAX_LIST_INDEX: usize = 1_000;

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\[\]]+)((?:\[[^\[\]]+\])*)$").expect("valid key regex"));
static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("valid segment regex"));

/// A decoded form value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(String),
    List(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

/// Shape of a node, used to report conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Leaf,
    List,
    Map,
}

/// One step of a key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormParseError {
    /// Key does not follow `name[segment]...`.
    MalformedKey { key: String, reason: &'static str },
    /// Key addresses an existing node with the wrong shape.
    ShapeConflict {
        key: String,
        segment: String,
        expected: Shape,
        found: Shape,
    },
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Leaf => write!(f, "value"),
            Shape::List => write!(f, "list"),
            Shape::Map => write!(f, "map"),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(name) => write!(f, "{}", name),
            Segment::Index(idx) => write!(f, "{}", idx),
        }
    }
}

impl fmt::Display for FormParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormParseError::MalformedKey { key, reason } => {
                write!(f, "malformed form key '{}': {}", key, reason)
            }
            FormParseError::ShapeConflict {
                key,
                segment,
                expected,
                found,
            } => write!(
                f,
                "form key '{}' expects a {} at '{}' but found a {}",
                key, expected, segment, found
            ),
        }
    }
}

impl std::error::Error for FormParseError {}

impl Segment {
    /// Shape a container must have to be addressed by this segment.
    fn container_shape(&self) -> Shape {
        match self {
            Segment::Key(_) => Shape::Map,
            Segment::Index(_) => Shape::List,
        }
    }
}

impl Shape {
    fn empty_node(self) -> Node {
        match self {
            Shape::Leaf => Node::Leaf(String::new()),
            Shape::List => Node::List(Vec::new()),
            Shape::Map => Node::Map(BTreeMap::new()),
        }
    }
}

impl Node {
    pub fn shape(&self) -> Shape {
        match self {
            Node::Leaf(_) => Shape::Leaf,
            Node::List(_) => Shape::List,
            Node::Map(_) => Shape::Map,
        }
    }

    /// Child of a map node.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Element of a list node.
    pub fn at(&self, index: usize) -> Option<&Node> {
        match self {
            Node::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Leaf(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Padding placeholders are empty maps; they take the shape of their first access.
    fn is_placeholder(&self) -> bool {
        matches!(self, Node::Map(map) if map.is_empty())
    }

    fn accepts_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_)) || self.is_placeholder()
    }

    fn adopt_shape_for(&mut self, segment: &Segment) {
        if self.is_placeholder() && segment.container_shape() == Shape::List {
            *self = Node::List(Vec::new());
        }
    }
}

/// Splits `name[a][0][b]` into its segments. The leading name is always a key.
pub fn split_key(key: &str) -> Result<Vec<Segment>, FormParseError> {
    let malformed = |reason| FormParseError::MalformedKey {
        key: key.to_string(),
        reason,
    };

    let caps = KEY_RE
        .captures(key)
        .ok_or_else(|| malformed("expected name followed by non-empty [segment] parts"))?;

    let mut segments = vec![Segment::Key(caps[1].to_string())];
    for seg in SEGMENT_RE.captures_iter(&caps[2]) {
        let raw = &seg[1];
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let index: usize = raw.parse().map_err(|_| malformed("list index out of range"))?;
            if index > MAX_LIST_INDEX {
                return Err(malformed("list index out of range"));
            }
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Key(raw.to_string()));
        }
    }

    Ok(segments)
}

/// Rebuilds the nested structure described by bracketed form keys.
///
/// Intermediate nodes are created as lists when the next segment of the
/// same key is an integer and as maps otherwise. Lists are padded with
/// empty maps, never holes. Repeating a key overwrites the earlier value.
pub fn parse_nested_form<I, K, V>(pairs: I) -> Result<Node, FormParseError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut root = Node::Map(BTreeMap::new());
    for (key, value) in pairs {
        let key = key.as_ref();
        let segments = split_key(key)?;
        insert(&mut root, key, &segments, value.into())?;
    }
    Ok(root)
}

fn insert(
    root: &mut Node,
    key: &str,
    segments: &[Segment],
    value: String,
) -> Result<(), FormParseError> {
    let Some((last, path)) = segments.split_last() else {
        return Err(FormParseError::MalformedKey {
            key: key.to_string(),
            reason: "empty key",
        });
    };

    let mut node = root;
    for (i, segment) in path.iter().enumerate() {
        let child_shape = segments[i + 1].container_shape();
        node = descend(node, key, segment, child_shape)?;
    }

    set_leaf(node, key, last, value)
}

fn conflict(key: &str, segment: &Segment, expected: Shape, found: Shape) -> FormParseError {
    FormParseError::ShapeConflict {
        key: key.to_string(),
        segment: segment.to_string(),
        expected,
        found,
    }
}

/// Makes room for `index`, padding skipped slots with empty maps.
fn pad(items: &mut Vec<Node>, index: usize) {
    while items.len() < index {
        items.push(Node::Map(BTreeMap::new()));
    }
}

fn descend<'a>(
    node: &'a mut Node,
    key: &str,
    segment: &Segment,
    child_shape: Shape,
) -> Result<&'a mut Node, FormParseError> {
    node.adopt_shape_for(segment);
    let found = node.shape();

    match (node, segment) {
        (Node::Map(map), Segment::Key(name)) => Ok(map
            .entry(name.clone())
            .or_insert_with(|| child_shape.empty_node())),
        (Node::List(items), Segment::Index(index)) => {
            pad(items, *index);
            if *index == items.len() {
                items.push(child_shape.empty_node());
            }
            Ok(&mut items[*index])
        }
        (_, segment) => Err(conflict(key, segment, segment.container_shape(), found)),
    }
}

fn set_leaf(
    node: &mut Node,
    key: &str,
    segment: &Segment,
    value: String,
) -> Result<(), FormParseError> {
    node.adopt_shape_for(segment);
    let found = node.shape();

    let slot = match (node, segment) {
        (Node::Map(map), Segment::Key(name)) => map
            .entry(name.clone())
            .or_insert_with(|| Shape::Leaf.empty_node()),
        (Node::List(items), Segment::Index(index)) => {
            pad(items, *index);
            if *index == items.len() {
                items.push(Shape::Leaf.empty_node());
            }
            &mut items[*index]
        }
        (_, segment) => return Err(conflict(key, segment, segment.container_shape(), found)),
    };

    if !slot.accepts_leaf() {
        return Err(conflict(key, segment, Shape::Leaf, slot.shape()));
    }
    *slot = Node::Leaf(value);
    Ok(())
}
