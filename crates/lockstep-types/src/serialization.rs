//! A recursive, dynamic data type for serializable simulation state.
//!
//! [`Node`] is the in-memory contract for exported slave and algorithm
//! state: a tagged tree with scalar leaves and array/map composites. The
//! on-disk encoding is chosen by each backend and is not defined here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A tree node holding structured, serializable data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Bool(bool),
    /// A raw byte, distinct from `U8` so binary tags survive round trips.
    Byte(u8),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    /// An ordered sequence of nodes.
    Array(Vec<Node>),
    /// A string-keyed dictionary of nodes.
    Map(BTreeMap<String, Node>),
    /// Arbitrary binary data.
    Bytes(Vec<u8>),
}

impl Node {
    /// Returns an empty map node.
    pub fn empty_map() -> Node {
        Node::Map(BTreeMap::new())
    }

    /// Returns the value as a signed integer if the node holds one of the
    /// integer leaf types that fit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::U8(v) => Some(i64::from(*v)),
            Node::I8(v) => Some(i64::from(*v)),
            Node::U16(v) => Some(i64::from(*v)),
            Node::I16(v) => Some(i64::from(*v)),
            Node::U32(v) => Some(i64::from(*v)),
            Node::I32(v) => Some(i64::from(*v)),
            Node::U64(v) => i64::try_from(*v).ok(),
            Node::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float if the node holds `F32` or `F64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::F32(v) => Some(f64::from(*v)),
            Node::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a bool if the node holds `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice if the node holds `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the contained array, if any.
    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the contained map, if any.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Looks up a key in a map node.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Node {
        Node::Bool(v)
    }
}

impl From<i32> for Node {
    fn from(v: i32) -> Node {
        Node::I32(v)
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Node {
        Node::I64(v)
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Node {
        Node::F64(v)
    }
}

impl From<String> for Node {
    fn from(v: String) -> Node {
        Node::String(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Node {
        Node::String(v.to_string())
    }
}

impl From<Vec<Node>> for Node {
    fn from(v: Vec<Node>) -> Node {
        Node::Array(v)
    }
}

impl From<BTreeMap<String, Node>> for Node {
    fn from(v: BTreeMap<String, Node>) -> Node {
        Node::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Node::I32(-4).as_i64(), Some(-4));
        assert_eq!(Node::U64(u64::MAX).as_i64(), None);
        assert_eq!(Node::F32(0.5).as_f64(), Some(0.5));
        assert_eq!(Node::from("hi").as_str(), Some("hi"));
        assert_eq!(Node::Bool(true).as_bool(), Some(true));
        assert_eq!(Node::I32(1).as_f64(), None);
    }

    #[test]
    fn test_map_lookup() {
        let mut m = BTreeMap::new();
        m.insert("step".to_string(), Node::I64(42));
        m.insert(
            "factors".to_string(),
            Node::Array(vec![Node::I32(1), Node::I32(3)]),
        );
        let node = Node::Map(m);
        assert_eq!(node.get("step").and_then(Node::as_i64), Some(42));
        assert_eq!(node.get("factors").and_then(|n| n.as_array()).map(|a| a.len()), Some(2));
        assert!(node.get("missing").is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut m = BTreeMap::new();
        m.insert("blob".to_string(), Node::Bytes(vec![1, 2, 3]));
        m.insert("name".to_string(), Node::from("slave"));
        let node = Node::Map(m);
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
