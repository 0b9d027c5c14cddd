//! Hierarchical keys
//!
//! A key is a path of (kind, id-or-name) elements. Every prefix of a key's
//! path is the key of one of its ancestors, which is what the native
//! ancestor scope filters on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local identifier of one path element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Numeric id, usually store-allocated
    Id(i64),
    /// Application-chosen name
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Id(id) => write!(f, "{}", id),
            KeyId::Name(name) => write!(f, "'{}'", name),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        KeyId::Id(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        KeyId::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        KeyId::Name(name)
    }
}

/// One element of a key path. `id` is `None` while the key is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    pub id: Option<KeyId>,
}

/// A hierarchical datastore key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    path: Vec<PathElement>,
}

impl Key {
    /// Root key of the given kind
    pub fn from_path(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            path: vec![PathElement {
                kind: kind.into(),
                id: Some(id.into()),
            }],
        }
    }

    /// Child key below `parent`
    pub fn with_parent(parent: &Key, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        let mut path = parent.path.clone();
        path.push(PathElement {
            kind: kind.into(),
            id: Some(id.into()),
        });
        Self { path }
    }

    /// Key without a local identifier; the store assigns one on put.
    pub fn incomplete(kind: impl Into<String>, parent: Option<&Key>) -> Self {
        let mut path = parent.map(|p| p.path.clone()).unwrap_or_default();
        path.push(PathElement {
            kind: kind.into(),
            id: None,
        });
        Self { path }
    }

    /// Kind of the last path element
    pub fn kind(&self) -> &str {
        self.path.last().map(|e| e.kind.as_str()).unwrap_or("")
    }

    /// Local identifier of the last path element
    pub fn id_or_name(&self) -> Option<&KeyId> {
        self.path.last().and_then(|e| e.id.as_ref())
    }

    pub fn id(&self) -> Option<i64> {
        match self.id_or_name() {
            Some(KeyId::Id(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self.id_or_name() {
            Some(KeyId::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// Parent key, if this key is not a root
    pub fn parent(&self) -> Option<Key> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Key {
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Returns true if every path element carries an identifier
    pub fn is_complete(&self) -> bool {
        !self.path.is_empty() && self.path.iter().all(|e| e.id.is_some())
    }

    /// Returns a copy of this key with the last element's identifier set
    pub fn completed(&self, id: KeyId) -> Key {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            last.id = Some(id);
        }
        Key { path }
    }

    /// Returns true if `ancestor` is this key or a prefix of its path.
    ///
    /// Ancestor scopes include the scoping entity itself.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        ancestor.path.len() <= self.path.len() && self.path[..ancestor.path.len()] == ancestor.path[..]
    }

    /// Path elements, root first
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match &element.id {
                Some(id) => write!(f, "{}({})", element.kind, id)?,
                None => write!(f, "{}(?)", element.kind)?,
            }
        }
        Ok(())
    }
}
