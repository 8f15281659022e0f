use std::{fmt, sync::Arc};

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Location of a value inside the response, shared between everything created beneath it.
#[derive(Clone, Default)]
pub struct ResponsePath(Option<Arc<PathNode>>);

struct PathNode {
    parent: ResponsePath,
    segment: PathSegment,
}

impl ResponsePath {
    pub fn root() -> Self {
        Self(None)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        Self(Some(Arc::new(PathNode {
            parent: self.clone(),
            segment: segment.into(),
        })))
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.as_ref().map(|node| &node.segment)
    }

    pub fn to_vec(&self) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        let mut current = self;
        while let Some(node) = &current.0 {
            segments.push(node.segment.clone());
            current = &node.parent;
        }
        segments.reverse();
        segments
    }
}

impl fmt::Debug for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.to_vec().into_iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_their_parents() {
        let root = ResponsePath::root();
        let list = root.child("items");
        let first = list.child(0);
        let second = list.child(1).child("name");

        assert_eq!(first.to_vec(), vec![PathSegment::from("items"), PathSegment::Index(0)]);
        assert_eq!(second.to_string(), "items.1.name");
        assert_eq!(list.to_vec().len(), 1);
        assert!(root.is_root());
    }
}
