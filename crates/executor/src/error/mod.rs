mod kind;
mod path;

use std::borrow::Cow;

use serde::ser::SerializeMap;

pub use kind::ErrorKind;
pub use path::{PathSegment, ResponsePath};

pub type GraphqlResult<T> = Result<T, GraphqlError>;

/// Line and column of an AST node, both starting at 1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl From<async_graphql_parser::Pos> for Location {
    fn from(pos: async_graphql_parser::Pos) -> Self {
        Location {
            line: pos.line,
            column: pos.column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct GraphqlError {
    pub message: Cow<'static, str>,
    pub kind: ErrorKind,
    pub locations: Vec<Location>,
    pub path: Option<Vec<PathSegment>>,
    // Serialized as a map, but kept as a Vec for efficiency.
    pub extensions: Vec<(Cow<'static, str>, serde_json::Value)>,
}

impl GraphqlError {
    pub fn new(message: impl Into<Cow<'static, str>>, kind: ErrorKind) -> Self {
        GraphqlError {
            message: message.into(),
            kind,
            locations: Vec::new(),
            path: None,
            extensions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    #[must_use]
    pub fn with_locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.locations.extend(locations);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<Vec<PathSegment>>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<serde_json::Value>) -> Self {
        self.extensions.push((key.into(), value.into()));
        self
    }

    /// Attaches the field locations and response path, unless the error was already located deeper
    /// in the response.
    #[must_use]
    pub fn located(mut self, locations: impl IntoIterator<Item = Location>, path: &ResponsePath) -> Self {
        if self.path.is_none() {
            self.locations = locations.into_iter().collect();
            self.path = Some(path.to_vec());
        }
        self
    }

    /// Reclassifies an error raised by an async source, unless the source picked a kind itself.
    #[must_use]
    pub(crate) fn from_source(mut self) -> Self {
        if self.kind == ErrorKind::FieldResolution {
            self.kind = ErrorKind::StreamSource;
        }
        self
    }

    // ------------- //
    // Common errors //
    // ------------- //

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        GraphqlError::new(message, ErrorKind::Internal)
    }

    pub fn document(message: impl Into<Cow<'static, str>>) -> Self {
        GraphqlError::new(message, ErrorKind::Document)
    }
}

impl From<&'static str> for GraphqlError {
    fn from(message: &'static str) -> Self {
        GraphqlError::new(message, ErrorKind::FieldResolution)
    }
}

impl From<String> for GraphqlError {
    fn from(message: String) -> Self {
        GraphqlError::new(message, ErrorKind::FieldResolution)
    }
}

impl From<repeater::RepeaterOverflowError> for GraphqlError {
    fn from(error: repeater::RepeaterOverflowError) -> Self {
        GraphqlError::internal(error.to_string())
    }
}

impl serde::Serialize for GraphqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("message", &self.message)?;
        if !self.locations.is_empty() {
            map.serialize_entry("locations", &self.locations)?;
        }
        if let Some(path) = &self.path {
            map.serialize_entry("path", path)?;
        }
        if !self.extensions.is_empty() {
            map.serialize_entry("extensions", &Extensions(&self.extensions))?;
        }
        map.end()
    }
}

struct Extensions<'a>(&'a [(Cow<'static, str>, serde_json::Value)]);

impl serde::Serialize for Extensions<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn located_errors_keep_their_original_path() {
        let path = ResponsePath::root().child("outer").child("inner");
        let inner = GraphqlError::from("boom").located([Location { line: 3, column: 5 }], &path);
        let relocated = inner.clone().located([Location { line: 1, column: 1 }], &ResponsePath::root().child("outer"));

        assert_eq!(inner, relocated);
        assert_eq!(
            serde_json::to_value(&relocated).unwrap(),
            json!({
                "message": "boom",
                "locations": [{"line": 3, "column": 5}],
                "path": ["outer", "inner"]
            })
        );
    }

    #[test]
    fn extensions_serialize_as_a_map() {
        let error = GraphqlError::internal("oops").with_extension("code", "INTERNAL");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"message": "oops", "extensions": {"code": "INTERNAL"}})
        );
        assert_eq!(error.kind.as_ref(), "INTERNAL");
    }
}
