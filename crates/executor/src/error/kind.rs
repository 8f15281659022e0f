/// Category of a [`GraphqlError`](super::GraphqlError). Not part of the serialized error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    serde::Serialize,
    strum::Display,
    strum::AsRefStr,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed document, missing or ambiguous operation.
    Document,
    VariableCoercion,
    ArgumentCoercion,
    /// A resolver failed.
    #[default]
    FieldResolution,
    /// A non-null field produced null.
    NullabilityViolation,
    /// A leaf serializer produced null or rejected the value.
    SerializationFailure,
    InvalidRuntimeType,
    TypeMismatch,
    /// A list field produced something that isn't a list.
    InvalidListValue,
    /// An async source failed in the middle of a list or subscription.
    StreamSource,
    Validation,
    Internal,
}
