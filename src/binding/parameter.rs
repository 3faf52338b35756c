//! Parameter declarations.
//!
//! A `ParameterSpec` is derived once per handler method at registration and
//! reused for every invocation of that method.

use std::any::TypeId;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationErrors};

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The untouched inbound message.
    RawMessage,
    /// The connection the message arrived on.
    SessionHandle,
    /// The payload as an untyped key/value map.
    GenericMap,
    /// The payload decoded into the configured outer type.
    OuterPayload,
    /// A value under the inner-field key, coerced to the declared type.
    NamedField,
}

/// Runtime description of a Rust type that payload values are coerced into.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    name: &'static str,
    id: TypeId,
    coerce: fn(Value) -> Result<Value, serde_json::Error>,
    validate: Option<fn(&Value) -> Result<(), ValidationErrors>>,
}

impl TypeDescriptor {
    /// Describe `T`. Coercion round-trips a value through `T`.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Self {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
            coerce: coerce_as::<T>,
            validate: None,
        }
    }

    /// Describe `T` and make its `validator` rules available to the binder.
    pub fn validated<T>() -> Self
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        Self {
            validate: Some(validate_as::<T>),
            ..Self::of::<T>()
        }
    }

    /// Descriptor for arbitrary JSON.
    pub fn json() -> Self {
        Self::of::<Value>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn supports_validation(&self) -> bool {
        self.validate.is_some()
    }

    /// Decode `value` into the described type and re-encode it.
    pub fn coerce(&self, value: Value) -> Result<Value, serde_json::Error> {
        (self.coerce)(value)
    }

    /// Run the described type's validation rules, if it has any.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationErrors> {
        match self.validate {
            Some(validate) => validate(value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("validated", &self.validate.is_some())
            .finish()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

fn coerce_as<T>(value: Value) -> Result<Value, serde_json::Error>
where
    T: DeserializeOwned + Serialize,
{
    let typed: T = serde_json::from_value(value)?;
    serde_json::to_value(typed)
}

fn validate_as<T>(value: &Value) -> Result<(), ValidationErrors>
where
    T: DeserializeOwned + Validate,
{
    // Values reaching validation have already been coerced into `T`.
    match T::deserialize(value) {
        Ok(typed) => typed.validate(),
        Err(_) => Ok(()),
    }
}

/// One parameter of a handler method.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub(crate) name: String,
    pub(crate) source: SourceKind,
    pub(crate) type_descriptor: TypeDescriptor,
    pub(crate) required: bool,
    pub(crate) default_value: Option<String>,
    pub(crate) needs_validation: bool,
}

impl ParameterSpec {
    fn new(name: impl Into<String>, source: SourceKind, type_descriptor: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            source,
            type_descriptor,
            required: false,
            default_value: None,
            needs_validation: false,
        }
    }

    /// Bind the raw inbound message.
    pub fn raw_message() -> Self {
        Self::new("message", SourceKind::RawMessage, TypeDescriptor::json())
    }

    /// Bind the session the message arrived on.
    pub fn session() -> Self {
        Self::new("session", SourceKind::SessionHandle, TypeDescriptor::json())
    }

    /// Bind the whole payload as an untyped map.
    pub fn map(name: impl Into<String>) -> Self {
        Self::new(name, SourceKind::GenericMap, TypeDescriptor::json())
    }

    /// Bind the whole payload decoded into the group's outer type.
    pub fn payload(name: impl Into<String>) -> Self {
        Self::new(name, SourceKind::OuterPayload, TypeDescriptor::json())
    }

    /// Bind the field `name` under the inner-field key, coerced to `T`.
    ///
    /// If `T` is the group's outer decode type, the parameter binds the whole
    /// payload instead.
    pub fn field<T>(name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Self::new(name, SourceKind::NamedField, TypeDescriptor::of::<T>())
    }

    /// Like [`ParameterSpec::field`], with `T`'s validation rules enforced.
    pub fn validated_field<T>(name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        let mut spec = Self::new(name, SourceKind::NamedField, TypeDescriptor::validated::<T>());
        spec.needs_validation = true;
        spec
    }

    /// Fail binding when the field is absent and has no default.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Value used when the field is absent. Parsed as JSON, else taken as a string.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.type_descriptor
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn needs_validation(&self) -> bool {
        self.needs_validation
    }
}
