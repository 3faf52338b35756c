//! Argument binding for one handler invocation.
//!
//! # Responsibilities
//! - Resolve each declared parameter from the raw message, session or payload
//! - Coerce named fields into their declared type
//! - Run nested validation and surface the first violation
//!
//! # Design Decisions
//! - Binding is all-or-nothing: one failing parameter aborts the call
//! - Binding is pure over its inputs, so re-binding yields equal arguments

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::binding::parameter::{ParameterSpec, SourceKind, TypeDescriptor};
use crate::config::DecodeConfig;
use crate::dispatch::{InboundMessage, SessionHandle};
use crate::error::DispatchError;

/// Decode configuration shared by every route of a handler group.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeSettings {
    /// Type the whole payload is decoded into before routing.
    pub outer_type: TypeDescriptor,
    /// Payload key holding the named fields.
    pub inner_field_key: String,
    /// Name the payload is bound to in route expressions.
    pub expression_root: String,
}

impl DecodeSettings {
    pub fn new(inner_field_key: impl Into<String>, expression_root: impl Into<String>) -> Self {
        Self {
            outer_type: TypeDescriptor::json(),
            inner_field_key: inner_field_key.into(),
            expression_root: expression_root.into(),
        }
    }

    /// Build settings from the `[decode]` configuration section.
    pub fn from_config(config: &DecodeConfig) -> Self {
        Self::new(config.inner_field_key.clone(), config.expression_root.clone())
    }

    /// Decode payloads into `T` before routing.
    pub fn with_outer_type<T>(mut self) -> Self
    where
        T: DeserializeOwned + serde::Serialize + 'static,
    {
        self.outer_type = TypeDescriptor::of::<T>();
        self
    }

    /// Decode a text payload into the outer type.
    pub fn decode_outer(&self, text: &str) -> Result<Value, DispatchError> {
        let raw: Value = serde_json::from_str(text)?;
        Ok(self.outer_type.coerce(raw)?)
    }
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self::from_config(&DecodeConfig::default())
    }
}

/// A bound argument value.
#[derive(Debug, Clone)]
pub enum Argument {
    RawMessage(InboundMessage),
    Session(SessionHandle),
    Map(Map<String, Value>),
    Payload(Value),
    Field(Value),
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Argument::RawMessage(a), Argument::RawMessage(b)) => a == b,
            (Argument::Session(a), Argument::Session(b)) => a.id() == b.id(),
            (Argument::Map(a), Argument::Map(b)) => a == b,
            (Argument::Payload(a), Argument::Payload(b)) => a == b,
            (Argument::Field(a), Argument::Field(b)) => a == b,
            _ => false,
        }
    }
}

/// Arguments bound for one invocation, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundArgs {
    entries: Vec<(String, Argument)>,
}

impl BoundArgs {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Argument at declaration position `index`.
    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.entries.get(index).map(|(_, arg)| arg)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.entries.iter().map(|(name, arg)| (name.as_str(), arg))
    }

    /// The session the message arrived on.
    pub fn session(&self) -> Result<&SessionHandle, DispatchError> {
        self.entries
            .iter()
            .find_map(|(_, arg)| match arg {
                Argument::Session(session) => Some(session),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Argument("session".into()))
    }

    /// The raw inbound message.
    pub fn raw_message(&self) -> Result<&InboundMessage, DispatchError> {
        self.entries
            .iter()
            .find_map(|(_, arg)| match arg {
                Argument::RawMessage(message) => Some(message),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Argument("message".into()))
    }

    /// The untyped map bound under `name`.
    pub fn map(&self, name: &str) -> Result<&Map<String, Value>, DispatchError> {
        match self.named(name) {
            Some(Argument::Map(map)) => Ok(map),
            _ => Err(DispatchError::Argument(name.to_string())),
        }
    }

    /// The outer payload bound under `name`, decoded into `T`.
    pub fn payload<T: DeserializeOwned>(&self, name: &str) -> Result<T, DispatchError> {
        match self.named(name) {
            Some(Argument::Payload(value)) => Ok(T::deserialize(value)?),
            _ => Err(DispatchError::Argument(name.to_string())),
        }
    }

    /// The named field bound under `name`, decoded into `T`.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T, DispatchError> {
        match self.named(name) {
            Some(Argument::Field(value)) => Ok(T::deserialize(value)?),
            _ => Err(DispatchError::Argument(name.to_string())),
        }
    }

    fn named(&self, name: &str) -> Option<&Argument> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, arg)| arg)
    }
}

/// Resolves a method's parameter list against one inbound message.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinder<'a> {
    settings: &'a DecodeSettings,
}

impl<'a> ParameterBinder<'a> {
    pub fn new(settings: &'a DecodeSettings) -> Self {
        Self { settings }
    }

    /// Bind every parameter in declaration order.
    pub fn bind(
        &self,
        specs: &[ParameterSpec],
        message: &InboundMessage,
        session: &SessionHandle,
        payload: &Value,
    ) -> Result<BoundArgs, DispatchError> {
        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let argument = self.bind_one(spec, message, session, payload)?;
            entries.push((spec.name.clone(), argument));
        }
        Ok(BoundArgs { entries })
    }

    fn bind_one(
        &self,
        spec: &ParameterSpec,
        message: &InboundMessage,
        session: &SessionHandle,
        payload: &Value,
    ) -> Result<Argument, DispatchError> {
        match spec.source {
            SourceKind::RawMessage => Ok(Argument::RawMessage(message.clone())),
            SourceKind::SessionHandle => Ok(Argument::Session(session.clone())),
            SourceKind::GenericMap => {
                let map = match message.as_text() {
                    Some(text) => serde_json::from_str::<Map<String, Value>>(text)?,
                    None => Map::<String, Value>::deserialize(payload)?,
                };
                Ok(Argument::Map(map))
            }
            SourceKind::OuterPayload => Ok(Argument::Payload(payload.clone())),
            SourceKind::NamedField => self.bind_field(spec, payload).map(Argument::Field),
        }
    }

    fn bind_field(&self, spec: &ParameterSpec, payload: &Value) -> Result<Value, DispatchError> {
        let present = payload
            .get(self.settings.inner_field_key.as_str())
            .and_then(|inner| inner.get(spec.name.as_str()))
            .filter(|value| !value.is_null())
            .cloned();

        let value = match (present, &spec.default_value) {
            (Some(value), _) => spec.type_descriptor.coerce(value)?,
            (None, Some(default)) => coerce_default(&spec.type_descriptor, default)?,
            (None, None) if spec.required => {
                return Err(DispatchError::MissingParameter(spec.name.clone()));
            }
            (None, None) => return Ok(Value::Null),
        };

        if spec.needs_validation {
            spec.type_descriptor
                .validate(&value)
                .map_err(|errors| first_violation(&spec.name, &errors))?;
        }
        Ok(value)
    }
}

/// Defaults are written as JSON (`42`, `{"a":1}`); anything else is a plain string.
fn coerce_default(descriptor: &TypeDescriptor, default: &str) -> Result<Value, DispatchError> {
    if let Ok(parsed) = serde_json::from_str::<Value>(default) {
        if let Ok(value) = descriptor.coerce(parsed) {
            return Ok(value);
        }
    }
    Ok(descriptor.coerce(Value::String(default.to_string()))?)
}

/// Only the first violation is surfaced, ordered by field path.
///
/// Nested structs and lists contribute dotted paths such as `addr.city` or
/// `lines[0].sku`.
fn first_violation(parameter: &str, errors: &ValidationErrors) -> DispatchError {
    let mut fields = Vec::new();
    collect_violations(None, errors, &mut fields);
    fields.sort();

    match fields.into_iter().next() {
        Some((field, message)) => DispatchError::Validation { field, message },
        None => DispatchError::Validation {
            field: parameter.to_string(),
            message: errors.to_string(),
        },
    }
}

fn collect_violations(
    prefix: Option<&str>,
    errors: &ValidationErrors,
    out: &mut Vec<(String, String)>,
) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(violations) => {
                if let Some(violation) = violations.first() {
                    let message = match &violation.message {
                        Some(message) => message.to_string(),
                        None => violation.code.to_string(),
                    };
                    out.push((path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_violations(Some(&path), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_violations(Some(&format!("{path}[{index}]")), inner, out);
                }
            }
        }
    }
}
