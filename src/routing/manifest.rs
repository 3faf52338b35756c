//! Explicit registration manifests.
//!
//! # Responsibilities
//! - Let the embedding application describe a handler object: its routing
//!   key, routable methods and error-recovery methods
//! - Bind every method to the shared handler instance
//!
//! # Design Decisions
//! - Methods are plain closures taking `&H`, so handler types need no
//!   framework traits beyond `Send + Sync`
//! - Return values are serialized as soon as the method returns; the
//!   dispatcher only ever sees JSON

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::binding::{BoundArgs, DecodeSettings, ParameterSpec};
use crate::dispatch::exception::{ErrorType, RecoveryArgs, RecoveryParam};
use crate::error::{DispatchError, HandlerError};
use crate::routing::route::{MethodTarget, RecoveryTarget};

/// A handler object that describes its own routes.
pub trait MessageHandler: Send + Sync + Sized + 'static {
    fn manifest(self: Arc<Self>) -> HandlerManifest<Self>;
}

pub(crate) struct MethodDescriptor {
    pub(crate) name: String,
    pub(crate) expressions: Vec<String>,
    pub(crate) parameters: Vec<ParameterSpec>,
    pub(crate) target: MethodTarget,
}

pub(crate) struct RecoveryDescriptor {
    pub(crate) name: String,
    pub(crate) error_type: ErrorType,
    pub(crate) parameters: Vec<RecoveryParam>,
    pub(crate) target: RecoveryTarget,
}

/// Registration input for one handler group.
pub struct HandlerManifest<H> {
    pub(crate) key: String,
    pub(crate) settings: Option<DecodeSettings>,
    pub(crate) methods: Vec<MethodDescriptor>,
    pub(crate) recoveries: Vec<RecoveryDescriptor>,
    pub(crate) instance: Arc<H>,
}

impl<H: Send + Sync + 'static> HandlerManifest<H> {
    pub fn new(key: impl Into<String>, instance: Arc<H>) -> Self {
        Self {
            key: key.into(),
            settings: None,
            methods: Vec::new(),
            recoveries: Vec::new(),
            instance,
        }
    }

    /// Override the table-wide decode settings for this group.
    pub fn decode(mut self, settings: DecodeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Declare a routable method.
    ///
    /// The method runs when any of `expressions` is true for the decoded
    /// payload. Returning `Ok(None)` sends nothing back.
    pub fn route<I, S, F, R, E>(
        mut self,
        name: &str,
        expressions: I,
        parameters: Vec<ParameterSpec>,
        method: F,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&H, &BoundArgs) -> Result<Option<R>, E> + Send + Sync + 'static,
        R: Serialize,
        E: Into<HandlerError>,
    {
        let instance = Arc::clone(&self.instance);
        let target: MethodTarget =
            Arc::new(move |args: &BoundArgs| -> Result<Option<Value>, DispatchError> {
                match method(&instance, args) {
                    Ok(Some(result)) => serde_json::to_value(result)
                        .map(Some)
                        .map_err(DispatchError::Encode),
                    Ok(None) => Ok(None),
                    Err(err) => Err(DispatchError::from_handler(err.into())),
                }
            });
        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            expressions: expressions.into_iter().map(Into::into).collect(),
            parameters,
            target,
        });
        self
    }

    /// Declare an error-recovery method for errors assignable to `error_type`.
    pub fn recover<F, E>(
        mut self,
        name: &str,
        error_type: ErrorType,
        parameters: Vec<RecoveryParam>,
        method: F,
    ) -> Self
    where
        F: Fn(&H, &RecoveryArgs<'_>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<HandlerError>,
    {
        let instance = Arc::clone(&self.instance);
        let target: RecoveryTarget =
            Arc::new(move |args: &RecoveryArgs<'_>| -> Result<(), HandlerError> {
                method(&instance, args).map_err(Into::into)
            });
        self.recoveries.push(RecoveryDescriptor {
            name: name.to_string(),
            error_type,
            parameters,
            target,
        });
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
