//! Route table construction.
//!
//! # Responsibilities
//! - Turn handler manifests into immutable handler groups
//! - Reject ambiguous routing: duplicate keys and duplicate expression sets
//! - Reject declarations that could only fail at dispatch time
//!
//! # Design Decisions
//! - The builder owns the key and fingerprint registries; `&mut self` makes
//!   every check-and-insert a single step
//! - A group is validated completely before anything is recorded, so a
//!   failed registration leaves the builder unchanged
//! - `build()` consumes the builder; the resulting table has no mutators

use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::{DecodeSettings, ParameterSpec, SourceKind, TypeDescriptor};
use crate::error::RegistrationError;
use crate::expression::{ExpressionEvaluator, SimpleEvaluator};
use crate::routing::fingerprint::Fingerprint;
use crate::routing::manifest::{HandlerManifest, MessageHandler, MethodDescriptor};
use crate::routing::route::{ExceptionRoute, HandlerGroup, MethodRoute};

/// Owner of a registered fingerprint, for conflict reports.
#[derive(Debug, Clone)]
struct FingerprintOwner {
    key: String,
    method: String,
}

/// Collects handler groups and enforces uniqueness across all of them.
#[derive(Debug)]
pub struct RouteTableBuilder {
    settings: DecodeSettings,
    evaluator: Arc<dyn ExpressionEvaluator>,
    groups: Vec<HandlerGroup>,
    keys: HashMap<String, usize>,
    fingerprints: HashMap<Fingerprint, FingerprintOwner>,
}

impl RouteTableBuilder {
    /// Groups without their own decode settings use `settings`.
    pub fn new(settings: DecodeSettings) -> Self {
        Self {
            settings,
            evaluator: Arc::new(SimpleEvaluator::new()),
            groups: Vec::new(),
            keys: HashMap::new(),
            fingerprints: HashMap::new(),
        }
    }

    /// Use `evaluator` for expression checks and for dispatch.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Register the group a handler describes.
    pub fn register_handler<H: MessageHandler>(
        &mut self,
        handler: Arc<H>,
    ) -> Result<&mut Self, RegistrationError> {
        self.register(handler.manifest())
    }

    /// Register one handler group.
    pub fn register<H>(
        &mut self,
        manifest: HandlerManifest<H>,
    ) -> Result<&mut Self, RegistrationError> {
        let HandlerManifest {
            key,
            settings,
            methods,
            recoveries,
            ..
        } = manifest;

        if self.keys.contains_key(&key) {
            return Err(RegistrationError::DuplicateKey(key));
        }
        let settings = settings.unwrap_or_else(|| self.settings.clone());

        let mut routes = Vec::with_capacity(methods.len());
        let mut group_fingerprints: HashMap<Fingerprint, String> = HashMap::new();
        for method in methods {
            let route = self.compile_method(&key, &settings, method)?;

            let owner = self
                .fingerprints
                .get(route.fingerprint())
                .map(|owner| format!("{}::{}", owner.key, owner.method))
                .or_else(|| {
                    group_fingerprints
                        .get(route.fingerprint())
                        .map(|method| format!("{key}::{method}"))
                });
            if let Some(owner) = owner {
                tracing::error!(
                    key = %key,
                    method = %route.name(),
                    owner = %owner,
                    fingerprint = %route.fingerprint(),
                    "Expression set already registered"
                );
                return Err(RegistrationError::ExpressionConflict {
                    key,
                    method: route.name,
                    expressions: route.expressions,
                    fingerprint: route.fingerprint.to_string(),
                });
            }
            group_fingerprints.insert(route.fingerprint.clone(), route.name.clone());
            routes.push(route);
        }

        let exception_routes = recoveries
            .into_iter()
            .map(|recovery| ExceptionRoute {
                name: recovery.name,
                error_type: recovery.error_type,
                parameters: recovery.parameters,
                target: recovery.target,
            })
            .collect::<Vec<_>>();

        for (fingerprint, method) in group_fingerprints {
            self.fingerprints.insert(
                fingerprint,
                FingerprintOwner {
                    key: key.clone(),
                    method,
                },
            );
        }

        tracing::info!(
            key = %key,
            routes = routes.len(),
            exception_routes = exception_routes.len(),
            "Registered handler group"
        );

        self.keys.insert(key.clone(), self.groups.len());
        self.groups.push(HandlerGroup {
            key,
            settings,
            routes,
            exception_routes,
        });
        Ok(self)
    }

    fn compile_method(
        &self,
        key: &str,
        settings: &DecodeSettings,
        method: MethodDescriptor,
    ) -> Result<MethodRoute, RegistrationError> {
        let invalid = |reason: String| RegistrationError::Configuration {
            key: key.to_string(),
            method: method.name.clone(),
            reason,
        };

        if method.expressions.is_empty() {
            return Err(invalid("no route expressions declared".to_string()));
        }
        for expression in &method.expressions {
            self.evaluator
                .check(expression, &settings.expression_root)
                .map_err(|e| invalid(format!("invalid expression `{expression}`: {e}")))?;
        }

        let mut parameters = Vec::with_capacity(method.parameters.len());
        for (position, spec) in method.parameters.iter().enumerate() {
            parameters.push(resolve_parameter(spec, position, settings).map_err(&invalid)?);
        }

        let fingerprint = Fingerprint::of(&method.expressions);
        Ok(MethodRoute {
            name: method.name,
            expressions: method.expressions,
            parameters,
            fingerprint,
            target: method.target,
        })
    }

    /// Number of groups registered so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Freeze the registered groups.
    pub fn build(self) -> RouteTable {
        RouteTable {
            groups: self.groups,
            index: self.keys,
            evaluator: self.evaluator,
        }
    }
}

/// Name check and outer-type reclassification for one parameter.
fn resolve_parameter(
    spec: &ParameterSpec,
    position: usize,
    settings: &DecodeSettings,
) -> Result<ParameterSpec, String> {
    let mut spec = spec.clone();
    let named = !matches!(spec.source, SourceKind::RawMessage | SourceKind::SessionHandle);
    if named && spec.name.trim().is_empty() {
        return Err(format!("parameter {position} has no name"));
    }

    if spec.source == SourceKind::NamedField
        && settings.outer_type != TypeDescriptor::json()
        && spec.type_descriptor == settings.outer_type
    {
        spec.source = SourceKind::OuterPayload;
    }

    if spec.needs_validation && spec.source != SourceKind::NamedField {
        return Err(format!(
            "parameter `{}` requests validation but does not bind a named field",
            spec.name
        ));
    }
    Ok(spec)
}

/// Immutable mapping from routing key to handler group.
#[derive(Debug, Clone)]
pub struct RouteTable {
    groups: Vec<HandlerGroup>,
    index: HashMap<String, usize>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl RouteTable {
    pub fn builder(settings: DecodeSettings) -> RouteTableBuilder {
        RouteTableBuilder::new(settings)
    }

    pub fn get(&self, key: &str) -> Option<&HandlerGroup> {
        self.index.get(key).map(|&i| &self.groups[i])
    }

    /// Groups in registration order.
    pub fn groups(&self) -> &[HandlerGroup] {
        &self.groups
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|group| group.key())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BoundArgs;
    use crate::dispatch::exception::{ErrorType, RecoveryParam};
    use crate::error::ErrorKind;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::convert::Infallible;
    use validator::Validate;

    #[derive(Debug, Default)]
    struct Chat;

    #[derive(Debug, Serialize, Deserialize, Validate)]
    struct Envelope {
        #[serde(rename = "type")]
        kind: String,
    }

    fn noop(_: &Chat, _: &BoundArgs) -> Result<Option<Value>, Infallible> {
        Ok(None)
    }

    fn manifest(key: &str) -> HandlerManifest<Chat> {
        HandlerManifest::new(key, Arc::new(Chat))
    }

    impl MessageHandler for Chat {
        fn manifest(self: Arc<Self>) -> HandlerManifest<Self> {
            HandlerManifest::new("chat", self)
                .route("join", ["root.type == 'join'"], vec![ParameterSpec::session()], noop)
                .route(
                    "say",
                    ["root.type == 'say'"],
                    vec![ParameterSpec::field::<String>("text")],
                    noop,
                )
                .recover(
                    "on_binding",
                    ErrorType::Kind(ErrorKind::Binding),
                    vec![RecoveryParam::Error],
                    |_, _| Ok::<_, Infallible>(()),
                )
        }
    }

    fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new(DecodeSettings::default())
    }

    #[test]
    fn test_register_handler() {
        let mut builder = builder();
        builder.register_handler(Arc::new(Chat)).unwrap();
        let table = builder.build();

        let group = table.get("chat").unwrap();
        assert_eq!(group.routes().len(), 2);
        assert_eq!(group.routes()[0].name(), "join");
        assert_eq!(group.exception_routes().len(), 1);
        assert_eq!(group.settings().expression_root, "root");
        assert!(table.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut builder = builder();
        builder.register(manifest("chat").route("a", ["true"], vec![], noop)).unwrap();
        let err = builder
            .register(manifest("chat").route("b", ["false"], vec![], noop))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateKey(ref key) if key == "chat"));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_expression_set_conflict_across_groups() {
        let mut builder = builder();
        builder
            .register(manifest("one").route("a", ["root.x == 1", "root.y == 2"], vec![], noop))
            .unwrap();
        let err = builder
            .register(manifest("two").route("b", ["root.y == 2", "root.x == 1"], vec![], noop))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::ExpressionConflict { ref method, .. } if method == "b"
        ));
    }

    #[test]
    fn test_expression_set_conflict_within_group() {
        let err = builder()
            .register(
                manifest("chat")
                    .route("a", ["true"], vec![], noop)
                    .route("b", ["true"], vec![], noop),
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_failed_registration_leaves_builder_unchanged() {
        let mut builder = builder();
        let err = builder.register(
            manifest("chat")
                .route("a", ["root.type == 'a'"], vec![], noop)
                .route("b", [] as [&str; 0], vec![], noop),
        );
        assert!(err.is_err());
        assert!(builder.is_empty());

        // The first route's fingerprint was not recorded.
        builder
            .register(manifest("other").route("a", ["root.type == 'a'"], vec![], noop))
            .unwrap();
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_configuration_errors() {
        let err = builder()
            .register(manifest("chat").route("bad", ["root.type == "], vec![], noop))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Configuration { ref reason, .. }
                if reason.contains("invalid expression")
        ));

        let err = builder()
            .register(manifest("chat").route(
                "unnamed",
                ["true"],
                vec![ParameterSpec::field::<String>(" ")],
                noop,
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Configuration { ref reason, .. } if reason.contains("no name")
        ));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_expression_outside_root_rejected() {
        let settings = DecodeSettings::new("data", "msg");
        let err = builder()
            .register(manifest("chat").decode(settings.clone()).route(
                "wrong_root",
                ["#root.x == 1"],
                vec![],
                noop,
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Configuration { ref reason, .. }
                if reason.contains("unknown variable `root`")
        ));

        builder()
            .register(manifest("chat").decode(settings).route("ok", ["#msg.x == 1"], vec![], noop))
            .unwrap();
    }

    #[test]
    fn test_outer_type_reclassification() {
        let settings = DecodeSettings::default().with_outer_type::<Envelope>();
        let mut builder = builder();
        builder
            .register(
                manifest("typed")
                    .decode(settings)
                    .route(
                        "a",
                        ["root.type == 'a'"],
                        vec![ParameterSpec::field::<Envelope>("envelope")],
                        noop,
                    ),
            )
            .unwrap();
        builder
            .register(manifest("untyped").route(
                "b",
                ["true"],
                vec![ParameterSpec::field::<Value>("extra")],
                noop,
            ))
            .unwrap();
        let table = builder.build();

        let typed = &table.get("typed").unwrap().routes()[0];
        assert_eq!(typed.parameters()[0].source(), SourceKind::OuterPayload);
        let untyped = &table.get("untyped").unwrap().routes()[0];
        assert_eq!(untyped.parameters()[0].source(), SourceKind::NamedField);

        let err = RouteTableBuilder::new(DecodeSettings::default().with_outer_type::<Envelope>())
            .register(manifest("v").route(
                "c",
                ["true"],
                vec![ParameterSpec::validated_field::<Envelope>("e")],
                noop,
            ))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Configuration { .. }));
    }

    #[test]
    fn test_table_lookup_order() {
        let mut builder = builder();
        builder.register(manifest("b").route("x", ["true"], vec![], noop)).unwrap();
        builder.register(manifest("a").route("y", ["false"], vec![], noop)).unwrap();
        let table = builder.build();

        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(table.contains_key("a"));
        assert_eq!(table.len(), 2);
        assert!(table.evaluator().evaluate("root.n == 1", "root", &json!({"n": 1})).unwrap());
    }
}
