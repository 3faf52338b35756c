//! End-to-end dispatch through an in-memory session.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use validator::Validate;

use websocket_plus::binding::ParameterBinder;
use websocket_plus::dispatch::{InboundMessage, RecoveryArgs};
use websocket_plus::{
    BoundArgs, DecodeSettings, DispatchError, DispatchOutcome, Dispatcher, ErrorKind, ErrorType,
    HandlerManifest, ParameterSpec, RecoveryParam, RegistrationError, RouteTable,
};

mod common;
use common::RecordingSession;

#[derive(Debug, Error)]
#[error("quota exceeded for {0}")]
struct QuotaExceeded(String);

#[derive(Debug, Serialize, Deserialize, Validate)]
struct Signup {
    #[validate(email(message = "is not an email address"))]
    email: String,
    #[validate(length(min = 3, message = "is too short"))]
    name: String,
}

/// Records which methods ran and with what.
#[derive(Debug, Default)]
struct Journal {
    calls: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn builder() -> websocket_plus::RouteTableBuilder {
    RouteTable::builder(DecodeSettings::default())
}

fn noop(_: &Journal, _: &BoundArgs) -> Result<Option<Value>, Infallible> {
    Ok(None)
}

#[test]
fn test_echo_end_to_end() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(HandlerManifest::new("echo", journal.clone()).route(
            "echo",
            ["true"],
            vec![ParameterSpec::session(), ParameterSpec::field::<String>("text")],
            |journal: &Journal, args| {
                let session = args.session()?;
                let text: String = args.field("text")?;
                journal.push(format!("{}:{}", session.id(), text));
                Ok::<_, DispatchError>(Some(json!({ "reply": text })))
            },
        ))
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(&session.handle(), &r#"{"data":{"text":"hi"}}"#.into());

    assert_eq!(outcome, DispatchOutcome::Sent);
    assert_eq!(journal.entries(), vec!["s-1:hi".to_string()]);
    assert_eq!(session.sent(), vec![r#"{"reply":"hi"}"#.to_string()]);
}

#[test]
fn test_only_the_matching_route_runs() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("chat", journal.clone())
                .route("join", ["root.type == 'join'"], vec![], |j: &Journal, _| {
                    j.push("join");
                    Ok::<Option<Value>, Infallible>(None)
                })
                .route(
                    "say",
                    ["root.type == 'say'", "root.type == 'shout'"],
                    vec![],
                    |j: &Journal, _| {
                        j.push("say");
                        Ok::<Option<Value>, Infallible>(None)
                    },
                )
                .route("any", ["root.type != null"], vec![], |j: &Journal, _| {
                    j.push("any");
                    Ok::<Option<Value>, Infallible>(None)
                }),
        )
        .unwrap();
    builder
        .register(HandlerManifest::new("lobby", journal.clone()).route(
            "lobby",
            ["true"],
            vec![],
            |j: &Journal, _| {
                j.push("lobby");
                Ok::<Option<Value>, Infallible>(None)
            },
        ))
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    dispatcher.on_message(&session.handle(), &r#"{"type":"shout"}"#.into());
    dispatcher.on_message(&session.handle(), &r#"{"type":"join"}"#.into());
    dispatcher.on_message(&session.handle(), &r#"{"type":"leave"}"#.into());
    dispatcher.on_message(&session.handle(), &r#"{}"#.into());

    assert_eq!(journal.entries(), vec!["say", "join", "any", "lobby"]);
    assert!(session.sent().is_empty());
}

#[test]
fn test_unmatched_message_is_silent() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("chat", journal.clone())
                .route("join", ["root.type == 'join'"], vec![], noop)
                .recover("catch_all", ErrorType::Any, vec![RecoveryParam::Error], |j: &Journal, _| {
                    j.push("recovered");
                    Ok::<_, Infallible>(())
                }),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(&session.handle(), &r#"{"type":"leave"}"#.into());

    assert_eq!(outcome, DispatchOutcome::Unmatched);
    assert!(session.sent().is_empty());
    assert!(journal.entries().is_empty());
}

#[test]
fn test_missing_field_in_ordering_does_not_block_later_routes() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("chat", journal.clone())
                .route("big", ["root.count > 10"], vec![], |j: &Journal, _| {
                    j.push("big");
                    Ok::<Option<Value>, Infallible>(None)
                })
                .route("ping", ["root.type == 'ping'"], vec![], |j: &Journal, _| {
                    j.push("ping");
                    Ok::<Option<Value>, Infallible>(None)
                }),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(&session.handle(), &r#"{"type":"ping"}"#.into());

    assert_eq!(outcome, DispatchOutcome::NoResponse);
    assert_eq!(journal.entries(), vec!["ping".to_string()]);

    dispatcher.on_message(&session.handle(), &r#"{"type":"ping","count":11}"#.into());
    assert_eq!(journal.entries(), vec!["ping".to_string(), "big".to_string()]);
}

#[test]
fn test_non_text_frames_are_ignored() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(HandlerManifest::new("chat", journal.clone()).route(
            "all",
            ["true"],
            vec![],
            |j: &Journal, _| {
                j.push("all");
                Ok::<Option<Value>, Infallible>(None)
            },
        ))
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(&session.handle(), &InboundMessage::Binary(b"{}".to_vec()));

    assert_eq!(outcome, DispatchOutcome::Ignored);
    assert!(journal.entries().is_empty());
}

#[test]
fn test_duplicate_expression_set_rejected() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(HandlerManifest::new("a", journal.clone()).route(
            "first",
            ["root.kind == 'x'", "root.flag"],
            vec![],
            noop,
        ))
        .unwrap();

    let err = builder
        .register(HandlerManifest::new("b", journal).route(
            "second",
            ["root.flag", "root.kind == 'x'"],
            vec![],
            noop,
        ))
        .unwrap_err();

    match err {
        RegistrationError::ExpressionConflict { key, method, .. } => {
            assert_eq!(key, "b");
            assert_eq!(method, "second");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_key_rejected() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("chat", journal.clone()).route("a", ["root.a"], vec![], noop),
        )
        .unwrap();

    let err = builder
        .register(HandlerManifest::new("chat", journal).route("b", ["root.b"], vec![], noop))
        .unwrap_err();

    assert!(matches!(err, RegistrationError::DuplicateKey(key) if key == "chat"));
}

#[test]
fn test_validation_failure_reports_first_field() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("accounts", journal.clone())
                .route(
                    "signup",
                    ["root.type == 'signup'"],
                    vec![ParameterSpec::validated_field::<Signup>("signup")],
                    |j: &Journal, _| {
                        j.push("signup");
                        Ok::<Option<Value>, Infallible>(None)
                    },
                )
                .recover(
                    "on_validation",
                    ErrorType::Kind(ErrorKind::Validation),
                    vec![RecoveryParam::Session, RecoveryParam::Error],
                    |j: &Journal, args: &RecoveryArgs<'_>| {
                        let error = args.error().map(|e| e.to_string()).unwrap_or_default();
                        j.push(format!("error: {error}"));
                        Ok::<_, Infallible>(())
                    },
                ),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(
        &session.handle(),
        &r#"{"type":"signup","data":{"signup":{"email":"nope","name":"al"}}}"#.into(),
    );

    assert_eq!(outcome, DispatchOutcome::Failed { handled: true });
    assert_eq!(journal.entries(), vec!["error: email is not an email address".to_string()]);
    assert!(session.sent().is_empty());
}

#[test]
fn test_exception_routing_is_first_match() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("billing", journal.clone())
                .route("charge", ["root.type == 'charge'"], vec![], |_: &Journal, _| {
                    Err::<Option<Value>, _>(QuotaExceeded("acme".into()))
                })
                .recover(
                    "on_handler_error",
                    ErrorType::Kind(ErrorKind::Handler),
                    vec![RecoveryParam::Error],
                    |j: &Journal, args: &RecoveryArgs<'_>| {
                        let error = args.error().map(|e| e.to_string()).unwrap_or_default();
                        j.push(format!("base: {error}"));
                        Ok::<_, Infallible>(())
                    },
                )
                .recover(
                    "on_quota",
                    ErrorType::of::<QuotaExceeded>(),
                    vec![RecoveryParam::Error],
                    |j: &Journal, _: &RecoveryArgs<'_>| {
                        j.push("specific");
                        Ok::<_, Infallible>(())
                    },
                ),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(&session.handle(), &r#"{"type":"charge"}"#.into());

    assert_eq!(outcome, DispatchOutcome::Failed { handled: true });
    assert_eq!(
        journal.entries(),
        vec!["base: handler failed: quota exceeded for acme".to_string()]
    );
}

#[test]
fn test_specific_handler_error_route() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("billing", journal.clone())
                .route("charge", ["root.type == 'charge'"], vec![], |_: &Journal, _| {
                    Err::<Option<Value>, _>(QuotaExceeded("acme".into()))
                })
                .recover(
                    "on_binding",
                    ErrorType::Kind(ErrorKind::Binding),
                    vec![],
                    |j: &Journal, _: &RecoveryArgs<'_>| {
                        j.push("binding");
                        Ok::<_, Infallible>(())
                    },
                )
                .recover(
                    "on_quota",
                    ErrorType::of::<QuotaExceeded>(),
                    vec![RecoveryParam::Other, RecoveryParam::Error],
                    |j: &Journal, args: &RecoveryArgs<'_>| {
                        assert!(args.session().is_none());
                        j.push(format!("quota: {}", args.len()));
                        Ok::<_, Infallible>(())
                    },
                ),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    dispatcher.on_message(&session.handle(), &r#"{"type":"charge"}"#.into());

    assert_eq!(journal.entries(), vec!["quota: 2".to_string()]);
}

#[test]
fn test_unhandled_error_keeps_dispatching() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("chat", journal.clone())
                .route(
                    "say",
                    ["root.type == 'say'"],
                    vec![ParameterSpec::field::<String>("text").required(true)],
                    |j: &Journal, args| {
                        let text: String = args.field("text")?;
                        j.push(text.clone());
                        Ok::<_, DispatchError>(Some(json!({ "said": text })))
                    },
                ),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let failed = dispatcher.on_message(&session.handle(), &r#"{"type":"say","data":{}}"#.into());
    let message: InboundMessage = r#"{"type":"say","data":{"text":"ok"}}"#.into();
    let sent = dispatcher.on_message(&session.handle(), &message);

    assert_eq!(failed, DispatchOutcome::Failed { handled: false });
    assert_eq!(sent, DispatchOutcome::Sent);
    assert_eq!(session.sent(), vec![r#"{"said":"ok"}"#.to_string()]);
}

#[test]
fn test_binding_is_deterministic() {
    let settings = DecodeSettings::new("body", "msg");
    let text = r#"{"kind":"greet","body":{"name":"ada","times":2}}"#;
    let payload = settings.decode_outer(text).unwrap();
    let session = RecordingSession::new("s-1").handle();
    let message = InboundMessage::from(text);
    let specs = vec![
        ParameterSpec::raw_message(),
        ParameterSpec::session(),
        ParameterSpec::map("raw"),
        ParameterSpec::field::<String>("name"),
        ParameterSpec::field::<u8>("times"),
        ParameterSpec::field::<u8>("limit").default_value("5"),
    ];

    let binder = ParameterBinder::new(&settings);
    let first = binder.bind(&specs, &message, &session, &payload).unwrap();
    let second = binder.bind(&specs, &message, &session, &payload).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.field::<u8>("limit").unwrap(), 5);
    assert_eq!(first.field::<String>("name").unwrap(), "ada");
}

#[test]
fn test_custom_decode_settings() {
    let journal = Arc::new(Journal::default());
    let mut builder = builder();
    builder
        .register(
            HandlerManifest::new("greeter", journal.clone())
                .decode(DecodeSettings::new("body", "msg"))
                .route(
                    "greet",
                    ["msg.kind == 'greet' && msg.body.times > 1"],
                    vec![ParameterSpec::field::<String>("name")],
                    |j: &Journal, args| {
                        let name: String = args.field("name")?;
                        j.push(name);
                        Ok::<Option<Value>, DispatchError>(None)
                    },
                ),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());
    let session = RecordingSession::new("s-1");

    let outcome = dispatcher.on_message(
        &session.handle(),
        &r#"{"kind":"greet","body":{"name":"ada","times":2}}"#.into(),
    );

    assert_eq!(outcome, DispatchOutcome::NoResponse);
    assert_eq!(journal.entries(), vec!["ada".to_string()]);
}
