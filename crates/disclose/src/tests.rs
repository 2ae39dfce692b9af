//! Unit tests for disclose

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};

use proptest::prelude::*;
use tracing::Level;

use crate::registry::{self, lookup, tracked_count};
use crate::{
    Args, BinaryOp, BlockMessage, CompareOp, ExitContext, ExitHandler, Function, MemoryLogger,
    Object, SessionState, TraceError, Traced, Value, ValueError, VerificationError,
    VerificationSession, VerificationSettings,
};

fn session_with(logger: &MemoryLogger) -> VerificationSession {
    VerificationSession::builder()
        .logger(logger.clone())
        .settings(VerificationSettings {
            capture_backtrace: false,
            ..VerificationSettings::default()
        })
        .build()
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Traced Value Tests
// ============================================================================

#[test]
fn item_chain_reconstructs_access_path() {
    let data = Traced::wrap(Value::map([("a", Value::list([1, 2, 3]))]), "data");

    let second = data.item("a").unwrap().item(1).unwrap();

    assert_eq!(second.label().unwrap(), "data['a'][1]");
    assert_eq!(second.value().unwrap(), Value::Int(2));
}

#[test]
fn dropping_last_clone_releases_metadata() {
    let before = tracked_count();
    let traced = Traced::wrap(Value::Int(1), "one");
    let clone = traced.clone();
    let handle = traced.handle();
    assert_eq!(tracked_count(), before + 1);

    drop(traced);
    drop(clone);

    assert_eq!(lookup(handle).unwrap_err(), TraceError::Untracked(handle));
    assert_eq!(tracked_count(), before);
}

#[test]
fn derived_values_release_independently() {
    let before = tracked_count();
    let xs = Traced::wrap(Value::list([1, 2, 3]), "xs");
    let total = xs.len().unwrap().add(1).unwrap();
    assert_eq!(tracked_count(), before + 2);

    drop(xs);
    assert_eq!(tracked_count(), before + 1);
    assert_eq!(total.value().unwrap(), Value::Int(4));

    drop(total);
    assert_eq!(tracked_count(), before);
}

#[test]
fn wrapping_a_traced_value_flattens_it() {
    let inner = Traced::wrap(Value::Int(5), "inner");
    let outer = Traced::from_operand(&inner, Some("outer".to_string()), Vec::new()).unwrap();

    assert_ne!(outer.handle(), inner.handle());
    assert_eq!(outer.value().unwrap(), Value::Int(5));
    assert_eq!(outer.label().unwrap(), "outer");
}

#[test]
fn anonymous_label_falls_back_to_display() {
    let anonymous = Traced::anonymous(Value::list(["a"]));

    assert_eq!(anonymous.description().unwrap(), None);
    assert_eq!(anonymous.label().unwrap(), "['a']");
    assert_eq!(anonymous.len().unwrap().label().unwrap(), "len(['a'])");
}

#[test]
fn attributes_forward_to_objects() {
    let point = Traced::wrap(Object::new("Point").with_attr("x", 1), "point");

    let x = point.attr("x").unwrap();
    assert_eq!(x.label().unwrap(), "point.x");
    assert_eq!(x.value().unwrap(), Value::Int(1));

    let y = Traced::wrap(7, "y");
    point.set_attr("y", &y).unwrap();
    assert_eq!(point.attr("y").unwrap().value().unwrap(), Value::Int(7));
    assert_eq!(point.dir().unwrap(), ["x", "y"]);

    point.del_attr("x").unwrap();
    assert!(matches!(
        point.attr("x"),
        Err(TraceError::Value(ValueError::NoAttribute { .. }))
    ));
}

#[test]
fn item_mutation_stores_real_values() {
    let counts = Traced::wrap(Value::map([("a", 1)]), "counts");
    let two = Traced::wrap(2, "two");

    counts.set_item("b", &two).unwrap();
    assert_eq!(
        counts.value().unwrap(),
        Value::map([("a", 1), ("b", 2)])
    );

    counts.del_item("a").unwrap();
    assert_eq!(counts.value().unwrap(), Value::map([("b", 2)]));
    assert!(matches!(
        counts.item("a"),
        Err(TraceError::Value(ValueError::KeyNotFound(_)))
    ));
}

#[test]
fn mutation_is_visible_in_component_dumps() {
    let counts = Traced::wrap(Value::map([("n", 1)]), "counts");
    let n = counts.item("n").unwrap();

    counts.set_item("n", 5).unwrap();

    let chain = n.metadata().unwrap().chain();
    assert_eq!(chain[0].dump_line().as_deref(), Some("counts = {'n': 5}"));
    assert_eq!(chain[1].dump_line().as_deref(), Some("counts['n'] = 1"));
}

#[test]
fn containers_describe_their_operation() {
    let xs = Traced::wrap(Value::list([1, 2, 3]), "xs");
    let needle = Traced::wrap(2, "needle");

    let found = xs.contains(&needle).unwrap();
    assert_eq!(found.label().unwrap(), "needle in xs");
    assert!(found.is_truthy().unwrap());

    let missing = xs.contains(9).unwrap();
    assert_eq!(missing.label().unwrap(), "9 in xs");
    assert!(!missing.is_truthy().unwrap());

    let reversed = xs.reversed().unwrap();
    assert_eq!(reversed.label().unwrap(), "reversed(xs)");
    assert_eq!(reversed.value().unwrap(), Value::list([3, 2, 1]));

    assert_eq!(xs.len().unwrap().label().unwrap(), "len(xs)");
    assert_eq!(xs.item(-1).unwrap().label().unwrap(), "xs[-1]");
}

#[test]
fn calls_describe_arguments_and_merge_components() {
    let scale = Function::new("scale", |args| {
        let value = args.arg(0).and_then(Value::as_integer).unwrap_or(0);
        let factor = args.kwarg("by").and_then(Value::as_integer).unwrap_or(1);
        Ok(Value::Int(value * factor))
    });
    let f = Traced::wrap(scale, "scale");
    let x = Traced::wrap(4, "x");

    let result = f.call(Args::new().arg(&x).kwarg("by", 3)).unwrap();

    assert_eq!(result.label().unwrap(), "scale(x, by=3)");
    assert_eq!(result.value().unwrap(), Value::Int(12));
    let labels: Vec<String> = result
        .metadata()
        .unwrap()
        .components()
        .iter()
        .map(|component| component.label())
        .collect();
    assert_eq!(labels, ["scale", "x"]);
}

#[test]
fn failing_calls_propagate_the_function_error() {
    let parse = Function::new("parse", |args| match args.arg(0) {
        Some(Value::Str(text)) => text.parse::<i64>().map(Value::Int).map_err(|error| {
            ValueError::Call {
                function: "parse".to_string(),
                message: error.to_string(),
            }
        }),
        _ => Ok(Value::None),
    });
    let f = Traced::wrap(parse, "parse");
    let before = tracked_count();

    assert_eq!(
        f.call(Args::new().arg("12")).unwrap().value().unwrap(),
        Value::Int(12)
    );
    let error = f.call(Args::new().arg("twelve")).unwrap_err();

    assert_eq!(
        error,
        TraceError::Value(ValueError::Call {
            function: "parse".to_string(),
            message: "invalid digit found in string".to_string(),
        })
    );
    assert_eq!(
        error.to_string(),
        "call to parse failed: invalid digit found in string"
    );
    assert_eq!(tracked_count(), before);
}

#[test]
fn calling_a_non_function_fails() {
    let x = Traced::wrap(1, "x");
    assert_eq!(
        x.call(Args::new()).unwrap_err(),
        TraceError::Value(ValueError::NotCallable("int"))
    );
}

#[test]
fn binary_and_reflected_preserve_written_order() {
    let x = Traced::wrap(10, "x");

    let forward = x.binary(BinaryOp::Sub, 3).unwrap();
    assert_eq!(forward.label().unwrap(), "(x) - (3)");
    assert_eq!(forward.value().unwrap(), Value::Int(7));

    let reflected = x.reflected(BinaryOp::Sub, 3).unwrap();
    assert_eq!(reflected.label().unwrap(), "(3) - (x)");
    assert_eq!(reflected.value().unwrap(), Value::Int(-7));

    assert_eq!(x.rem(4).unwrap().value().unwrap(), Value::Int(2));
    assert_eq!(x.floor_div(4).unwrap().label().unwrap(), "(x) // (4)");
    assert_eq!(x.pow(2).unwrap().value().unwrap(), Value::Int(100));
}

#[test]
fn component_chains_are_not_deduplicated() {
    let x = Traced::wrap(3, "x");

    let doubled = x.add(&x).unwrap();
    let components = doubled.metadata().unwrap().components().to_vec();

    assert_eq!(doubled.label().unwrap(), "(x) + (x)");
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].handle(), components[1].handle());
}

#[test]
fn augment_rebinds_to_the_binary_result() {
    let mut total = Traced::wrap(1, "total");
    let original = total.clone();

    total.augment(BinaryOp::Add, 2).unwrap();

    assert_eq!(total.label().unwrap(), "(total) + (2)");
    assert_eq!(total.value().unwrap(), Value::Int(3));
    assert_eq!(original.value().unwrap(), Value::Int(1));
}

#[test]
fn comparisons_are_traced() {
    let name = Traced::wrap("bob", "user.name");

    let same = name.equals("bob").unwrap();
    assert_eq!(same.label().unwrap(), "(user.name) == (bob)");
    assert_eq!(same.value().unwrap(), Value::Bool(true));

    assert!(name.compare(CompareOp::Lt, "carol").unwrap().is_truthy().unwrap());
    assert!(!name.not_equals("bob").unwrap().is_truthy().unwrap());
    assert!(name.gt(1).is_err());
}

#[test]
fn casts_return_plain_values() {
    let n = Traced::wrap(31, "n");

    assert_eq!(n.to_int().unwrap(), 31);
    assert_eq!(n.to_float().unwrap(), 31.0);
    assert_eq!(n.hex().unwrap(), "0x1f");
    assert_eq!(n.oct().unwrap(), "0o37");
    assert_eq!(n.index().unwrap(), 31);
    assert_eq!(n.to_str().unwrap(), "31");

    let s = Traced::wrap("it's", "s");
    assert_eq!(s.to_str().unwrap(), "it's");
    assert_eq!(s.repr().unwrap(), s.value().unwrap().repr());
    assert_eq!(Traced::wrap(2.9, "f").trunc().unwrap(), 2);
}

#[test]
fn hash_follows_the_real_operand() {
    let traced = Traced::wrap(Value::list([1, 2]), "xs");
    assert_eq!(hash_of(&traced), hash_of(&Value::list([1, 2])));
}

#[test]
fn display_and_debug() {
    let traced = Traced::wrap(Value::list(["a"]), "xs");

    assert_eq!(traced.to_string(), "['a']");
    let debug = format!("{traced:?}");
    assert!(debug.contains("Traced"));
    assert!(debug.contains("\"xs\""));
}

#[test]
fn sweep_and_release_agree() {
    let traced = Traced::anonymous(1);
    let handle = traced.handle();
    drop(traced);

    registry::release(handle);
    assert_eq!(registry::sweep(), 0);
}

// ============================================================================
// Verification Session Tests
// ============================================================================

#[test]
fn passing_verification_logs_info() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);

    let result = session.verify(5 > 3, "", false).unwrap();

    assert!(result);
    assert!(session.is_fully_passing());
    assert_eq!(
        logger.messages_at(Level::INFO),
        ["::VERIFICATION PASSED::\nTrue"]
    );
    assert!(logger.messages_at(Level::ERROR).is_empty());
}

#[test]
fn passing_traced_verification_dumps_at_debug() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);
    let x = Traced::wrap(5, "x");

    session.check(x.gt(3).unwrap()).unwrap();

    assert!(logger.contains(Level::INFO, "(x) > (3)"));
    assert_eq!(logger.messages_at(Level::DEBUG), ["x = 5"]);
}

#[test]
fn failing_verification_records_and_logs() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);
    let wrapped_dict = Traced::wrap(Value::map([("count", 1)]), "counter");

    let reset = wrapped_dict.item("count").unwrap().equals(0).unwrap();
    let returned = session.verify(&reset, "count must reset", false).unwrap();

    assert_eq!(returned.handle(), reset.handle());
    assert_eq!(session.failures().len(), 1);
    let failure = &session.failures()[0];
    assert!(failure.description.contains("['count']"));
    assert_eq!(failure.annotation, "count must reset");
    assert_eq!(failure.result, Value::Bool(false));
    assert!(failure.location.file().ends_with("tests.rs"));

    let errors = logger.messages_at(Level::ERROR);
    assert_eq!(
        errors,
        ["::VERIFICATION FAILED::\ncount must reset\n(counter['count']) == (0)"]
    );
    assert_eq!(
        logger.messages_at(Level::INFO),
        ["counter = {'count': 1}\ncounter['count'] = 1"]
    );
    assert!(logger.contains(Level::DEBUG, "verification called at"));
}

#[test]
fn blocking_failure_aborts_with_formatted_message() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);

    let error = session.verify(false, "must not happen", true).unwrap_err();

    assert_eq!(
        error,
        VerificationError::Blocked {
            message: "::VERIFICATION FAILED::\nmust not happen\nFalse".to_string()
        }
    );
    assert_eq!(session.failures().len(), 1);
    assert!(logger.contains(Level::DEBUG, "verification called at"));
}

#[test]
fn blocking_pass_does_not_block() {
    let mut session = session_with(&MemoryLogger::new());
    assert!(session.require(true, "fine").is_ok());
}

#[test]
fn fail_fast_blocks_every_failure() {
    let mut session = VerificationSession::builder()
        .logger(MemoryLogger::new())
        .settings(VerificationSettings {
            fail_fast: true,
            capture_backtrace: false,
            ..VerificationSettings::default()
        })
        .build();

    assert!(matches!(
        session.check(false),
        Err(VerificationError::Blocked { .. })
    ));
}

#[test]
fn dump_lines_can_be_disabled() {
    let logger = MemoryLogger::new();
    let mut session = VerificationSession::builder()
        .logger(logger.clone())
        .settings(VerificationSettings {
            dump_components: false,
            capture_backtrace: false,
            ..VerificationSettings::default()
        })
        .build();
    let x = Traced::wrap(1, "x");

    session.check(x.equals(2).unwrap()).unwrap();

    assert!(logger.messages_at(Level::INFO).is_empty());
    assert_eq!(logger.messages_at(Level::ERROR).len(), 1);
}

#[test]
fn call_stack_holds_location_without_backtrace() {
    let mut session = session_with(&MemoryLogger::new());
    session.check(false).unwrap();

    let failure = &session.failures()[0];
    assert_eq!(
        failure.call_stack,
        format!("verification called at {}", failure.location)
    );
}

#[test]
fn call_stack_includes_backtrace_when_enabled() {
    let mut session = VerificationSession::builder()
        .logger(MemoryLogger::new())
        .build();
    session.check(Value::None).unwrap();

    let failure = &session.failures()[0];
    assert!(failure.call_stack.starts_with("verification called at"));
    assert!(failure.call_stack.lines().count() > 1);
}

#[test]
fn custom_formatter_and_block_handler() {
    let mut session = VerificationSession::builder()
        .logger(MemoryLogger::new())
        .message_formatter(|result: bool, description: &str, annotation: &str| {
            format!("{result}|{description}|{annotation}")
        })
        .block_handler(|_: bool, message: BlockMessage<'_>| {
            Err(VerificationError::Blocked {
                message: format!("custom: {}", message.render(false)),
            })
        })
        .build();

    let error = session.require(false, "note").unwrap_err();
    assert_eq!(error.to_string(), "custom: false|False|note");
}

#[test]
fn close_without_failures_succeeds() {
    let mut session = session_with(&MemoryLogger::new());
    session.check(true).unwrap();

    assert!(session.close(None).is_ok());
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn close_with_failures_reports_verification_failed() {
    let mut session = session_with(&MemoryLogger::new());
    session.check(Value::Int(0)).unwrap();

    let error = session.close(None).unwrap_err();
    assert!(error.to_string().contains("Verification failed."));
}

#[test]
fn closed_session_rejects_further_use() {
    let mut session = session_with(&MemoryLogger::new());
    session.close(None).unwrap();

    assert_eq!(
        session.check(true).unwrap_err(),
        VerificationError::SessionClosed
    );
    assert_eq!(
        session.close(None).unwrap_err(),
        VerificationError::SessionClosed
    );
}

#[test]
fn scope_reports_blocked_assertion_and_failures() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);

    let error = session
        .scope(|session| {
            session.require(false, "stop")?;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(
        error,
        VerificationError::Aggregate {
            message: "Assertion failed: ::VERIFICATION FAILED::\nstop\nFalse\nVerification failed."
                .to_string()
        }
    );
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn scope_returns_body_value_when_passing() {
    let mut session = session_with(&MemoryLogger::new());
    let value = session
        .scope(|session| {
            session.check(true)?;
            Ok(42)
        })
        .unwrap();
    assert_eq!(value, 42);
}

#[test]
fn scope_propagates_other_errors_after_a_clean_close() {
    let mut session = session_with(&MemoryLogger::new());
    let x = Traced::wrap(1, "x");

    let error = session
        .scope(|_| {
            x.div(0)?;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(
        error,
        VerificationError::Trace(TraceError::Value(ValueError::DivisionByZero))
    );
}

#[test]
fn unrenderable_components_are_skipped_in_the_dump() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);
    let x = Traced::wrap(5, "x");
    let small = x.lt(3).unwrap();
    let record = x.metadata().unwrap();

    record.update(|_| session.check(&small)).unwrap();

    assert_eq!(session.failures().len(), 1);
    assert_eq!(session.failures()[0].description, "(x) < (3)");
    assert_eq!(logger.messages_at(Level::ERROR).len(), 1);
    assert!(logger.messages_at(Level::INFO).is_empty());
}

#[test]
fn from_environment_opens_a_session() {
    let mut session = VerificationSession::from_environment();

    assert_eq!(session.state(), SessionState::Open);
    assert!(session.check(true).unwrap());
    assert!(session.close(None).is_ok());
}

#[test]
fn scope_turns_panics_into_aggregate_failures() {
    let logger = MemoryLogger::new();
    let mut session = session_with(&logger);

    let error = session
        .scope(|_| -> Result<(), VerificationError> { panic!("boom") })
        .unwrap_err();

    assert_eq!(error.to_string(), "Assertion failed: boom");
    assert_eq!(
        logger.messages_at(Level::DEBUG),
        vec!["panic in verification scope: boom".to_string()]
    );
}

#[test]
fn scope_panic_trace_carries_a_backtrace_when_enabled() {
    let logger = MemoryLogger::new();
    let mut session = VerificationSession::builder()
        .logger(logger.clone())
        .build();

    let _ = session.scope(|_| -> Result<(), VerificationError> { panic!("boom") });

    let debug = logger.messages_at(Level::DEBUG);
    assert_eq!(debug.len(), 1);
    assert!(debug[0].starts_with("panic in verification scope: boom\n"));
}

struct Lenient;

impl ExitHandler for Lenient {
    fn on_exit(&self, _: &ExitContext<'_>) -> Result<(), VerificationError> {
        Ok(())
    }
}

#[test]
fn scope_resumes_panics_a_lenient_exit_handler_lets_through() {
    let mut session = VerificationSession::builder()
        .logger(MemoryLogger::new())
        .exit_handler(Lenient)
        .build();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        session.scope(|_| -> Result<(), VerificationError> { panic!("still unwinding") })
    }));

    assert!(outcome.is_err());
    assert_eq!(session.state(), SessionState::Closed);
}

// ============================================================================
// Property Tests
// ============================================================================

fn binary_op() -> impl Strategy<Value = BinaryOp> {
    prop::sample::select(BinaryOp::ALL.to_vec())
}

fn compare_op() -> impl Strategy<Value = CompareOp> {
    prop::sample::select(CompareOp::ALL.to_vec())
}

proptest! {
    /// Forwarded arithmetic yields exactly what the direct operation yields.
    #[test]
    fn binary_ops_are_transparent(a in -1_000i64..1_000, b in -64i64..64, op in binary_op()) {
        let x = Traced::wrap(a, "a");
        let direct = op.apply(&Value::Int(a), &Value::Int(b));
        let traced = x.binary(op, b).and_then(|result| result.value());

        prop_assert_eq!(traced, direct.map_err(TraceError::from));
    }

    #[test]
    fn reflected_ops_are_transparent(a in -1_000i64..1_000, b in -64i64..64, op in binary_op()) {
        let y = Traced::wrap(b, "b");
        let direct = op.apply(&Value::Int(a), &Value::Int(b));
        let traced = y.reflected(op, a).and_then(|result| result.value());

        prop_assert_eq!(traced, direct.map_err(TraceError::from));
    }

    #[test]
    fn comparisons_are_transparent(a in any::<f64>(), b in -10i64..10, op in compare_op()) {
        let x = Traced::wrap(a, "a");
        let direct = op.apply(&Value::Float(a), &Value::Int(b)).unwrap();
        let traced = x.compare(op, b).unwrap();

        prop_assert_eq!(traced.value().unwrap(), Value::Bool(direct));
        prop_assert_eq!(traced.is_truthy().unwrap(), direct);
    }

    /// Descriptions spell out the index path that was applied.
    #[test]
    fn item_paths_reconstruct(path in prop::collection::vec(0usize..3, 1..5)) {
        let mut expected = Value::list([0, 1, 2]);
        for _ in 1..path.len() {
            expected = Value::list([expected.clone(), expected.clone(), expected]);
        }

        let mut traced = Traced::wrap(expected.clone(), "root");
        let mut description = String::from("root");
        for index in &path {
            let key = i64::try_from(*index).unwrap();
            traced = traced.item(key).unwrap();
            expected = expected.get_item(&Value::Int(key)).unwrap();
            description.push_str(&format!("[{index}]"));
        }

        prop_assert_eq!(traced.label().unwrap(), description);
        prop_assert_eq!(traced.value().unwrap(), expected);
    }

    #[test]
    fn registry_returns_to_baseline(count in 0usize..20) {
        let before = tracked_count();
        {
            let _values: Vec<Traced> = (0..count)
                .map(|i| Traced::wrap(i64::try_from(i).unwrap(), format!("v{i}")))
                .collect();
            prop_assert_eq!(tracked_count(), before + count);
        }
        prop_assert_eq!(tracked_count(), before);
    }
}
