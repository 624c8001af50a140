mod common;

use common::{Behavior, Event, Recorder, mock_spec};
use sql_context::prelude::*;

fn nest(depth: usize, body: &dyn Fn() -> Result<(), SqlContextError>) -> Result<(), SqlContextError> {
    if depth == 0 {
        return body();
    }
    with_transaction(|| nest(depth - 1, body))
}

#[test]
fn any_depth_commits_exactly_once() -> Result<(), SqlContextError> {
    for depth in 1..=5 {
        let recorder = Recorder::default();
        let spec = mock_spec(&recorder, Behavior::default());
        with_connection(&spec, || {
            nest(depth, &|| {
                assert_eq!(nesting_level(), depth);
                Ok(())
            })
        })?;

        assert_eq!(recorder.count(&Event::SetAutoCommit(false)), 1, "depth {depth}");
        assert_eq!(recorder.count(&Event::Commit), 1, "depth {depth}");
        assert_eq!(recorder.count(&Event::SetAutoCommit(true)), 1, "depth {depth}");
        assert_eq!(recorder.count(&Event::Rollback), 0, "depth {depth}");
    }
    Ok(())
}

#[test]
fn nested_rollback_flag_reaches_outermost_scope() -> Result<(), SqlContextError> {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());

    with_connection(&spec, || {
        with_transaction(|| {
            with_transaction(|| {
                with_transaction(|| {
                    set_rollback(true)?;
                    Ok(())
                })
            })?;
            assert!(get_rollback()?);
            Ok(())
        })?;
        assert!(!get_rollback()?);
        Ok(())
    })?;

    assert_eq!(recorder.count(&Event::Rollback), 1);
    assert_eq!(recorder.count(&Event::Commit), 0);
    Ok(())
}

#[test]
fn setting_rollback_twice_rolls_back_once() -> Result<(), SqlContextError> {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());

    with_connection(&spec, || {
        with_transaction(|| {
            set_rollback(true)?;
            with_transaction(|| set_rollback(true))
        })
    })?;

    assert_eq!(recorder.count(&Event::Rollback), 1);
    assert_eq!(recorder.count(&Event::Commit), 0);
    Ok(())
}

#[test]
fn body_error_is_wrapped_after_rollback() {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());
    let sink = std::sync::Arc::new(MemoryDiagnostics::new());

    let result: Result<(), SqlContextError> = with_diagnostics(sink.clone(), || {
        with_connection(&spec, || {
            with_transaction(|| {
                with_transaction(|| -> Result<(), SqlContextError> {
                    Err(SqlContextError::driver("no such table: widgets"))
                })
            })
        })
    });

    let err = result.err();
    assert_eq!(
        err.as_ref().map(ToString::to_string).as_deref(),
        Some("transaction rolled back: no such table: widgets")
    );
    assert!(matches!(
        err.as_ref().and_then(SqlContextError::rollback_cause),
        Some(SqlContextError::Driver { message, .. }) if message == "no such table: widgets"
    ));

    let events = recorder.events();
    let rollback_at = events.iter().position(|e| *e == Event::Rollback);
    let close_at = events.iter().position(|e| *e == Event::Close);
    assert!(rollback_at.is_some() && rollback_at < close_at);
    assert_eq!(recorder.count(&Event::Rollback), 1);
    assert_eq!(recorder.count(&Event::Commit), 0);
    assert_eq!(recorder.count(&Event::SetAutoCommit(true)), 1);
    assert!(sink.lines().iter().any(|l| l.contains("no such table: widgets")));
}

#[test]
fn error_with_flag_already_set_rolls_back_once() {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());

    let result: Result<(), SqlContextError> = with_connection(&spec, || {
        with_transaction(|| {
            set_rollback(true)?;
            Err(SqlContextError::ExecutionError("late failure".into()))
        })
    });

    assert!(matches!(result, Err(SqlContextError::TransactionRolledBack { .. })));
    assert_eq!(recorder.count(&Event::Rollback), 1);
}

#[test]
fn original_auto_commit_setting_is_restored() -> Result<(), SqlContextError> {
    let recorder = Recorder::default();
    let behavior = Behavior {
        initial_auto_commit: false,
        ..Behavior::default()
    };
    let spec = mock_spec(&recorder, behavior);

    with_connection(&spec, || with_transaction(|| Ok(())))?;

    assert_eq!(
        recorder
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::SetAutoCommit(_) | Event::Commit))
            .collect::<Vec<_>>(),
        vec![Event::SetAutoCommit(false), Event::Commit, Event::SetAutoCommit(false)]
    );
    Ok(())
}

#[test]
fn nesting_level_restored_after_inner_error() -> Result<(), SqlContextError> {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());

    let outcome: Result<(), SqlContextError> = with_connection(&spec, || {
        with_transaction(|| {
            let inner: Result<(), SqlContextError> =
                with_transaction(|| Err(SqlContextError::ExecutionError("inner".into())));
            assert!(inner.is_err());
            assert_eq!(nesting_level(), 1);
            Ok(())
        })?;
        assert_eq!(nesting_level(), 0);
        Ok(())
    });

    // The inner error was handled by the caller, so nothing forced a rollback.
    outcome?;
    assert_eq!(recorder.count(&Event::Commit), 1);
    Ok(())
}

#[test]
fn failed_commit_surfaces_as_rolled_back() {
    let recorder = Recorder::default();
    let behavior = Behavior {
        fail_commit: true,
        ..Behavior::default()
    };
    let spec = mock_spec(&recorder, behavior);

    let result = with_connection(&spec, || with_transaction(|| Ok(())));

    assert!(matches!(
        result.as_ref().err().and_then(SqlContextError::rollback_cause),
        Some(SqlContextError::Driver { message, .. }) if message == "database is locked"
    ));
    assert_eq!(recorder.count(&Event::Rollback), 1);
    assert_eq!(recorder.count(&Event::SetAutoCommit(true)), 1);
}

#[test]
fn panicking_body_still_rolls_back_and_restores() {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = with_connection(&spec, || {
            with_transaction(|| -> Result<(), SqlContextError> { panic!("boom") })
        });
    }));

    assert!(caught.is_err());
    assert_eq!(recorder.count(&Event::Rollback), 1);
    assert_eq!(recorder.count(&Event::Commit), 0);
    assert_eq!(recorder.count(&Event::SetAutoCommit(true)), 1);
    assert_eq!(recorder.count(&Event::Close), 1);
}

#[test]
fn separate_outermost_scopes_each_commit() -> Result<(), SqlContextError> {
    let recorder = Recorder::default();
    let spec = mock_spec(&recorder, Behavior::default());

    with_connection(&spec, || {
        with_transaction(|| set_rollback(true))?;
        with_transaction(|| Ok(()))?;
        Ok(())
    })?;

    assert_eq!(recorder.count(&Event::Rollback), 1);
    assert_eq!(recorder.count(&Event::Commit), 1);
    Ok(())
}
