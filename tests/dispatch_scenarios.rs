//! End-to-end dispatch scenarios: anti-forgery rotation, failure recovery,
//! and error-handler routing, driven through `Dispatcher::dispatch`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::header::{ALLOW, CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use axum::http::{Method, StatusCode};

use common::{
    body_text, dispatcher_with_store, harness, harness_with, harness_with_sessions, set_cookie_names, test_config,
    Browser, FailingSessionStore, RecordingNotifier, XSRF_COOKIE,
};
use gatekeep::resilience::FailureKind;
use gatekeep::session::MemorySessionStore;
use gatekeep::{AppError, RouteTable};

fn counted(routes: &mut RouteTable, spec: &str, hits: &Arc<AtomicUsize>) {
    let hits = Arc::clone(hits);
    routes
        .handle(spec, move |ctx| {
            hits.fetch_add(1, Ordering::SeqCst);
            ctx.write(b"done")
        })
        .unwrap();
}

#[test]
fn test_get_issues_token_and_session() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    let h = harness(routes);

    let mut browser = Browser::new();
    let response = browser.get(&h.dispatcher, "/");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "home");
    let names = set_cookie_names(&response);
    assert!(names.iter().any(|n| n == XSRF_COOKIE));
    assert!(names.iter().any(|n| n == "session"));
    assert_eq!(h.sessions.len(), 1);
    assert!(browser.cookie(XSRF_COOKIE).is_some());
}

#[test]
fn test_valid_pair_succeeds_and_rotates() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    counted(&mut routes, "POST::/save", &hits);
    let h = harness(routes);

    let mut browser = Browser::new();
    browser.get(&h.dispatcher, "/");
    let first = browser.cookie(XSRF_COOKIE).unwrap().to_string();

    let response = browser.post(&h.dispatcher, "/save", "");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "done");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let second = browser.cookie(XSRF_COOKIE).unwrap().to_string();
    assert_ne!(first, second);

    // The consumed pair is no longer accepted.
    browser.set_cookie(XSRF_COOKIE, &first);
    let replay = browser.send(&h.dispatcher, Method::POST, "/save", Some(first.as_str()), "");
    assert_eq!(replay.status(), StatusCode::FORBIDDEN);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_header_mismatch_is_forbidden_without_running_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    counted(&mut routes, "POST::/save", &hits);
    routes.handle("ERROR::403", |ctx| ctx.write(b"denied")).unwrap();
    let h = harness(routes);

    let mut browser = Browser::new();
    browser.get(&h.dispatcher, "/");
    let mut forged = browser.cookie(XSRF_COOKIE).unwrap().to_string();
    let last = forged.pop().unwrap();
    forged.push(if last == 'A' { 'B' } else { 'A' });

    let response = browser.send(&h.dispatcher, Method::POST, "/save", Some(forged.as_str()), "");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(&response), "denied");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_forbidden_without_error_handler_has_empty_body() {
    let mut routes = RouteTable::new();
    routes.handle("POST::/save", |ctx| ctx.write(b"done")).unwrap();
    let h = harness(routes);

    let response = Browser::new().send(&h.dispatcher, Method::POST, "/save", None, "");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.body().is_empty());
    // A fresh token is still issued so the client can retry.
    assert!(set_cookie_names(&response).iter().any(|n| n == XSRF_COOKIE));
}

#[test]
fn test_panic_after_partial_write_is_replaced_by_error_handler() {
    let mut routes = RouteTable::new();
    routes
        .handle("GET::/explode", |ctx| {
            ctx.write(b"partial output")?;
            panic!("boom");
        })
        .unwrap();
    routes
        .handle("ERROR::500", |ctx| {
            let failure = ctx.failure().expect("failure is attached");
            assert_eq!(failure.kind, FailureKind::RuntimeFault);
            assert_eq!(ctx.status(), StatusCode::INTERNAL_SERVER_ERROR);
            ctx.write(b"sorry")
        })
        .unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/explode");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&response), "sorry");
}

#[test]
fn test_panic_without_error_handler_sends_bare_500() {
    let mut routes = RouteTable::new();
    routes
        .handle("GET::/explode", |ctx| {
            ctx.set_header(CONTENT_TYPE, "text/html")?;
            ctx.write(b"partial output")?;
            panic!("boom");
        })
        .unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/explode");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body().is_empty());
    assert!(response.headers().get(CONTENT_TYPE).is_none());
}

#[test]
fn test_unknown_path_is_bare_404() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/unknown");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.body().is_empty());
}

#[test]
fn test_unknown_path_uses_404_handler() {
    let mut routes = RouteTable::new();
    routes
        .handle("ERROR::404", |ctx| {
            let path = ctx.path();
            ctx.write(format!("no page at {}", path).as_bytes())
        })
        .unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&response), "no page at /missing");
}

#[test]
fn test_explicit_status_without_handler() {
    let mut routes = RouteTable::new();
    routes
        .handle("GET::/teapot", |ctx| {
            ctx.write(b"discarded")?;
            Err(AppError::code(418))
        })
        .unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/teapot");
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert!(response.body().is_empty());
}

#[test]
fn test_failing_error_handler_falls_back_to_bare_status() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |_| Err(AppError::internal("db down"))).unwrap();
    routes
        .handle("ERROR::500", |ctx| {
            ctx.write(b"half an error page")?;
            Err(AppError::internal("template missing"))
        })
        .unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body().is_empty());
}

#[test]
fn test_panicking_error_handler_falls_back_to_bare_status() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/gone", |_| Err(AppError::NotFound)).unwrap();
    routes.handle("ERROR::404", |_| panic!("error page broke")).unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/gone");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.body().is_empty());
}

#[test]
fn test_wrong_method_is_405_with_allow() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/items", |ctx| ctx.write(b"items")).unwrap();
    routes.handle("PUT::/items", |ctx| ctx.write(b"items")).unwrap();
    let h = harness(routes);

    let response = Browser::new().send(&h.dispatcher, Method::DELETE, "/items", None, "");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let allow = response.headers().get(ALLOW).unwrap().to_str().unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("PUT"));
}

#[test]
fn test_trailing_slash_redirects_keeping_query() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/docs", |ctx| ctx.write(b"docs")).unwrap();
    let h = harness(routes);

    let response = Browser::new().get(&h.dispatcher, "/docs/?page=2");
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/docs?page=2");
}

#[test]
fn test_default_headers_on_every_response() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    let h = harness(routes);

    let mut browser = Browser::new();
    for path in ["/", "/missing"] {
        let response = browser.get(&h.dispatcher, path);
        let cache = response.headers().get(CACHE_CONTROL).unwrap().to_str().unwrap();
        assert!(cache.contains("no-store"));
    }
}

#[test]
fn test_session_changes_survive_a_failed_request() {
    let mut routes = RouteTable::new();
    routes
        .handle("GET::/count", |ctx| {
            let n = ctx.session().get::<u64>("n").unwrap_or(0) + 1;
            ctx.session_mut().insert("n", n)?;
            ctx.write(n.to_string().as_bytes())
        })
        .unwrap();
    routes
        .handle("GET::/mark-then-fail", |ctx| {
            ctx.session_mut().insert("n", 10u64)?;
            Err(AppError::internal("after the write"))
        })
        .unwrap();
    let h = harness(routes);

    let mut browser = Browser::new();
    assert_eq!(body_text(&browser.get(&h.dispatcher, "/count")), "1");
    let failed = browser.get(&h.dispatcher, "/mark-then-fail");
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&browser.get(&h.dispatcher, "/count")), "11");
}

#[test]
fn test_failures_notify_except_on_delivery_path() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/broken", |_| Err(AppError::internal("broken"))).unwrap();
    routes
        .handle("GET::/tasks/error-mail", |_| Err(AppError::internal("smtp down")))
        .unwrap();
    let h = harness(routes);
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = h.dispatcher.with_notifier(notifier.clone(), "/tasks/error-mail");

    let mut browser = Browser::new();
    browser.get(&dispatcher, "/broken");
    assert_eq!(notifier.count(), 1);
    {
        let seen = notifier.seen.lock().unwrap();
        assert_eq!(seen[0].status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(seen[0].kind, FailureKind::Handler);
        assert!(seen[0].message.contains("broken"));
    }

    let response = browser.get(&dispatcher, "/tasks/error-mail");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(notifier.count(), 1);
}

#[test]
fn test_sibling_of_delivery_path_still_notifies() {
    let mut routes = RouteTable::new();
    routes
        .handle("GET::/tasks/error-mailbox", |_| Err(AppError::internal("inbox broken")))
        .unwrap();
    routes
        .handle("GET::/tasks/error-mail/retry", |_| Err(AppError::internal("retry broken")))
        .unwrap();
    let h = harness(routes);
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = h.dispatcher.with_notifier(notifier.clone(), "/tasks/error-mail");

    let mut browser = Browser::new();
    let response = browser.get(&dispatcher, "/tasks/error-mailbox");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(notifier.count(), 1);

    browser.get(&dispatcher, "/tasks/error-mail/retry");
    assert_eq!(notifier.count(), 1);
}

#[test]
fn test_unknown_clients_do_not_accumulate_expired_sessions() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    let sessions = MemorySessionStore::new(std::time::Duration::ZERO).with_purge_every(50);
    let h = harness_with_sessions(test_config(), routes, sessions);

    for i in 0..1000 {
        let path = if i % 2 == 0 { "/" } else { "/nope" };
        Browser::new().get(&h.dispatcher, path);
    }
    assert!(h.sessions.len() <= 50, "store kept {} sessions", h.sessions.len());
}

#[test]
fn test_session_load_failure_is_500_and_saves_nothing() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut routes = RouteTable::new();
    counted(&mut routes, "GET::/", &hits);
    routes.handle("ERROR::500", |ctx| ctx.write(b"sorry")).unwrap();
    let store = Arc::new(FailingSessionStore::failing_load());
    let dispatcher = dispatcher_with_store(routes, store.clone());

    let response = Browser::new().get(&dispatcher, "/");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&response), "sorry");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(store.saves(), 0);
    assert!(!set_cookie_names(&response).iter().any(|n| n == "session"));
}

#[test]
fn test_session_save_failure_after_success_replaces_body() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/", |ctx| ctx.write(b"home")).unwrap();
    routes.handle("ERROR::500", |ctx| ctx.write(b"sorry")).unwrap();
    let dispatcher = dispatcher_with_store(routes, Arc::new(FailingSessionStore::failing_save()));

    let response = Browser::new().get(&dispatcher, "/");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&response), "sorry");
}

#[test]
fn test_session_save_failure_after_failure_keeps_status() {
    let mut routes = RouteTable::new();
    routes.handle("GET::/teapot", |_| Err(AppError::code(418))).unwrap();
    routes.handle("ERROR::418", |ctx| ctx.write(b"short and stout")).unwrap();
    let dispatcher = dispatcher_with_store(routes, Arc::new(FailingSessionStore::failing_save()));

    let response = Browser::new().get(&dispatcher, "/teapot");
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_text(&response), "short and stout");
}

#[test]
fn test_enabled_notifications_enqueue_alert_tasks() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("mails")).unwrap();
    std::fs::write(
        dir.path().join("mails/error.html"),
        "<p>{{ AppId }}: {{ Error }}</p>",
    )
    .unwrap();

    let mut config = test_config();
    config.templates.dir = dir.path().to_string_lossy().into_owned();
    config.notifications.enabled = true;
    config.notifications.admin_emails = vec!["ops@example.com".to_string()];

    let mut routes = RouteTable::new();
    routes.handle("GET::/broken", |_| Err(AppError::internal("disk full"))).unwrap();
    let mut h = harness_with(config, routes);

    let response = Browser::new().get(&h.dispatcher, "/broken");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let queued = h.tasks.try_recv().expect("an alert task was enqueued");
    assert_eq!(queued.queue, "admin-mails");
    assert_eq!(queued.task.path, "/tasks/error-mail");
    let values = queued.task.form_values();
    let field = |name: &str| {
        values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    assert_eq!(field("to"), "ops@example.com");
    assert!(field("html").contains("disk full"));
    assert!(h.tasks.try_recv().is_err());
}

#[test]
fn test_storage_is_reachable_from_handlers() {
    use gatekeep::storage::{Key, StorageExt};

    let mut routes = RouteTable::new();
    routes
        .handle("GET::/", |ctx| {
            ctx.storage().put_json(&Key::int("Visit", 1), &serde_json::json!({ "ok": true }))?;
            ctx.write(b"stored")
        })
        .unwrap();
    let h = harness(routes);

    Browser::new().get(&h.dispatcher, "/");
    assert_eq!(h.storage.len(), 1);
}
