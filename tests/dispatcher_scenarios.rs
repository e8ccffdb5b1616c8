//! End-to-end dispatch scenarios driven through the public API without a
//! network stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::{Method, Request, StatusCode};
use http_dispatcher::storage::{Archive, Storage, ARCHIVE_PATH_KEY, ROOT_KEY};
use http_dispatcher::{Context, MethodMismatch, Midware, Outcome, Router, Stage};

mod common;
use common::{dispatch, get, request};

#[test]
fn test_ping_pong() {
    let mut router = Router::new();
    router
        .get("/ping", |ctx| {
            ctx.write_string("pong").unwrap();
        })
        .unwrap();
    let dispatcher = router.build();

    let (outcome, recording) = dispatch(&dispatcher, get("/ping"));
    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(recording.status(), StatusCode::OK);
    assert_eq!(recording.body_string(), "pong");
}

#[test]
fn test_each_registered_handler_runs_exactly_once() {
    let methods = [
        Method::GET,
        Method::PUT,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::HEAD,
        Method::OPTIONS,
    ];
    let calls: Arc<Vec<AtomicUsize>> = Arc::new(methods.iter().map(|_| AtomicUsize::new(0)).collect());

    let mut router = Router::new();
    for (index, method) in methods.iter().enumerate() {
        let calls = Arc::clone(&calls);
        router
            .handle(
                method.clone().into(),
                "/resource/:id",
                http_dispatcher::Handler::new(move |_| {
                    calls[index].fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }
    let dispatcher = router.build();

    for method in &methods {
        let (outcome, _) = dispatch(&dispatcher, request(method.clone(), "/resource/1"));
        assert_eq!(outcome, Outcome::Handled);
    }
    for count in calls.iter() {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_capture_visible_through_get() {
    let seen = Arc::new(Mutex::new(String::new()));
    let mut router = Router::new();
    let sink = Arc::clone(&seen);
    router
        .get("/users/:id", move |ctx| {
            *sink.lock().unwrap() = ctx.get("id").to_string();
        })
        .unwrap();
    let dispatcher = router.build();

    dispatch(&dispatcher, get("/users/42"));
    assert_eq!(*seen.lock().unwrap(), "42");
}

#[test]
fn test_regex_capture_and_not_found() {
    let mut router = Router::new();
    router
        .get("/users/:id([0-9]+)", |ctx| {
            let id = ctx.get("id").to_string();
            ctx.write_string(&id).unwrap();
        })
        .unwrap();
    let not_found = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&not_found);
    router.not_found(move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        ctx.not_found();
    });
    let dispatcher = router.build();

    let (outcome, recording) = dispatch(&dispatcher, get("/users/7"));
    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(recording.body_string(), "7");

    let (outcome, recording) = dispatch(&dispatcher, get("/users/abc"));
    assert_eq!(outcome, Outcome::NotFound);
    assert_eq!(recording.status(), StatusCode::NOT_FOUND);
    assert_eq!(not_found.load(Ordering::SeqCst), 1);
}

#[test]
fn test_grouped_route_shadows_ungrouped() {
    let mut router = Router::new();
    router
        .get("/api/status", |ctx| ctx.write_string("flat").unwrap())
        .unwrap();
    router
        .group("/api", [])
        .unwrap()
        .get("/status", |ctx| ctx.write_string("grouped").unwrap())
        .unwrap();
    router
        .get("/api/other", |ctx| ctx.write_string("flat other").unwrap())
        .unwrap();
    let dispatcher = router.build();

    let (_, recording) = dispatch(&dispatcher, get("/api/status"));
    assert_eq!(recording.body_string(), "grouped");

    // Only when the tree has no match does the flat table answer.
    let (_, recording) = dispatch(&dispatcher, get("/api/other"));
    assert_eq!(recording.body_string(), "flat other");
}

#[test]
fn test_group_stop_produces_only_middleware_output() {
    let mut router = Router::new();
    router.not_found(|_| panic!("no fallback after a stop"));
    router
        .group(
            "/api",
            [Midware::new(|ctx| {
                ctx.write_header(StatusCode::FORBIDDEN);
                ctx.write_string("blocked").unwrap();
                false
            })],
        )
        .unwrap()
        .any("/:anything", |_| panic!("handler must not run"))
        .unwrap();
    let dispatcher = router.build();

    let (outcome, recording) = dispatch(&dispatcher, get("/api/anything"));
    assert_eq!(outcome, Outcome::Halted(Stage::Before));
    assert_eq!(recording.status(), StatusCode::FORBIDDEN);
    assert_eq!(recording.body_string(), "blocked");
}

#[test]
fn test_accepts_json_not_xml() {
    let result = Arc::new(Mutex::new((false, false)));
    let sink = Arc::clone(&result);
    let mut router = Router::new();
    router
        .get("/negotiate", move |ctx| {
            *sink.lock().unwrap() = (ctx.accepts_json(), ctx.accepts_xml());
        })
        .unwrap();
    let dispatcher = router.build();

    let request = Request::builder()
        .uri("/negotiate")
        .header("accept", "application/json")
        .body(Bytes::new())
        .unwrap();
    dispatch(&dispatcher, request);
    assert_eq!(*result.lock().unwrap(), (true, false));
}

#[test]
fn test_json_body_round_trips() {
    let value = serde_json::json!({
        "name": "widget",
        "tags": ["a", "b"],
        "price": 12.5,
        "stock": null,
    });
    let expected = value.clone();

    let mut router = Router::new();
    router
        .get("/item", move |ctx| {
            ctx.json(&value, true).unwrap();
        })
        .unwrap();
    let dispatcher = router.build();

    let (_, recording) = dispatch(&dispatcher, get("/item"));
    let decoded: serde_json::Value = serde_json::from_slice(&recording.body()).unwrap();
    assert_eq!(decoded, expected);
}

#[test]
fn test_method_not_allowed_policy() {
    let mut router = Router::new();
    router.method_mismatch(MethodMismatch::NotAllowed);
    router.put("/doc", |_| {}).unwrap();
    let dispatcher = router.build();

    let (outcome, recording) = dispatch(&dispatcher, request(Method::GET, "/doc"));
    assert_eq!(outcome, Outcome::MethodNotAllowed);
    assert_eq!(recording.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(recording.header("allow").as_deref(), Some("PUT"));
}

#[test]
fn test_any_route_accepts_unlisted_methods() {
    let mut router = Router::new();
    router.get("/hook", |ctx| ctx.write_string("get").unwrap()).unwrap();
    router.any("/hook", |ctx| ctx.write_string("any").unwrap()).unwrap();
    let dispatcher = router.build();

    let (_, recording) = dispatch(&dispatcher, request(Method::GET, "/hook"));
    assert_eq!(recording.body_string(), "get");
    let (_, recording) = dispatch(&dispatcher, request(Method::PATCH, "/hook"));
    assert_eq!(recording.body_string(), "any");
}

struct RecordingStorage {
    seen: Mutex<Vec<(String, String, String)>>,
}

struct TenantArchive;

impl Archive for TenantArchive {
    fn path(&self, ctx: &Context) -> String {
        format!("tenants/{}", ctx.get("tenant"))
    }
}

impl Storage for RecordingStorage {
    fn download(&self, ctx: &mut Context) {
        self.seen.lock().unwrap().push((
            "download".to_string(),
            ctx.get(ROOT_KEY).to_string(),
            ctx.get(ARCHIVE_PATH_KEY).to_string(),
        ));
    }

    fn upload(&self, ctx: &mut Context) {
        self.seen.lock().unwrap().push((
            "upload".to_string(),
            ctx.get(ROOT_KEY).to_string(),
            ctx.get(ARCHIVE_PATH_KEY).to_string(),
        ));
    }

    fn root(&self) -> &str {
        "/var/objects"
    }

    fn archive(&self) -> Option<&dyn Archive> {
        Some(&TenantArchive)
    }
}

#[test]
fn test_storage_keys_injected_before_handler() {
    let storage = Arc::new(RecordingStorage {
        seen: Mutex::new(Vec::new()),
    });
    let mut router = Router::new();
    router
        .group("/files", [])
        .unwrap()
        .storage("/:tenant/:object", storage.clone())
        .unwrap();
    let dispatcher = router.build();

    dispatch(&dispatcher, get("/files/acme/report.pdf"));
    dispatch(&dispatcher, request(Method::POST, "/files/acme/report.pdf"));
    let (outcome, _) = dispatch(&dispatcher, request(Method::DELETE, "/files/acme/report.pdf"));
    assert_eq!(outcome, Outcome::NotFound);

    let seen = storage.seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (
                "download".to_string(),
                "/var/objects".to_string(),
                "tenants/acme".to_string()
            ),
            (
                "upload".to_string(),
                "/var/objects".to_string(),
                "tenants/acme".to_string()
            ),
        ]
    );
}

#[test]
fn test_fault_does_not_leak_between_requests() {
    let mut router = Router::new();
    router
        .get("/items/:id", |ctx| {
            if ctx.get("id") == "bad" {
                ctx.set("poison", "yes");
                panic!("bad item");
            }
            let poison = ctx.get("poison").to_string();
            ctx.write_string(&format!("poison={}", poison)).unwrap();
        })
        .unwrap();
    let dispatcher = router.build();

    let (outcome, recording) = dispatch(&dispatcher, get("/items/bad"));
    assert_eq!(outcome, Outcome::Faulted);
    assert_eq!(recording.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let (outcome, recording) = dispatch(&dispatcher, get("/items/good"));
    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(recording.body_string(), "poison=");
}

#[test]
fn test_dispatcher_is_shareable_across_threads() {
    let mut router = Router::new();
    router
        .get("/n/:n", |ctx| {
            let n = ctx.get("n").to_string();
            ctx.write_string(&n).unwrap();
        })
        .unwrap();
    let dispatcher = Arc::new(router.build());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                let (_, recording) = dispatch(&dispatcher, get(&format!("/n/{}", i)));
                recording.body_string()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), i.to_string());
    }
}
