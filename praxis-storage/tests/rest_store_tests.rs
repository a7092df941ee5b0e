//! REST key-value client against an in-process mock of the store's protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use praxis_core::{CacheConfig, CacheError};
use praxis_storage::{CacheKey, KvStore, ReadThroughCache, RestKvStore};
use praxis_test_utils::RecordingSink;
use secrecy::SecretString;
use serde_json::{json, Value};

const TOKEN: &str = "test-token";

#[derive(Default)]
struct MockKv {
    data: Mutex<HashMap<String, String>>,
    commands: Mutex<Vec<Vec<String>>>,
}

impl MockKv {
    fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<Arc<MockKv>>,
    headers: HeaderMap,
    Json(command): Json<Vec<String>>,
) -> (StatusCode, Json<Value>) {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if bearer.as_deref() != Some("Bearer test-token") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        );
    }

    state.commands.lock().unwrap().push(command.clone());
    let mut data = state.data.lock().unwrap();
    let args: Vec<&str> = command.iter().map(String::as_str).collect();
    let reply = match args.as_slice() {
        ["GET", key] => json!({ "result": data.get(*key) }),
        ["SETEX", key, _ttl, value] => {
            data.insert(key.to_string(), value.to_string());
            json!({ "result": "OK" })
        }
        ["DEL", keys @ ..] => {
            let removed = keys.iter().filter(|k| data.remove(**k).is_some()).count();
            json!({ "result": removed })
        }
        ["INCR", key] => {
            let entry = data.entry(key.to_string()).or_insert_with(|| "0".to_string());
            let next = entry.parse::<i64>().unwrap_or(0) + 1;
            *entry = next.to_string();
            json!({ "result": next })
        }
        ["EXPIRE", key, _ttl] => json!({ "result": i32::from(data.contains_key(*key)) }),
        ["TTL", "session"] => json!({ "result": 42 }),
        ["TTL", key] => json!({ "result": if data.contains_key(*key) { -1 } else { -2 } }),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "ERR unknown command" })),
            )
        }
    };
    (StatusCode::OK, Json(reply))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn mock_store() -> (RestKvStore, Arc<MockKv>) {
    let state = Arc::new(MockKv::default());
    let app = Router::new()
        .route("/", post(handle))
        .with_state(state.clone());
    let url = serve(app).await;
    let store = RestKvStore::new(
        url,
        SecretString::from(TOKEN.to_string()),
        Duration::from_secs(2),
    )
    .unwrap();
    (store, state)
}

#[tokio::test]
async fn commands_are_json_arrays() {
    let (store, mock) = mock_store().await;

    store
        .setex("praxis:badges:1", Duration::from_secs(60), r#"{"open":1}"#)
        .await
        .unwrap();
    assert_eq!(
        store.get("praxis:badges:1").await.unwrap().as_deref(),
        Some(r#"{"open":1}"#)
    );
    assert_eq!(store.get("praxis:badges:2").await.unwrap(), None);

    assert_eq!(
        mock.commands()[0],
        vec!["SETEX", "praxis:badges:1", "60", r#"{"open":1}"#]
    );
}

#[tokio::test]
async fn del_incr_and_expire() {
    let (store, mock) = mock_store().await;
    store.setex("a", Duration::from_secs(60), "1").await.unwrap();
    store.setex("b", Duration::from_secs(60), "2").await.unwrap();

    assert_eq!(store.del(&["a", "b", "c"]).await.unwrap(), 2);
    assert_eq!(store.del(&[]).await.unwrap(), 0);
    assert_eq!(store.incr("hits").await.unwrap(), 1);
    assert_eq!(store.incr("hits").await.unwrap(), 2);
    assert!(store.expire("hits", Duration::from_millis(1500)).await.unwrap());
    assert!(!store.expire("gone", Duration::from_secs(1)).await.unwrap());
    assert_eq!(store.ttl("session").await.unwrap(), Some(Duration::from_secs(42)));
    assert_eq!(store.ttl("hits").await.unwrap(), None);
    assert_eq!(store.ttl("gone").await.unwrap(), None);

    let commands = mock.commands();
    assert!(commands.contains(&vec![
        "DEL".to_string(),
        "a".to_string(),
        "b".to_string(),
        "c".to_string()
    ]));
    assert!(commands.contains(&vec![
        "EXPIRE".to_string(),
        "hits".to_string(),
        "2".to_string()
    ]));
    // The empty delete never hit the wire.
    assert_eq!(commands.iter().filter(|c| c[0] == "DEL").count(), 1);
}

#[tokio::test]
async fn wrong_token_is_a_command_failure() {
    let (authorized, mock) = mock_store().await;
    let store = RestKvStore::new(
        authorized.url(),
        SecretString::from("wrong".to_string()),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = store.get("k").await.unwrap_err();
    assert_eq!(
        err,
        CacheError::CommandFailed {
            command: "GET".to_string(),
            reason: "Unauthorized".to_string(),
        }
    );
    assert!(mock.commands().is_empty());
}

#[tokio::test]
async fn non_json_reply_is_a_protocol_error() {
    let app = Router::new().route("/", post(|| async { "Too Many Requests" }));
    let url = serve(app).await;
    let store = RestKvStore::new(
        url,
        SecretString::from(TOKEN.to_string()),
        Duration::from_secs(2),
    )
    .unwrap();

    assert!(matches!(
        store.get("k").await,
        Err(CacheError::Protocol { .. })
    ));
}

#[tokio::test]
async fn throttled_plain_text_reply_is_a_command_failure() {
    let app = Router::new().route(
        "/",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests") }),
    );
    let url = serve(app).await;
    let store = RestKvStore::new(
        url,
        SecretString::from(TOKEN.to_string()),
        Duration::from_secs(2),
    )
    .unwrap();

    assert_eq!(
        store.get("k").await.unwrap_err(),
        CacheError::CommandFailed {
            command: "GET".to_string(),
            reason: "HTTP 429".to_string(),
        }
    );
}

#[tokio::test]
async fn slow_store_times_out() {
    let app = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Json(json!({ "result": "late" }))
        }),
    );
    let url = serve(app).await;
    let store = RestKvStore::new(
        url,
        SecretString::from(TOKEN.to_string()),
        Duration::from_millis(50),
    )
    .unwrap();

    assert!(matches!(
        store.get("k").await,
        Err(CacheError::Unavailable { .. })
    ));
}

#[tokio::test]
async fn unreachable_store_is_unavailable() {
    let store = RestKvStore::new(
        "http://127.0.0.1:1",
        SecretString::from(TOKEN.to_string()),
        Duration::from_secs(1),
    )
    .unwrap();
    assert!(matches!(
        store.setex("k", Duration::from_secs(1), "v").await,
        Err(CacheError::Unavailable { .. })
    ));
}

#[tokio::test]
async fn cache_from_config_talks_to_the_store() {
    let state = Arc::new(MockKv::default());
    let app = Router::new()
        .route("/", post(handle))
        .with_state(state.clone());
    let url = serve(app).await;

    let sink = Arc::new(RecordingSink::new());
    let cache = ReadThroughCache::from_config(&CacheConfig::with_endpoint(url, TOKEN), sink.clone());
    let key = CacheKey::scoped("responsibilities", 12).unwrap();

    cache.set(&key, &vec!["Hygiene", "Datenschutz"], Duration::from_secs(300)).await;
    let read: Option<Vec<String>> = cache.get(&key).await;

    assert_eq!(
        read,
        Some(vec!["Hygiene".to_string(), "Datenschutz".to_string()])
    );
    assert!(sink.events().is_empty());
    assert_eq!(
        state.data.lock().unwrap().get("praxis:responsibilities:12").map(String::as_str),
        Some(r#"["Hygiene","Datenschutz"]"#)
    );
}
