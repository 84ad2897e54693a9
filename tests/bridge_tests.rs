mod common;

use common::ScriptedEngine;
use companion::bridge::{
    spawn_worker, BrainBridge, BridgeError, ChatMessage, ChatRequest, Role, WorkerRequest,
    WorkerResponse, DEFAULT_MAX_GEN_LEN, DEFAULT_TEMPERATURE,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn hello() -> ChatRequest {
    ChatRequest::new(vec![ChatMessage::system("be nice"), ChatMessage::user("hello")])
}

#[test]
fn test_request_envelope_format() {
    let init = serde_json::to_value(WorkerRequest::Init {
        model: "big".to_string(),
    })
    .unwrap();
    assert_eq!(init, serde_json::json!({"type": "init", "model": "big"}));

    let chat = serde_json::to_value(WorkerRequest::from(hello())).unwrap();
    assert_eq!(chat["type"], "chat");
    assert_eq!(chat["messages"][1]["role"], "user");
    assert_eq!(chat["messages"][1]["content"], "hello");
    assert!(chat.get("temperature").is_none());
}

#[test]
fn test_response_envelope_parsing() {
    let delta: WorkerResponse =
        serde_json::from_str(r#"{"type":"delta","delta":" there","full":"Hi there"}"#).unwrap();
    assert_eq!(
        delta,
        WorkerResponse::Delta {
            delta: " there".to_string(),
            full: "Hi there".to_string()
        }
    );
    assert!(!delta.is_terminal());

    let error: WorkerResponse =
        serde_json::from_str(r#"{"type":"error","error":"out of memory"}"#).unwrap();
    assert!(error.is_terminal());

    let chat: WorkerRequest = serde_json::from_str(
        r#"{"type":"chat","messages":[{"role":"assistant","content":"hi"}]}"#,
    )
    .unwrap();
    match chat {
        WorkerRequest::Chat {
            messages,
            temperature,
            max_gen_len,
        } => {
            assert_eq!(messages[0].role, Role::Assistant);
            assert_eq!(temperature, None);
            assert_eq!(max_gen_len, None);
        }
        other => panic!("expected chat, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_before_init_is_not_loaded() {
    let engine = ScriptedEngine::new(&["big"], &["Hi"]);
    let bridge = BrainBridge::spawn(Box::new(engine.clone()));

    let result = bridge.chat(hello()).await;
    assert_eq!(result, Err(BridgeError::NotLoaded));
    assert!(engine.prompts().is_empty());
}

#[tokio::test]
async fn test_worker_rejects_chat_without_model() {
    let (requests, mut responses, _worker) = spawn_worker(Box::new(ScriptedEngine::default()));

    requests.send(WorkerRequest::from(hello())).unwrap();

    match responses.recv().await.unwrap() {
        WorkerResponse::Error { error } => assert_eq!(error, "not loaded"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_init_leaves_bridge_usable() {
    let engine = ScriptedEngine::new(&["small"], &["Hi"]);
    let bridge = BrainBridge::spawn(Box::new(engine.clone()));

    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    bridge.set_progress_handler(move |text| seen.lock().unwrap().push(text.to_string()));

    let err = bridge.init("big").await.unwrap_err();
    assert!(matches!(err, BridgeError::Worker(ref msg) if msg.contains("does not fit")));
    assert_eq!(bridge.loaded_model(), None);

    let model = bridge.init("small").await.unwrap();
    assert_eq!(model, "small");
    assert_eq!(bridge.loaded_model().as_deref(), Some("small"));

    assert_eq!(engine.loads(), vec!["big", "small"]);
    let progress = progress.lock().unwrap().clone();
    assert!(progress.contains(&"fetching big".to_string()));
    assert!(progress.contains(&"small ready".to_string()));
}

#[tokio::test]
async fn test_failed_reinit_unloads_previous_model() {
    let engine = ScriptedEngine::new(&["small"], &["Hi"]);
    let bridge = BrainBridge::spawn(Box::new(engine));

    bridge.init("small").await.unwrap();
    assert!(bridge.init("huge").await.is_err());

    assert_eq!(bridge.chat(hello()).await, Err(BridgeError::NotLoaded));
}

#[tokio::test]
async fn test_deltas_grow_monotonically() {
    let engine = ScriptedEngine::new(&["small"], &["Hi", "", " there", "!"]);
    let bridge = BrainBridge::spawn(Box::new(engine.clone()));
    bridge.init("small").await.unwrap();

    let fulls = Arc::new(Mutex::new(Vec::<(String, String)>::new()));
    let seen = Arc::clone(&fulls);
    bridge.set_delta_handler(move |delta, full| {
        seen.lock().unwrap().push((delta.to_string(), full.to_string()))
    });

    let full = bridge.chat(hello()).await.unwrap();
    assert_eq!(full, "Hi there!");

    let fulls = fulls.lock().unwrap().clone();
    assert_eq!(fulls.len(), 3, "empty deltas are not forwarded");
    for pair in fulls.windows(2) {
        assert!(pair[1].1.starts_with(&pair[0].1));
        assert!(pair[1].1.len() > pair[0].1.len());
    }
    assert_eq!(fulls.last().unwrap().1, full);

    let params = engine.params.lock().unwrap().clone();
    assert_eq!(params[0].temperature, DEFAULT_TEMPERATURE);
    assert_eq!(params[0].max_gen_len, DEFAULT_MAX_GEN_LEN);
}

#[tokio::test]
async fn test_explicit_generation_params_reach_engine() {
    let engine = ScriptedEngine::new(&["small"], &["ok"]);
    let bridge = BrainBridge::spawn(Box::new(engine.clone()));
    bridge.init("small").await.unwrap();

    let mut request = hello();
    request.temperature = Some(0.2);
    request.max_gen_len = Some(32);
    bridge.chat(request).await.unwrap();

    let params = engine.params.lock().unwrap().clone();
    assert_eq!(params[0].temperature, 0.2);
    assert_eq!(params[0].max_gen_len, 32);
}

#[tokio::test]
async fn test_second_request_waits_for_first_terminal() {
    let (requests, mut worker_rx) = mpsc::unbounded_channel();
    let (worker_tx, responses) = mpsc::unbounded_channel();
    let bridge = Arc::new(BrainBridge::new(requests, responses));

    // Load a model by hand
    let init = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.init("small").await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Init { .. })
    ));
    worker_tx
        .send(WorkerResponse::Ready {
            model: "small".to_string(),
        })
        .unwrap();
    assert_eq!(init.await.unwrap().unwrap(), "small");

    let first = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.chat(hello()).await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Chat { .. })
    ));

    let second = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.chat(hello()).await }
    });

    // The second chat must not reach the worker while the first is open
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(worker_rx.try_recv().is_err());

    worker_tx
        .send(WorkerResponse::Delta {
            delta: "one".to_string(),
            full: "one".to_string(),
        })
        .unwrap();
    worker_tx
        .send(WorkerResponse::Done {
            full: "one".to_string(),
        })
        .unwrap();
    assert_eq!(first.await.unwrap().unwrap(), "one");

    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Chat { .. })
    ));
    worker_tx
        .send(WorkerResponse::Done {
            full: "two".to_string(),
        })
        .unwrap();
    assert_eq!(second.await.unwrap().unwrap(), "two");
}

#[tokio::test]
async fn test_worker_gone_is_reported() {
    let (requests, worker_rx) = mpsc::unbounded_channel();
    let (worker_tx, responses) = mpsc::unbounded_channel::<WorkerResponse>();
    let bridge = BrainBridge::new(requests, responses);

    drop(worker_rx);
    drop(worker_tx);

    assert_eq!(bridge.init("small").await, Err(BridgeError::WorkerGone));
}

/// Bridge wired to hand-driven channels with "small" already loaded
async fn loaded_bridge() -> (
    Arc<BrainBridge>,
    mpsc::UnboundedReceiver<WorkerRequest>,
    mpsc::UnboundedSender<WorkerResponse>,
) {
    let (requests, mut worker_rx) = mpsc::unbounded_channel();
    let (worker_tx, responses) = mpsc::unbounded_channel();
    let bridge = Arc::new(BrainBridge::new(requests, responses));

    let init = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.init("small").await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Init { .. })
    ));
    worker_tx
        .send(WorkerResponse::Ready {
            model: "small".to_string(),
        })
        .unwrap();
    assert_eq!(init.await.unwrap().unwrap(), "small");

    (bridge, worker_rx, worker_tx)
}

#[tokio::test]
async fn test_abandoned_chat_reply_is_not_reused() {
    let (bridge, mut worker_rx, worker_tx) = loaded_bridge().await;

    let deltas = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = Arc::clone(&deltas);
    bridge.set_delta_handler(move |delta, _| seen.lock().unwrap().push(delta.to_string()));

    let first = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.chat(hello()).await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Chat { .. })
    ));
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    // The worker finishes the abandoned chat anyway
    worker_tx
        .send(WorkerResponse::Delta {
            delta: "old".to_string(),
            full: "old".to_string(),
        })
        .unwrap();
    worker_tx
        .send(WorkerResponse::Done {
            full: "reply to first".to_string(),
        })
        .unwrap();

    let second = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.chat(hello()).await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Chat { .. })
    ));
    worker_tx
        .send(WorkerResponse::Delta {
            delta: "new".to_string(),
            full: "new".to_string(),
        })
        .unwrap();
    worker_tx
        .send(WorkerResponse::Done {
            full: "reply to second".to_string(),
        })
        .unwrap();

    assert_eq!(second.await.unwrap().unwrap(), "reply to second");
    assert_eq!(deltas.lock().unwrap().clone(), vec!["new".to_string()]);

    // Later requests stay paired with their own replies
    let third = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.chat(hello()).await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Chat { .. })
    ));
    worker_tx
        .send(WorkerResponse::Done {
            full: "reply to third".to_string(),
        })
        .unwrap();
    assert_eq!(third.await.unwrap().unwrap(), "reply to third");
}

#[tokio::test]
async fn test_abandoned_init_reply_is_not_reused() {
    let (bridge, mut worker_rx, worker_tx) = loaded_bridge().await;

    let init = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.init("big").await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Init { .. })
    ));
    init.abort();
    let _ = init.await;
    assert_eq!(bridge.loaded_model(), None);

    worker_tx
        .send(WorkerResponse::Progress {
            text: "fetching big".to_string(),
        })
        .unwrap();
    worker_tx
        .send(WorkerResponse::Ready {
            model: "big".to_string(),
        })
        .unwrap();

    let next = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.init("small").await }
    });
    assert!(matches!(
        worker_rx.recv().await,
        Some(WorkerRequest::Init { .. })
    ));
    worker_tx
        .send(WorkerResponse::Error {
            error: "does not fit".to_string(),
        })
        .unwrap();

    assert_eq!(
        next.await.unwrap(),
        Err(BridgeError::Worker("does not fit".to_string()))
    );
    assert_eq!(bridge.loaded_model(), None);
}
