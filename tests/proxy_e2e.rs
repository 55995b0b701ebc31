//! Proxy and panels wired together over real sockets, with OpenRouter
//! replaced by a local mock.

use std::net::SocketAddr;
use std::sync::Arc;

use httpmock::prelude::*;
use multilab::{
    Server,
    config::ProxyConfig,
    llm::OpenRouterClient,
    panel::{MemoryStore, ModelSpec, Orchestrator, Store, storage_key},
    proxy::{self, ChatProxy},
};
use serde_json::{Value, json};
use tokio::sync::oneshot;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Result<(), multilab::ServerError>>,
}

impl Running {
    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
    }
}

async fn start_proxy(api_key: Option<&str>, upstream_url: String) -> Running {
    let chat = Arc::new(ChatProxy::new(
        ProxyConfig::new(api_key),
        Arc::new(OpenRouterClient::with_endpoint(upstream_url)),
    ));
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(proxy::app(chat).into_handler(), async {
        let _ = stopped.await;
    }));
    Running { addr, stop, task }
}

#[tokio::test]
async fn health_reports_running() {
    let proxy = start_proxy(None, "http://127.0.0.1:9/unused".into()).await;

    let res = reqwest::get(format!("{}/api/health", proxy.url())).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.headers()["access-control-allow-origin"].to_str().unwrap(),
        "*"
    );
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "message": "Multi-AI Lab API is running"}));

    proxy.stop().await;
}

#[tokio::test]
async fn chat_is_forwarded_and_sanitized() {
    let upstream = MockServer::start_async().await;
    let completion = upstream
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-or-test")
                .header("x-title", "Multi AI Lab")
                .json_body(json!({
                    "model": "qwen/qwen3-8b:free",
                    "messages": [{"role": "user", "content": "hi"}],
                    "temperature": 0.7,
                    "top_p": 1.0,
                    "max_tokens": 1000,
                    "stream": false
                }));
            then.status(200).json_body(json!({
                "id": "gen-1",
                "choices": [{"message": {"role": "assistant", "content": "<b>Hello</b>▁world  "}}]
            }));
        })
        .await;

    let proxy = start_proxy(Some(" 'sk-or-test' "), upstream.url("/v1/chat/completions")).await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/chat", proxy.url()))
        .json(&json!({"model": "qwen/qwen3-8b:free", "messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["id"], "gen-1");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");

    completion.assert_async().await;
    proxy.stop().await;
}

#[tokio::test]
async fn missing_key_is_reported_without_calling_upstream() {
    let upstream = MockServer::start_async().await;
    let completion = upstream
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;
    let proxy = start_proxy(None, upstream.url("/v1/chat/completions")).await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/chat", proxy.url()))
        .json(&json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "server_error");
    assert_eq!(body["details"], "API Key not configured on server");

    assert_eq!(completion.hits_async().await, 0);
    proxy.stop().await;
}

#[tokio::test]
async fn panels_round_trip_through_the_proxy() {
    let upstream = MockServer::start_async().await;
    upstream
        .mock_async(|when, then| {
            when.method(POST).body_contains("google/gemma-3-12b-it:free");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "from gemma"}}]
            }));
        })
        .await;
    upstream
        .mock_async(|when, then| {
            when.method(POST).body_contains("mistralai/mistral-7b-instruct:free");
            then.status(429).json_body(json!({
                "error": {"message": "Rate limit exceeded", "code": 429}
            }));
        })
        .await;

    let proxy = start_proxy(Some("sk-or-test"), upstream.url("/v1/chat/completions")).await;

    let store = Arc::new(MemoryStore::new());
    let mut lab = Orchestrator::new(
        [
            ModelSpec::new("google/gemma-3-12b-it:free", "Gemini 3 12b"),
            ModelSpec::new("mistralai/mistral-7b-instruct:free", "Mistral 7B"),
        ],
        Arc::new(multilab::panel::HttpBackend::new(&proxy.url())),
        store.clone(),
    );

    lab.send_to_all("compare yourselves").await;

    let gemma = lab.panel("google/gemma-3-12b-it:free").unwrap().transcript();
    assert_eq!(gemma.len(), 2);
    assert_eq!(gemma[1].content, "from gemma");

    let mistral = lab.panel("mistralai/mistral-7b-instruct:free").unwrap().transcript();
    assert_eq!(mistral.len(), 2);
    assert_eq!(mistral[1].content, "Error: Rate limit exceeded (HTTP 429)");

    let saved = store
        .load(&storage_key("google/gemma-3-12b-it:free"))
        .unwrap()
        .unwrap();
    let saved: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved[0], json!({"role": "user", "content": "compare yourselves"}));

    proxy.stop().await;
}
