use axum::http::{header, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 按顺序应答的本地 HTTP 服务，记录收到的请求
pub struct TestServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl TestServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

/// 每个请求依次取一条 `(状态码, JSON 正文)` 应答，用完后一律返回 500
pub async fn serve(responses: Vec<(u16, &'static str)>) -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let replies = Arc::new(Mutex::new(VecDeque::from(responses)));

    let (counter, recorded) = (hits.clone(), requests.clone());
    let router = Router::new().fallback(move |method: Method, uri: Uri, body: String| {
        let (counter, recorded, replies) = (counter.clone(), recorded.clone(), replies.clone());
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            recorded
                .lock()
                .expect("request log poisoned")
                .push(RecordedRequest {
                    method: method.to_string(),
                    path: uri.path().to_string(),
                    body,
                });
            let (status, body) = replies
                .lock()
                .expect("reply queue poisoned")
                .pop_front()
                .unwrap_or((500, "{\"error\":\"no more replies\"}"));
            (
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("test server has no address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("test server stopped");
    });

    TestServer {
        base_url: format!("http://{}", addr),
        hits,
        requests,
    }
}
