use std::sync::Mutex;

use axum::Router;

use crate::llm::StreamingCallback;

/// Serves `app` on an ephemeral local port and returns its base URL.
pub(crate) async fn serve_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Default)]
pub(crate) struct TokenCollector {
    tokens: Mutex<Vec<String>>,
    ended: Mutex<usize>,
}

impl TokenCollector {
    pub(crate) fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub(crate) fn ends(&self) -> usize {
        *self.ended.lock().unwrap()
    }
}

impl StreamingCallback for TokenCollector {
    fn on_llm_new_token(&self, token: &str) {
        self.tokens.lock().unwrap().push(token.to_string());
    }

    fn on_llm_end(&self) {
        *self.ended.lock().unwrap() += 1;
    }
}
