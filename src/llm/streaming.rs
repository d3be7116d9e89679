use std::io::Write;
use std::sync::Arc;

/// Receives generated tokens while a completion is still running.
pub trait StreamingCallback: Send + Sync {
    fn on_llm_new_token(&self, token: &str);

    fn on_llm_end(&self) {}
}

pub type Callbacks = Vec<Arc<dyn StreamingCallback>>;

/// Echoes tokens to standard output as they arrive.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutStreamingHandler;

impl StreamingCallback for StdoutStreamingHandler {
    fn on_llm_new_token(&self, token: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(token.as_bytes());
        let _ = stdout.flush();
    }

    fn on_llm_end(&self) {
        println!();
    }
}

pub fn callbacks_for(mute_stream: bool) -> Callbacks {
    if mute_stream {
        vec![]
    } else {
        vec![Arc::new(StdoutStreamingHandler) as Arc<dyn StreamingCallback>]
    }
}

pub(crate) fn emit_token(callbacks: &[Arc<dyn StreamingCallback>], token: &str) {
    for callback in callbacks {
        callback.on_llm_new_token(token);
    }
}

pub(crate) fn emit_end(callbacks: &[Arc<dyn StreamingCallback>]) {
    for callback in callbacks {
        callback.on_llm_end();
    }
}

/// Splits a server-sent-event byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload.to_string())
}
