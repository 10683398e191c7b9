//! scripted fetcher shared by the poller and server tests

use crate::fetcher::{FetchError, Fetcher};

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
enum Reply {
    Json(Value),
    Status(StatusCode),
}

/// answers per url from a script and records every call.
/// unknown urls answer 404.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn reply_json(&self, url: &str, value: Value) {
        self.replies.lock().insert(url.to_string(), Reply::Json(value));
    }

    pub fn reply_status(&self, url: &str, status: StatusCode) {
        self.replies.lock().insert(url.to_string(), Reply::Status(status));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.calls.lock().push(url.to_string());

        let reply = self.replies.lock().get(url).cloned();
        match reply {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Status(status)) => Err(FetchError::Status { url: url.to_string(), status }),
            None => Err(FetchError::Status { url: url.to_string(), status: StatusCode::NOT_FOUND }),
        }
    }
}
