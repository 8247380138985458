//! Scripted vendor API for provider tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ksyun_core::transcode::Payload;
use ksyun_provider::{ApiClient, ApiError, KsyunProvider, ProviderConfig, Service};

type Reply = Result<Payload, ApiError>;

/// Answers each action from a queue of scripted replies and records every call
#[derive(Default)]
pub struct FakeClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(Service, String, Payload)>>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a successful reply; `response` must be a JSON object
    pub fn reply(&self, action: &str, response: serde_json::Value) {
        let response = match response {
            serde_json::Value::Object(map) => map,
            other => panic!("scripted response for {} is not an object: {}", action, other),
        };
        self.push(action, Ok(response));
    }

    pub fn fail(&self, action: &str, error: ApiError) {
        self.push(action, Err(error));
    }

    pub fn fail_times(&self, action: &str, times: usize, error: ApiError) {
        for _ in 0..times {
            self.fail(action, error.clone());
        }
    }

    fn push(&self, action: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, action, _)| action.clone())
            .collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.actions().iter().filter(|a| *a == action).count()
    }

    /// Requests sent for `action`, oldest first
    pub fn requests(&self, action: &str) -> Vec<Payload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, a, _)| a == action)
            .map(|(_, _, request)| request.clone())
            .collect()
    }
}

#[async_trait]
impl ApiClient for FakeClient {
    async fn call(
        &self,
        service: Service,
        action: &str,
        request: &Payload,
    ) -> Result<Payload, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((service, action.to_string(), request.clone()));
        self.replies
            .lock()
            .unwrap()
            .get_mut(action)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ApiError::new("Unscripted", format!("no reply for {}", action))))
    }
}

pub fn transient() -> ApiError {
    ApiError::new("InternalError", "backend busy").with_status(500)
}

pub fn provider(client: &Arc<FakeClient>) -> KsyunProvider {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = ProviderConfig::new("cn-beijing-6", "AKTEST", "secret")
        .with_retry_interval(Duration::ZERO);
    KsyunProvider::new(client.clone(), config)
}
