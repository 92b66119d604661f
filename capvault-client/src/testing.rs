//! Scripted in-process transport for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use capvault_core::ClientResult;
use serde_json::Value;

use crate::connection::ApiTransport;

#[derive(Clone, Debug)]
pub struct Call {
    pub method: &'static str,
    pub endpoint: String,
    pub body: Option<Value>,
    pub tokens: Vec<String>,
}

type Handler = Box<dyn Fn(&Call) -> ClientResult<Value> + Send + Sync>;

pub struct FakeTransport {
    name: String,
    url: String,
    handler: Handler,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn new(
        name: &str,
        handler: impl Fn(&Call) -> ClientResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            url: format!("https://{}.test", name),
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: Call) -> ClientResult<Value> {
        let result = (self.handler)(&call);
        self.calls.lock().unwrap().push(call);
        result
    }
}

#[async_trait]
impl ApiTransport for FakeTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_url(&self) -> &str {
        &self.url
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
        tokens: &[String],
    ) -> ClientResult<Value> {
        self.record(Call {
            method: "POST",
            endpoint: endpoint.to_string(),
            body: Some(body.clone()),
            tokens: tokens.to_vec(),
        })
    }

    async fn get_json(&self, endpoint: &str, tokens: &[String]) -> ClientResult<Value> {
        self.record(Call {
            method: "GET",
            endpoint: endpoint.to_string(),
            body: None,
            tokens: tokens.to_vec(),
        })
    }
}
