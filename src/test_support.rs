//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::mcp::transport::{Transport, TransportError};

/// A scripted transport: pops a canned result per request and records what
/// was asked, so tests can assert on the call sequence.
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    log: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockTransport {
    pub fn new(responses: Vec<Result<Value, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle onto the request log, usable after the transport is boxed.
    pub fn log(&self) -> Arc<Mutex<Vec<(String, Value)>>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.log.lock().unwrap().push((method.to_string(), params));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Closed))
    }

    async fn notify(&mut self, _method: &str, _params: Value) -> Result<(), TransportError> {
        Ok(())
    }
}
