//! Recording capability doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flow_host::{
    CapabilityError, DurationHint, HttpResponse, Persistence, PingResult, SandboxCapability,
    UiController, Value,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum UiCall {
    Toast(String),
    Dialog { title: String, message: String },
    Navigate { screen_id: String, extras: BTreeMap<String, Value> },
}

#[derive(Debug, Default)]
pub struct RecordingUi {
    calls: Mutex<Vec<UiCall>>,
}

impl RecordingUi {
    pub fn calls(&self) -> Vec<UiCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UiController for RecordingUi {
    async fn show_toast(&self, message: &str, _duration: DurationHint) {
        self.calls.lock().unwrap().push(UiCall::Toast(message.to_string()));
    }

    async fn show_dialog(&self, title: &str, message: &str, _duration: DurationHint) {
        self.calls.lock().unwrap().push(UiCall::Dialog {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    async fn navigate_to_screen(&self, screen_id: &str, extras: &BTreeMap<String, Value>) {
        self.calls.lock().unwrap().push(UiCall::Navigate {
            screen_id: screen_id.to_string(),
            extras: extras.clone(),
        });
    }
}

/// Sandbox returning canned results and recording requested URLs
#[derive(Debug)]
pub struct ScriptedSandbox {
    pub http: Result<HttpResponse, CapabilityError>,
    pub ping: Result<PingResult, CapabilityError>,
    pub image: Result<Vec<u8>, CapabilityError>,
    pub panic_on_http: bool,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn failing() -> Self {
        Self {
            http: Err(CapabilityError::Network("connection refused".into())),
            ping: Err(CapabilityError::Timeout(2_000)),
            image: Err(CapabilityError::Unavailable("camera".into())),
            panic_on_http: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(body: &str) -> Self {
        Self {
            http: Ok(HttpResponse {
                body: body.to_string(),
                status_code: 200,
                content_type: "text/plain".into(),
            }),
            ping: Ok(PingResult { latency_ms: 12 }),
            image: Ok(vec![1, 2, 3]),
            panic_on_http: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_http: true,
            ..Self::failing()
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxCapability for ScriptedSandbox {
    async fn http_get(
        &self,
        url: &str,
        _max_bytes: u64,
        _timeout_ms: u64,
    ) -> Result<HttpResponse, CapabilityError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.panic_on_http {
            panic!("sandbox exploded");
        }
        self.http.clone()
    }

    async fn tcp_ping(
        &self,
        host: &str,
        port: u16,
        _timeout_ms: u64,
    ) -> Result<PingResult, CapabilityError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{}:{}", host, port));
        self.ping.clone()
    }

    async fn capture_image(&self) -> Result<Vec<u8>, CapabilityError> {
        self.image.clone()
    }
}

#[derive(Debug, Default)]
pub struct RecordingPersistence {
    snapshots: Mutex<Vec<BTreeMap<String, Value>>>,
}

impl RecordingPersistence {
    pub fn snapshots(&self) -> Vec<BTreeMap<String, Value>> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn persist(&self, state: &BTreeMap<String, Value>) {
        self.snapshots.lock().unwrap().push(state.clone());
    }
}
