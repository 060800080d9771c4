#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use checker_core::{Channel, FailureKind, Resolution};
use checker_engine::{FrameInfo, GeoError, GeoLookup, ProbeError, StreamOpener};
use url::Url;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub fn channel(id: u64, urls: &[&str]) -> Channel {
    Channel::new(
        id,
        format!("channel-{id}"),
        "Test",
        urls.iter().map(|url| url.to_string()).collect(),
    )
}

#[derive(Debug, Clone)]
pub enum Script {
    Frame { delay: Duration, resolution: Resolution },
    Fail { delay: Duration, kind: FailureKind },
    Hang,
}

impl Script {
    pub fn ok(delay_ms: u64, width: u32, height: u32) -> Self {
        Script::Frame {
            delay: Duration::from_millis(delay_ms),
            resolution: Resolution::new(width, height),
        }
    }

    pub fn fail(delay_ms: u64, kind: FailureKind) -> Self {
        Script::Fail {
            delay: Duration::from_millis(delay_ms),
            kind,
        }
    }
}

/// Counts live opens; decremented when the open future is dropped, on any path.
struct OpenGuard {
    in_flight: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opener whose behaviour per URL is scripted. Unscripted URLs hang.
#[derive(Default)]
pub struct ScriptedOpener {
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    calls: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open of `url` follows `script`.
    pub fn script(self, url: &str, script: Script) -> Self {
        self.script_sequence(url, vec![script])
    }

    /// Successive opens of `url` follow `scripts` in turn; the last one repeats.
    pub fn script_sequence(self, url: &str, scripts: Vec<Script>) -> Self {
        let key = Url::parse(url).expect("scripted url").to_string();
        self.scripts.lock().unwrap().insert(key, scripts);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn next_script(&self, url: &str) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue[0].clone(),
            None => Script::Hang,
        }
    }
}

#[async_trait::async_trait]
impl StreamOpener for ScriptedOpener {
    async fn first_frame(&self, url: &Url) -> Result<FrameInfo, ProbeError> {
        self.calls.lock().unwrap().push(url.to_string());
        let script = self.next_script(url.as_str());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = OpenGuard {
            in_flight: self.in_flight.clone(),
            released: self.released.clone(),
        };

        match script {
            Script::Frame { delay, resolution } => {
                tokio::time::sleep(delay).await;
                Ok(FrameInfo { resolution })
            }
            Script::Fail { delay, kind } => {
                tokio::time::sleep(delay).await;
                Err(ProbeError::new(kind, "scripted failure"))
            }
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProbeError::new(FailureKind::Timeout, "hung"))
            }
        }
    }
}

/// Geo lookup that counts calls and answers from a fixed table.
#[derive(Default)]
pub struct CountingLookup {
    labels: HashMap<String, String>,
    calls: AtomicUsize,
}

impl CountingLookup {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            labels: entries
                .iter()
                .map(|(host, label)| (host.to_string(), label.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GeoLookup for CountingLookup {
    async fn lookup(&self, host: &str) -> Result<String, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.labels
            .get(host)
            .cloned()
            .ok_or_else(|| GeoError::Rejected(format!("no entry for {host}")))
    }
}
