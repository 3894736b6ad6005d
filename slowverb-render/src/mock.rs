//! In-memory codec engine for tests

use crate::engine::{CodecEngine, EngineError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const RENDERED: &[u8] = b"rendered";

pub(crate) struct MemoryEngine {
    supported: bool,
    load_delay: Duration,
    exec_delay: Duration,
    failing_loads: AtomicUsize,
    fail_exec: bool,
    loads: AtomicUsize,
    files: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
    execs: Mutex<Vec<Vec<String>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            supported: true,
            load_delay: Duration::ZERO,
            exec_delay: Duration::ZERO,
            failing_loads: AtomicUsize::new(0),
            fail_exec: false,
            loads: AtomicUsize::new(0),
            files: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    /// Fail the next `n` load calls
    pub fn failing_loads(self, n: usize) -> Self {
        self.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_exec(mut self) -> Self {
        self.fail_exec = true;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Files currently present, sorted
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn written_names(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn exec_args(&self) -> Vec<Vec<String>> {
        self.execs.lock().clone()
    }

    pub fn max_concurrent_execs(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodecEngine for MemoryEngine {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn load(&self) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;

        let fail = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(EngineError::Load("simulated load failure".to_string()));
        }
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.writes.lock().push(name.to_string());
        self.files.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn exec(
        &self,
        args: &[String],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), EngineError> {
        self.execs.lock().push(args.to_vec());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        for step in [0.0, 0.25, 0.5] {
            progress(step);
            tokio::time::sleep(self.exec_delay).await;
        }

        let result = if self.fail_exec {
            Err(EngineError::Exec {
                code: Some(1),
                message: "simulated failure".to_string(),
            })
        } else {
            let input = args
                .iter()
                .position(|a| a == "-i")
                .and_then(|i| args.get(i + 1));
            match (input, args.last()) {
                (Some(input), Some(output)) if self.files.lock().contains_key(input) => {
                    self.files.lock().insert(output.clone(), RENDERED.to_vec());
                    progress(1.0);
                    Ok(())
                }
                _ => Err(EngineError::NotFound("input".to_string())),
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
