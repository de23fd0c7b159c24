//! Exclusive access to the inference device, with device memory released
//! after every call.

use async_trait::async_trait;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{Config, TranslationConfig};
use crate::error::{Result, VidsubError};
use crate::stage::Stage;

/// Frees whatever a finished inference call left resident on the device.
#[async_trait]
pub trait DeviceMemory: Send + Sync {
    fn name(&self) -> &str;

    async fn release(&self) -> Result<()>;
}

/// Nothing to free, for CPU-only runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostMemory;

#[async_trait]
impl DeviceMemory for HostMemory {
    fn name(&self) -> &str {
        "host"
    }

    async fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Evicts the translation model from the Ollama server by requesting it with
/// `keep_alive: 0`.
pub struct OllamaModelUnloader {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaModelUnloader {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl DeviceMemory for OllamaModelUnloader {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn release(&self) -> Result<()> {
        let url = format!("{}/api/generate", self.endpoint);
        debug!("Unloading model {} via {}", self.model, url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "keep_alive": 0 }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VidsubError::Translation(format!(
                "Model unload returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Cloneable handle to the process-wide inference gate.
#[derive(Clone)]
pub struct Accelerator {
    gate: Arc<Mutex<()>>,
    busy: Arc<AtomicBool>,
    memory: Arc<dyn DeviceMemory>,
    timeout: Option<Duration>,
}

impl Accelerator {
    pub fn new(memory: Arc<dyn DeviceMemory>) -> Self {
        Self {
            gate: Arc::new(Mutex::new(())),
            busy: Arc::new(AtomicBool::new(false)),
            memory,
            timeout: None,
        }
    }

    /// Gate for a configured run: the translation model is unloaded after each
    /// call unless disabled, and calls are bounded by the inference timeout.
    pub fn from_config(config: &Config) -> Result<Self> {
        let memory: Arc<dyn DeviceMemory> = if config.accelerator.unload_translation_model {
            Arc::new(OllamaModelUnloader::new(&config.translation)?)
        } else {
            Arc::new(HostMemory)
        };
        let timeout = config
            .accelerator
            .inference_timeout_secs
            .map(Duration::from_secs);
        Ok(Self::new(memory).with_timeout(timeout))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when no lease is outstanding and no release is in flight.
    pub fn is_free(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    /// Wait for exclusive use of the device.
    pub async fn acquire(&self, stage: Stage) -> AcceleratorLease {
        let guard = self.gate.clone().lock_owned().await;
        self.busy.store(true, Ordering::SeqCst);
        debug!("Accelerator acquired by {}", stage);
        AcceleratorLease {
            guard: Some(guard),
            busy: self.busy.clone(),
            memory: self.memory.clone(),
            stage,
        }
    }

    /// Run one inference call under the gate.
    ///
    /// Device memory is released whether the call succeeds, fails or times
    /// out. If the returned future is dropped mid-call, the lease's `Drop`
    /// schedules the release instead.
    pub async fn run<T, F, Fut>(&self, stage: Stage, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lease = self.acquire(stage).await;

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} inference exceeded {}s", stage, limit.as_secs());
                    Err(VidsubError::Timeout {
                        stage,
                        seconds: limit.as_secs(),
                    })
                }
            },
            None => call().await,
        };

        lease.release().await;
        outcome
    }
}

/// Exclusive hold on the accelerator.
pub struct AcceleratorLease {
    guard: Option<OwnedMutexGuard<()>>,
    busy: Arc<AtomicBool>,
    memory: Arc<dyn DeviceMemory>,
    stage: Stage,
}

impl AcceleratorLease {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Free device memory, then give up the gate.
    pub async fn release(mut self) {
        if let Err(e) = self.memory.release().await {
            warn!(
                "Failed to release {} device memory after {}: {}",
                self.memory.name(),
                self.stage,
                e
            );
        }
        self.busy.store(false, Ordering::SeqCst);
        self.guard.take();
        info!("Accelerator released after {}", self.stage);
    }
}

impl Drop for AcceleratorLease {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        warn!("Accelerator lease for {} dropped mid-call", self.stage);
        let memory = self.memory.clone();
        let busy = self.busy.clone();
        let stage = self.stage;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                // the gate stays held until memory is freed
                handle.spawn(async move {
                    if let Err(e) = memory.release().await {
                        warn!("Deferred device release after {} failed: {}", stage, e);
                    }
                    busy.store(false, Ordering::SeqCst);
                    drop(guard);
                });
            }
            Err(_) => {
                busy.store(false, Ordering::SeqCst);
                drop(guard);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingMemory {
        releases: AtomicUsize,
    }

    #[async_trait]
    impl DeviceMemory for CountingMemory {
        fn name(&self) -> &str {
            "counting"
        }

        async fn release(&self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn accelerator() -> (Accelerator, Arc<CountingMemory>) {
        let memory = Arc::new(CountingMemory::default());
        (Accelerator::new(memory.clone()), memory)
    }

    #[tokio::test]
    async fn test_release_after_success() {
        let (accelerator, memory) = accelerator();
        let probe = accelerator.clone();

        let value = accelerator
            .run(Stage::Transcribe, || async move {
                assert!(!probe.is_free());
                Ok(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(accelerator.is_free());
        assert_eq!(memory.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_after_failure() {
        let (accelerator, memory) = accelerator();

        let result: Result<()> = accelerator
            .run(Stage::Translate, || async {
                Err(VidsubError::Translation("model crashed".to_string()))
            })
            .await;

        assert!(matches!(result, Err(VidsubError::Translation(_))));
        assert!(accelerator.is_free());
        assert_eq!(memory.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_releases_and_reports_stage() {
        let (accelerator, memory) = accelerator();
        let accelerator = accelerator.with_timeout(Some(Duration::from_millis(20)));

        let result: Result<()> = accelerator
            .run(Stage::Transcribe, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(VidsubError::Timeout { stage: Stage::Transcribe, .. })
        ));
        assert!(accelerator.is_free());
        assert_eq!(memory.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calls_never_overlap() {
        let (accelerator, memory) = accelerator();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let accelerator = accelerator.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                accelerator
                    .run(Stage::Translate, || async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(memory.releases.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancelled_call_still_releases() {
        let (accelerator, memory) = accelerator();
        let worker = accelerator.clone();

        let task = tokio::spawn(async move {
            worker
                .run(Stage::Transcribe, || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
                .await
        });
        while accelerator.is_free() {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        // the deferred release runs on the runtime
        let lease = accelerator.acquire(Stage::Translate).await;
        assert_eq!(memory.releases.load(Ordering::SeqCst), 1);
        lease.release().await;
        assert!(accelerator.is_free());
    }

    #[test]
    fn test_host_memory_release_is_noop() {
        tokio_test::block_on(async {
            assert!(HostMemory.release().await.is_ok());
        });
    }
}
