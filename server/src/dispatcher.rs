//! The request loop: read request lines, synthesize on a single lane,
//! encode inline or on a bounded worker pool, and emit self-identifying
//! responses through one shared sink.

use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::Semaphore,
    task::JoinSet,
};
use tracing::{error, info, warn};
use tts_core::{AudioConfig, OggEncoder, Synthesizer, VoiceCache, VoiceEngine};

use crate::{
    error::RequestError,
    metrics::DispatchMetrics,
    request::{parse_request, Request},
    sink::OutputSink,
};

// Synthesized PCM on its way to the encoder
struct EncodeJob {
    id: u32,
    config: AudioConfig,
    pcm: Vec<i16>,
}

pub struct Dispatcher<E: VoiceEngine, W> {
    cache: Arc<VoiceCache<E>>,
    synthesizer: Arc<Synthesizer<E>>,
    encoder: Arc<OggEncoder>,
    sink: Arc<Mutex<OutputSink<W>>>,
    metrics: Arc<DispatchMetrics>,
    encode_workers: usize,
}

impl<E, W> Dispatcher<E, W>
where
    E: VoiceEngine,
    W: Write + Send + 'static,
{
    /// `encode_workers == 0` encodes each request before reading the next.
    pub fn new(
        cache: Arc<VoiceCache<E>>,
        encoder: OggEncoder,
        sink: OutputSink<W>,
        encode_workers: usize,
    ) -> Self {
        let synthesizer = Arc::new(Synthesizer::new(cache.engine().clone()));
        Self {
            cache,
            synthesizer,
            encoder: Arc::new(encoder),
            sink: Arc::new(Mutex::new(sink)),
            metrics: Arc::new(DispatchMetrics::new()),
            encode_workers,
        }
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    pub fn cache(&self) -> &Arc<VoiceCache<E>> {
        &self.cache
    }

    /// Serve requests until end of input or a read error, then wait for
    /// outstanding encoder work.
    pub async fn run<R: AsyncBufRead + Unpin>(&self, mut reader: R) {
        let mut pool = EncodePool::new(self.encode_workers, self.metrics.clone());
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("Error reading request: {e}");
                    break;
                }
            }

            let request = match parse_request(&line) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    report_drop(&self.metrics, None, &e);
                    continue;
                }
            };
            self.metrics.record_received();

            let id = request.id;
            let job = match self.synthesize(request).await {
                Ok(job) => job,
                Err(e) => {
                    report_drop(&self.metrics, Some(id), &e);
                    continue;
                }
            };
            pool.submit(self.encode_task(job)).await;
        }

        info!("Waiting for encoder pool to finish.");
        pool.drain().await;
    }

    /// Resolve the voice and synthesize, one request at a time.
    async fn synthesize(&self, request: Request) -> Result<EncodeJob, RequestError> {
        let cache = self.cache.clone();
        let synthesizer = self.synthesizer.clone();
        let metrics = self.metrics.clone();

        tokio::task::spawn_blocking(move || -> Result<EncodeJob, RequestError> {
            let voice = cache.resolve(&request.model_path)?;
            let synthesis = synthesizer.synthesize(&voice, &request.input_text)?;
            metrics.record_synthesis(&synthesis.stats);
            Ok(EncodeJob {
                id: request.id,
                config: voice.config(),
                pcm: synthesis.pcm,
            })
        })
        .await
        .map_err(|e| RequestError::Worker(format!("synthesis task: {e}")))?
    }

    fn encode_task(&self, job: EncodeJob) -> impl FnOnce() + Send + 'static {
        let encoder = self.encoder.clone();
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();

        move || {
            let id = job.id;
            match encode_and_emit(&encoder, &sink, job) {
                Ok(len) => metrics.record_emitted(len),
                Err(e) => report_drop(&metrics, Some(id), &e),
            }
        }
    }
}

fn encode_and_emit<W: Write>(
    encoder: &OggEncoder,
    sink: &Mutex<OutputSink<W>>,
    job: EncodeJob,
) -> Result<usize, RequestError> {
    let audio = encoder.encode(&job.config, &job.pcm)?;

    // One frame at a time on the shared output
    let mut sink = sink.lock().unwrap_or_else(|e| e.into_inner());
    sink.emit(job.id, &audio)
        .map_err(|source| RequestError::Emit { id: job.id, source })?;
    Ok(audio.len())
}

fn report_drop(metrics: &DispatchMetrics, id: Option<u32>, err: &RequestError) {
    metrics.record_drop(err.reason());
    match id {
        Some(id) => error!("Dropping request {id}: {err}"),
        None => warn!("Skipping input line: {err}"),
    }
}

/// Runs encode tasks inline, or on at most `workers` blocking threads.
struct EncodePool {
    permits: Option<Arc<Semaphore>>,
    tasks: JoinSet<()>,
    metrics: Arc<DispatchMetrics>,
}

impl EncodePool {
    fn new(workers: usize, metrics: Arc<DispatchMetrics>) -> Self {
        let permits = (workers > 0).then(|| Arc::new(Semaphore::new(workers)));
        if workers > 0 {
            info!("Encoding on {} worker(s)", workers);
        }
        Self {
            permits,
            tasks: JoinSet::new(),
            metrics,
        }
    }

    /// Run or queue `task`. With a pool this waits for a free worker, so the
    /// reader never runs ahead of the encoders by more than `workers` jobs.
    async fn submit<F>(&mut self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(permits) = &self.permits else {
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                self.report_failure(e);
            }
            return;
        };

        match permits.clone().acquire_owned().await {
            Ok(permit) => {
                self.reap_finished();
                self.tasks.spawn_blocking(move || {
                    let _permit = permit;
                    task()
                });
            }
            Err(e) => {
                // The semaphore is never closed; fall back to running inline.
                warn!("Encoder pool unavailable ({e}), encoding inline");
                if let Err(e) = tokio::task::spawn_blocking(task).await {
                    self.report_failure(e);
                }
            }
        }
    }

    // Release finished tasks so the set only holds work still in flight
    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                self.report_failure(e);
            }
        }
    }

    async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                self.report_failure(e);
            }
        }
    }

    fn report_failure(&self, e: tokio::task::JoinError) {
        let err = RequestError::Worker(format!("encoder task: {e}"));
        report_drop(&self.metrics, None, &err);
    }
}
