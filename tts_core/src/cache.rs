use std::{
    num::NonZeroUsize,
    path::Path,
    sync::{Arc, Mutex},
};

use dashmap::{mapref::entry::Entry, DashMap};
use lru::LruCache;
use tracing::{info, warn};

use crate::{
    error::TtsError,
    voice::{config_path_for, Voice, VoiceEngine, PCM16_SAMPLE_WIDTH},
};

enum CacheEntry<M> {
    Ready(Arc<Voice<M>>),
    // Remembered so later requests for the same path fail without reloading
    Rejected { width: u16 },
}

/// Loaded voices keyed by model path.
///
/// A new path is loaded while its entry is locked, so concurrent resolution
/// of the same path loads it once. Already-resolved voices are read
/// concurrently.
pub struct VoiceCache<E: VoiceEngine> {
    engine: Arc<E>,
    voices: DashMap<String, CacheEntry<E::Model>>,
    // Recency order, only tracked when the cache is bounded
    recency: Option<Mutex<LruCache<String, ()>>>,
}

impl<E: VoiceEngine> VoiceCache<E> {
    /// Unbounded cache: voices live for the lifetime of the process.
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            voices: DashMap::new(),
            recency: None,
        }
    }

    /// Cache that evicts the least recently resolved voice beyond `max_voices`.
    pub fn with_capacity_limit(engine: Arc<E>, max_voices: NonZeroUsize) -> Self {
        Self {
            engine,
            voices: DashMap::new(),
            recency: Some(Mutex::new(LruCache::new(max_voices))),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Number of cached paths, rejected ones included.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn contains(&self, model_path: &str) -> bool {
        self.voices.contains_key(model_path)
    }

    /// Return the voice for `model_path`, loading it on first reference.
    pub fn resolve(&self, model_path: &str) -> Result<Arc<Voice<E::Model>>, TtsError> {
        let cached = self.voices.get(model_path).map(|entry| match entry.value() {
            CacheEntry::Ready(voice) => Ok(voice.clone()),
            CacheEntry::Rejected { width } => Err(*width),
        });
        match cached {
            Some(Ok(voice)) => {
                self.touch(model_path);
                return Ok(voice);
            }
            Some(Err(width)) => {
                return Err(TtsError::UnsupportedSampleWidth {
                    model_path: model_path.to_string(),
                    width,
                });
            }
            None => {}
        }

        // Another caller may have loaded the path between the read and this lock.
        let voice = match self.voices.entry(model_path.to_string()) {
            Entry::Occupied(entry) => match entry.get() {
                CacheEntry::Ready(voice) => voice.clone(),
                CacheEntry::Rejected { width } => {
                    return Err(TtsError::UnsupportedSampleWidth {
                        model_path: model_path.to_string(),
                        width: *width,
                    });
                }
            },
            Entry::Vacant(entry) => {
                let config_path = config_path_for(model_path);
                info!("Loading voice {} (config {})", model_path, config_path.display());

                let (model, config) = self
                    .engine
                    .load(Path::new(model_path), &config_path)
                    .map_err(|source| TtsError::VoiceLoad {
                        model_path: model_path.to_string(),
                        source,
                    })?;

                if config.sample_width != PCM16_SAMPLE_WIDTH {
                    warn!(
                        "Voice {} has sample width {}, expected {}",
                        model_path, config.sample_width, PCM16_SAMPLE_WIDTH
                    );
                    entry.insert(CacheEntry::Rejected {
                        width: config.sample_width,
                    });
                    return Err(TtsError::UnsupportedSampleWidth {
                        model_path: model_path.to_string(),
                        width: config.sample_width,
                    });
                }

                info!(
                    "Loaded voice {} ({} Hz, {} channel(s))",
                    model_path, config.sample_rate, config.channels
                );
                let voice = Arc::new(Voice::new(model_path, config, model));
                entry.insert(CacheEntry::Ready(voice.clone()));
                voice
            }
        };

        // The entry guard is released above; eviction may touch any shard.
        self.touch(model_path);
        Ok(voice)
    }

    fn touch(&self, model_path: &str) {
        let Some(recency) = &self.recency else {
            return;
        };
        let evicted = {
            let mut order = recency.lock().unwrap_or_else(|e| e.into_inner());
            order
                .push(model_path.to_string(), ())
                .filter(|(key, _)| key != model_path)
                .map(|(key, _)| key)
        };
        if let Some(key) = evicted {
            info!("Evicting voice {} from cache", key);
            self.voices.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::AudioConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        loads: AtomicUsize,
        sample_width: u16,
        fail_on: Option<&'static str>,
    }

    impl CountingEngine {
        fn new(sample_width: u16) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                sample_width,
                fail_on: None,
            }
        }
    }

    impl VoiceEngine for CountingEngine {
        type Model = String;

        fn load(&self, model_path: &Path, config_path: &Path) -> anyhow::Result<(String, AudioConfig)> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == model_path.to_str() {
                anyhow::bail!("no such model");
            }
            assert_eq!(config_path, config_path_for(model_path.to_str().unwrap()));
            let config = AudioConfig {
                sample_rate: 22050,
                channels: 1,
                sample_width: self.sample_width,
            };
            Ok((model_path.display().to_string(), config))
        }

        fn infer(&self, _model: &String, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_same_path_loads_once() {
        let engine = Arc::new(CountingEngine::new(2));
        let cache = VoiceCache::new(engine.clone());

        let first = cache.resolve("en_US-test.onnx").unwrap();
        let second = cache.resolve("en_US-test.onnx").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.model(), "en_US-test.onnx");
    }

    #[test]
    fn test_distinct_paths_load_independently() {
        let engine = Arc::new(CountingEngine::new(2));
        let cache = VoiceCache::new(engine.clone());

        cache.resolve("a.onnx").unwrap();
        cache.resolve("b.onnx").unwrap();
        cache.resolve("a.onnx").unwrap();

        assert_eq!(engine.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_unsupported_width_is_remembered() {
        let engine = Arc::new(CountingEngine::new(4));
        let cache = VoiceCache::new(engine.clone());

        for _ in 0..3 {
            match cache.resolve("wide.onnx") {
                Err(TtsError::UnsupportedSampleWidth { width, .. }) => assert_eq!(width, 4),
                other => panic!("expected UnsupportedSampleWidth, got {other:?}"),
            }
        }
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
        assert!(cache.contains("wide.onnx"));
    }

    #[test]
    fn test_load_failure_is_not_cached() {
        let engine = Arc::new(CountingEngine {
            fail_on: Some("missing.onnx"),
            ..CountingEngine::new(2)
        });
        let cache = VoiceCache::new(engine.clone());

        assert!(matches!(cache.resolve("missing.onnx"), Err(TtsError::VoiceLoad { .. })));
        assert!(matches!(cache.resolve("missing.onnx"), Err(TtsError::VoiceLoad { .. })));
        assert_eq!(engine.loads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());

        cache.resolve("present.onnx").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_resolution_loads_once() {
        let engine = Arc::new(CountingEngine::new(2));
        let cache = Arc::new(VoiceCache::new(engine.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.resolve("shared.onnx").map(|_| ()).is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bounded_cache_evicts_least_recent() {
        let engine = Arc::new(CountingEngine::new(2));
        let cache = VoiceCache::with_capacity_limit(engine.clone(), NonZeroUsize::new(2).unwrap());

        cache.resolve("a.onnx").unwrap();
        cache.resolve("b.onnx").unwrap();
        cache.resolve("a.onnx").unwrap();
        cache.resolve("c.onnx").unwrap();

        assert!(cache.contains("a.onnx"));
        assert!(!cache.contains("b.onnx"));
        assert!(cache.contains("c.onnx"));

        cache.resolve("b.onnx").unwrap();
        assert_eq!(engine.loads.load(Ordering::SeqCst), 4);
    }
}
