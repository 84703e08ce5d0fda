// Configuration for the request loop

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};

use anyhow::Context;
use tts_core::{ogg::DEFAULT_QUALITY, piper::ESPEAK_DATA_ENV};

/// How finished audio leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Binary frames on stdout, for a consuming process.
    Framed,
    /// One `<id>.ogg` file per request, for manual use.
    Files,
    /// `Files` when stdout is a terminal, `Framed` otherwise.
    Auto,
}

impl OutputMode {
    /// Settle `Auto` against the actual stdout.
    pub fn resolve(self, stdout_is_terminal: bool) -> OutputMode {
        match self {
            OutputMode::Auto if stdout_is_terminal => OutputMode::Files,
            OutputMode::Auto => OutputMode::Framed,
            mode => mode,
        }
    }
}

impl FromStr for OutputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "framed" => Ok(OutputMode::Framed),
            "files" => Ok(OutputMode::Files),
            "auto" => Ok(OutputMode::Auto),
            other => Err(anyhow::anyhow!(
                "invalid output mode '{other}' (expected framed, files or auto)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub espeak_data_path: PathBuf,
    pub output_mode: OutputMode,
    pub output_dir: PathBuf,
    /// 0 encodes inline on the dispatching task.
    pub encode_workers: usize,
    pub vorbis_quality: f32,
    /// `None` keeps every voice for the lifetime of the process.
    pub max_cached_voices: Option<NonZeroUsize>,
}

impl ServerConfig {
    /// Build from the process arguments (without the program name) and
    /// environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build from explicit arguments and a variable lookup.
    pub fn from_sources<F>(args: &[String], var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let espeak_data_path = args
            .first()
            .cloned()
            .or_else(|| var(ESPEAK_DATA_ENV))
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Need espeak-ng-data path (first argument or {ESPEAK_DATA_ENV})"
                )
            })?;

        let output_mode = match var("TTS_OUTPUT_MODE") {
            Some(v) => v.parse().context("TTS_OUTPUT_MODE")?,
            None => OutputMode::Auto,
        };

        let output_dir = var("TTS_OUTPUT_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let encode_workers = match var("TTS_ENCODE_WORKERS") {
            Some(v) if v.trim().eq_ignore_ascii_case("auto") => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("invalid TTS_ENCODE_WORKERS '{v}'"))?,
            None => 0,
        };

        let vorbis_quality = match var("TTS_VORBIS_QUALITY") {
            Some(v) => v
                .trim()
                .parse::<f32>()
                .with_context(|| format!("invalid TTS_VORBIS_QUALITY '{v}'"))?,
            None => DEFAULT_QUALITY,
        };
        if !(-0.1..=1.0).contains(&vorbis_quality) {
            return Err(anyhow::anyhow!(
                "TTS_VORBIS_QUALITY must be between -0.1 and 1.0, got {vorbis_quality}"
            ));
        }

        let max_cached_voices = match var("TTS_MAX_CACHED_VOICES") {
            Some(v) => {
                let n: usize = v
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid TTS_MAX_CACHED_VOICES '{v}'"))?;
                Some(NonZeroUsize::new(n).ok_or_else(|| {
                    anyhow::anyhow!("TTS_MAX_CACHED_VOICES must be at least 1")
                })?)
            }
            None => None,
        };

        Ok(Self {
            espeak_data_path,
            output_mode,
            output_dir,
            encode_workers,
            vorbis_quality,
            max_cached_voices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(args: &[&str], vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_sources(&args, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&["/usr/share/espeak-ng-data"], &[]).unwrap();
        assert_eq!(config.espeak_data_path, PathBuf::from("/usr/share/espeak-ng-data"));
        assert_eq!(config.output_mode, OutputMode::Auto);
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.encode_workers, 0);
        assert_eq!(config.vorbis_quality, DEFAULT_QUALITY);
        assert!(config.max_cached_voices.is_none());
    }

    #[test]
    fn test_missing_espeak_path() {
        let err = config(&[], &[]).unwrap_err();
        assert!(err.to_string().contains("espeak-ng-data"));

        let from_env = config(&[], &[(ESPEAK_DATA_ENV, "/data")]).unwrap();
        assert_eq!(from_env.espeak_data_path, PathBuf::from("/data"));
    }

    #[test]
    fn test_overrides() {
        let config = config(
            &["data"],
            &[
                ("TTS_OUTPUT_MODE", "Framed"),
                ("TTS_OUTPUT_DIR", "/tmp/out"),
                ("TTS_ENCODE_WORKERS", "4"),
                ("TTS_VORBIS_QUALITY", "0.7"),
                ("TTS_MAX_CACHED_VOICES", "3"),
            ],
        )
        .unwrap();
        assert_eq!(config.output_mode, OutputMode::Framed);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.encode_workers, 4);
        assert!((config.vorbis_quality - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_cached_voices, NonZeroUsize::new(3));
    }

    #[test]
    fn test_auto_workers() {
        let config = config(&["data"], &[("TTS_ENCODE_WORKERS", "auto")]).unwrap();
        assert!(config.encode_workers >= 1);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&["data"], &[("TTS_OUTPUT_MODE", "stdout")]).is_err());
        assert!(config(&["data"], &[("TTS_ENCODE_WORKERS", "-2")]).is_err());
        assert!(config(&["data"], &[("TTS_VORBIS_QUALITY", "1.5")]).is_err());
        assert!(config(&["data"], &[("TTS_MAX_CACHED_VOICES", "0")]).is_err());
    }

    #[test]
    fn test_output_mode_resolution() {
        assert_eq!(OutputMode::Auto.resolve(true), OutputMode::Files);
        assert_eq!(OutputMode::Auto.resolve(false), OutputMode::Framed);
        assert_eq!(OutputMode::Framed.resolve(true), OutputMode::Framed);
        assert_eq!(OutputMode::Files.resolve(false), OutputMode::Files);
    }
}
