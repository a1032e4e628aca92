use ort::session::builder::SessionBuilder;
use ort::Error;

const DEFAULT_MAX_THREADS: usize = 4;

pub const INTRA_THREADS_ENV: &str = "SCANSORT_OCR_THREADS";
pub const INTER_THREADS_ENV: &str = "SCANSORT_OCR_INTER_THREADS";

/// ONNX Runtime thread pool sizes shared by every session of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSettings {
    pub intra: usize,
    pub inter: usize,
}

impl ThreadSettings {
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var(INTRA_THREADS_ENV).ok().as_deref(),
            std::env::var(INTER_THREADS_ENV).ok().as_deref(),
        )
    }

    fn resolve(intra: Option<&str>, inter: Option<&str>) -> Self {
        let intra = parse_positive(intra).unwrap_or_else(default_thread_count);
        let inter = parse_positive(inter).unwrap_or(1);
        Self { intra, inter }
    }
}

fn parse_positive(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse::<usize>().ok().filter(|v| *v > 0)
}

fn default_thread_count() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_MAX_THREADS);
    available.min(DEFAULT_MAX_THREADS).max(1)
}

fn set_env_if_missing(key: &str, value: &str) {
    if std::env::var_os(key).is_none() {
        std::env::set_var(key, value);
    }
}

pub fn apply_session_threads(builder: SessionBuilder) -> Result<SessionBuilder, Error> {
    let ThreadSettings { intra, inter } = ThreadSettings::from_env();

    set_env_if_missing("OMP_NUM_THREADS", &intra.to_string());
    set_env_if_missing("ORT_NUM_THREADS", &intra.to_string());

    log::debug!("[OCR] session threads: intra={}, inter={}", intra, inter);

    let builder = builder.with_intra_threads(intra)?;
    let builder = builder.with_inter_threads(inter)?;
    builder.with_parallel_execution(false)
}
