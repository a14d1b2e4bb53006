use std::time::Duration;

/// Stage configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOptions {
    /// Bytes of GPU memory the stage tries to stay under.
    pub gpu_memory_budget: u64,
    /// Aggressive eviction kicks in when a gentle pass leaves usage above
    /// `gpu_memory_budget - gc_headroom`.
    pub gc_headroom: u64,
    /// Reports this step every frame instead of measuring wall time.
    pub fixed_timestep: Option<Duration>,
    pub min_dt: Duration,
    pub max_dt: Duration,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            gpu_memory_budget: 128_000_000,
            gc_headroom: 2_000_000,
            fixed_timestep: None,
            min_dt: Duration::from_micros(100),
            max_dt: Duration::from_millis(250),
        }
    }
}

impl StageOptions {
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.gpu_memory_budget = bytes;
        self
    }

    pub fn with_fixed_timestep(mut self, step: Duration) -> Self {
        self.fixed_timestep = Some(step);
        self
    }

    /// Defaults overridden by `STRATA_GPU_MEMORY` (bytes) and
    /// `STRATA_FIXED_TIMESTEP_MS`. Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(raw) = lookup("STRATA_GPU_MEMORY") {
            match raw.trim().parse::<u64>() {
                Ok(bytes) => options.gpu_memory_budget = bytes,
                Err(err) => log::warn!("ignoring STRATA_GPU_MEMORY={raw:?}: {err}"),
            }
        }

        if let Some(raw) = lookup("STRATA_FIXED_TIMESTEP_MS") {
            match raw.trim().parse::<f64>() {
                Ok(ms) if ms > 0.0 && ms.is_finite() => {
                    options.fixed_timestep = Some(Duration::from_micros((ms * 1000.0).round() as u64));
                }
                Ok(ms) => log::warn!("ignoring STRATA_FIXED_TIMESTEP_MS={ms}: must be positive"),
                Err(err) => log::warn!("ignoring STRATA_FIXED_TIMESTEP_MS={raw:?}: {err}"),
            }
        }

        options
    }

    /// Usage above which a gentle pass escalates to an aggressive one.
    pub fn aggressive_threshold(&self) -> u64 {
        self.gpu_memory_budget.saturating_sub(self.gc_headroom)
    }
}
