use crate::api::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_PACKED_GEMM_PAR_THRESHOLD: usize = 4096;

static PACKED_GEMM_PAR_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PACKED_GEMM_PAR_THRESHOLD);

/// Output element count (`m * n`) at which the packed GEMM kernels switch
/// from a sequential loop to rayon.
pub fn packed_gemm_par_threshold() -> usize {
    PACKED_GEMM_PAR_THRESHOLD.load(Ordering::Relaxed)
}

/// Widest SIMD instruction set the kernels dispatch to on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    Avx2,
    Sse2,
    Neon,
    Scalar,
}

impl SimdLevel {
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                return SimdLevel::Avx2;
            }
            // Baseline for every x86_64 target.
            return SimdLevel::Sse2;
        }
        #[cfg(target_arch = "aarch64")]
        {
            return SimdLevel::Neon;
        }
        #[allow(unreachable_code)]
        SimdLevel::Scalar
    }
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Sse2 => "SSE2",
            SimdLevel::Neon => "NEON",
            SimdLevel::Scalar => "scalar",
        };
        write!(f, "{}", name)
    }
}

/// Process-wide settings for the compute crates.
///
/// Nothing changes until [`apply`](Self::apply) is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Size of the rayon global pool; 0 keeps rayon's default (one per core).
    pub num_threads: usize,
    /// See [`packed_gemm_par_threshold`].
    pub packed_gemm_par_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            packed_gemm_par_threshold: DEFAULT_PACKED_GEMM_PAR_THRESHOLD,
        }
    }
}

impl RuntimeConfig {
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_par_threshold(mut self, threshold: usize) -> Self {
        self.packed_gemm_par_threshold = threshold;
        self
    }

    /// Install this configuration.
    ///
    /// The rayon global pool can be sized once per process, so a fixed
    /// `num_threads` after the pool exists yields
    /// `CoreError::InvalidOperation`. The threshold is always updated.
    pub fn apply(&self) -> CoreResult<()> {
        PACKED_GEMM_PAR_THRESHOLD.store(self.packed_gemm_par_threshold, Ordering::Relaxed);

        if self.num_threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build_global()
                .map_err(|e| CoreError::InvalidOperation(format!(
                    "cannot size rayon pool to {} threads: {}", self.num_threads, e
                )))?;
        }

        log::info!(
            "[runtime] simd={} threads={} gemm_par_threshold={}",
            Self::detect_simd(),
            rayon::current_num_threads(),
            self.packed_gemm_par_threshold
        );
        Ok(())
    }

    pub fn detect_simd() -> SimdLevel {
        SimdLevel::detect()
    }
}

/// Preset configurations for comparing the sequential and parallel paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptProfile {
    /// Default threshold.
    Optimized,
    /// Never parallel.
    Baseline,
    /// Parallel from 1024 output elements.
    Aggressive,
}

impl OptProfile {
    pub fn runtime_config(&self) -> RuntimeConfig {
        let threshold = match self {
            OptProfile::Optimized => DEFAULT_PACKED_GEMM_PAR_THRESHOLD,
            OptProfile::Baseline => usize::MAX,
            OptProfile::Aggressive => 1024,
        };
        RuntimeConfig::default().with_par_threshold(threshold)
    }
}

impl From<OptProfile> for RuntimeConfig {
    fn from(profile: OptProfile) -> Self {
        profile.runtime_config()
    }
}
