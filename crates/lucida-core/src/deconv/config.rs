use serde::{Deserialize, Serialize};

use crate::compute::ZeroGuard;
use crate::consts::DEFAULT_ITERATIONS;
use crate::volume::Volume;

/// Parameters of one deconvolution run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionConfig {
    /// Number of Richardson-Lucy iterations, at least 1.
    pub iterations: usize,
    /// Policy for the observed / reblurred division. Disabled by default:
    /// zero denominators produce IEEE-754 infinities and NaNs that
    /// propagate into the estimate.
    pub zero_guard: ZeroGuard,
    /// Fail the run when more than this fraction of samples hit the zero
    /// guard within one iteration. `None` never fails. Has no effect while
    /// the guard is disabled.
    pub degeneracy_threshold: Option<f64>,
}

impl Default for DeconvolutionConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            zero_guard: ZeroGuard::default(),
            degeneracy_threshold: None,
        }
    }
}

/// How the initial estimate is seeded. The engine itself always takes an
/// explicit estimate volume; this builds one from the observed data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstGuess {
    /// Start from the observed volume itself.
    #[default]
    Observed,
    /// Start from a constant volume holding the observed mean, which
    /// preserves total intensity under the multiplicative update.
    Uniform,
}

impl FirstGuess {
    pub fn build(&self, observed: &Volume) -> Volume {
        match self {
            Self::Observed => observed.clone(),
            Self::Uniform => Volume::from_elem(observed.dims(), observed.mean()),
        }
    }
}
