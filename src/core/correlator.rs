//! Call contract for stereo correlators.
//!
//! Correlators are opaque collaborators: they read two rectified images from
//! disk and write a disparity map and a validity mask, within a time budget.
//! Those that run on the GPU declare how much memory a call needs so the call
//! can be admitted through the session's [`AdmissionController`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{AdmissionController, AppResult};

/// Inputs and outputs of one disparity computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisparityRequest {
    /// Left rectified image.
    pub left: PathBuf,
    /// Right rectified image.
    pub right: PathBuf,
    /// Output disparity map.
    pub disparity: PathBuf,
    /// Output validity mask.
    pub mask: PathBuf,
    /// Lower bound of the disparity search range.
    pub disp_min: Option<f64>,
    /// Upper bound of the disparity search range.
    pub disp_max: Option<f64>,
    /// Time budget of the call.
    pub timeout: Duration,
}

/// A stereo matching backend.
pub trait Correlator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Scarce-resource cost of `request`, in the admission controller's units.
    fn estimated_memory_mb(&self, _request: &DisparityRequest) -> f64 {
        0.0
    }

    /// Produce the disparity map and mask named by `request`.
    ///
    /// # Errors
    ///
    /// Any failure of the backend, including exceeding the time budget.
    fn compute(&self, request: &DisparityRequest) -> AppResult<()>;
}

/// Correlators the pipeline knows how to select from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelatorKind {
    /// Hirschmüller 2008 semi-global matching.
    Hirschmuller08,
    /// Hirschmüller 2008 on Laplacian-filtered images.
    Hirschmuller08Laplacian,
    /// OpenCV semi-global block matching.
    Sgbm,
    /// Multi-scale multi-window matching.
    Msmw,
    /// TV-L1 optical flow.
    Tvl1,
    /// More global matching.
    Mgm,
    /// Multi-scale more global matching.
    MgmMulti,
    /// GPU semi-global matching.
    StereosgmGpu,
    /// Neural correlator with a monocular prior.
    Stereoanywhere,
}

impl CorrelatorKind {
    /// Every known correlator.
    pub const ALL: [Self; 9] = [
        Self::Hirschmuller08,
        Self::Hirschmuller08Laplacian,
        Self::Sgbm,
        Self::Msmw,
        Self::Tvl1,
        Self::Mgm,
        Self::MgmMulti,
        Self::StereosgmGpu,
        Self::Stereoanywhere,
    ];

    /// Configuration name of the correlator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hirschmuller08 => "hirschmuller08",
            Self::Hirschmuller08Laplacian => "hirschmuller08_laplacian",
            Self::Sgbm => "sgbm",
            Self::Msmw => "msmw",
            Self::Tvl1 => "tvl1",
            Self::Mgm => "mgm",
            Self::MgmMulti => "mgm_multi",
            Self::StereosgmGpu => "stereosgm_gpu",
            Self::Stereoanywhere => "stereoanywhere",
        }
    }

    /// Whether calls to this correlator need GPU memory.
    #[must_use]
    pub const fn uses_gpu(self) -> bool {
        matches!(self, Self::StereosgmGpu | Self::Stereoanywhere)
    }
}

impl fmt::Display for CorrelatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown matching algorithm `{s}`"))
    }
}

/// Runs a correlator inside an admission grant sized by its own estimate.
#[derive(Debug, Clone)]
pub struct Admitted<C> {
    inner: C,
}

impl<C: Correlator> Admitted<C> {
    /// Wrap `inner`.
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Compute `request` once `admission` grants the estimated memory.
    ///
    /// # Errors
    ///
    /// Admission failures (for example a request larger than the whole
    /// budget) or any error of the wrapped correlator.
    pub fn compute(&self, request: &DisparityRequest, admission: &AdmissionController) -> AppResult<()> {
        let amount = self.inner.estimated_memory_mb(request);
        debug!(correlator = self.inner.name(), amount, "requesting admission");
        admission.run(amount, || self.inner.compute(request))
    }

    /// The wrapped correlator.
    pub const fn inner(&self) -> &C {
        &self.inner
    }
}
