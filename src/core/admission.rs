//! Admission control for a scarce, non-divisible resource (GPU memory).
//!
//! The controller tracks a *declared* budget as an integer count of fixed-size
//! quanta. A request is inflated by an overhead fraction, rounded up to whole
//! quanta and granted all-or-nothing:
//!
//! - a request that can never fit fails fast with
//!   [`AdmissionError::Unsatisfiable`] and leaves the budget untouched;
//! - otherwise the caller waits until enough quanta are free, then takes them
//!   in a single check-and-subtract under the budget lock;
//! - the returned [`Grant`] gives the quanta back when dropped, including
//!   while unwinding from a panic.
//!
//! Waiters are not served in FIFO order. Any waiter that finds enough free
//! quanta wins, so a large request can be starved by a stream of small ones.
//!
//! ```rust
//! use tile_scheduler::core::AdmissionController;
//!
//! let gpu = AdmissionController::bounded(500.0, 100.0).unwrap();
//! {
//!     let grant = gpu.request(96.0).unwrap();
//!     assert_eq!(grant.quanta(), 2);
//!     assert_eq!(gpu.remaining(), Some(3));
//! }
//! assert_eq!(gpu.remaining(), Some(5));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::core::AdmissionError;

/// Default size of one quantum, in resource units (megabytes).
pub const DEFAULT_QUANTUM_SIZE: f64 = 100.0;

/// Default fraction added to every request to absorb estimation error.
pub const DEFAULT_OVERHEAD_FRACTION: f64 = 0.05;

/// Default upper bound on a single wait before re-checking the budget.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables of a bounded budget.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSettings {
    /// Size of one quantum in resource units.
    pub quantum_size: f64,
    /// Fraction added to each request before rounding to quanta.
    pub overhead_fraction: f64,
    /// Longest a waiter sleeps before re-checking free quanta.
    pub poll_interval: Duration,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            quantum_size: DEFAULT_QUANTUM_SIZE,
            overhead_fraction: DEFAULT_OVERHEAD_FRACTION,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl BudgetSettings {
    /// Create settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quantum size.
    #[must_use]
    pub const fn with_quantum_size(mut self, quantum_size: f64) -> Self {
        self.quantum_size = quantum_size;
        self
    }

    /// Set the overhead fraction.
    #[must_use]
    pub const fn with_overhead_fraction(mut self, overhead_fraction: f64) -> Self {
        self.overhead_fraction = overhead_fraction;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn validate(&self) -> Result<(), AdmissionError> {
        if !self.quantum_size.is_finite() || self.quantum_size <= 0.0 {
            return Err(AdmissionError::InvalidAmount(self.quantum_size));
        }
        if !self.overhead_fraction.is_finite() || self.overhead_fraction < 0.0 {
            return Err(AdmissionError::InvalidAmount(self.overhead_fraction));
        }
        Ok(())
    }
}

/// Shared quanta counter guarded by a mutex, with a condvar signalled on release.
struct ResourceBudget {
    total: u32,
    settings: BudgetSettings,
    remaining: Mutex<u32>,
    released: Condvar,
}

impl ResourceBudget {
    /// Single check-and-subtract attempt. The read and the write happen under
    /// the same lock acquisition.
    fn try_take(&self, quanta: u32) -> bool {
        let mut remaining = self.remaining.lock();
        if *remaining >= quanta {
            *remaining -= quanta;
            true
        } else {
            false
        }
    }

    fn take_blocking(&self, quanta: u32) {
        let mut remaining = self.remaining.lock();
        while *remaining < quanta {
            debug!(
                quanta,
                remaining = *remaining,
                total = self.total,
                "waiting for quanta"
            );
            // Release notifications wake us early; the timeout is the poll fallback.
            let _ = self
                .released
                .wait_for(&mut remaining, self.settings.poll_interval);
        }
        *remaining -= quanta;
    }

    fn give_back(&self, quanta: u32) {
        let mut remaining = self.remaining.lock();
        *remaining += quanta;
        debug_assert!(*remaining <= self.total, "released more quanta than granted");
        drop(remaining);
        self.released.notify_all();
    }
}

#[derive(Clone)]
enum Budget {
    Bounded(Arc<ResourceBudget>),
    Unbounded,
}

/// Gate in front of a scarce resource, shared by every worker of a session.
///
/// Cloning is cheap and every clone accounts against the same budget.
#[derive(Clone)]
pub struct AdmissionController {
    budget: Budget,
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.budget {
            Budget::Bounded(budget) => f
                .debug_struct("AdmissionController")
                .field("total", &budget.total)
                .field("remaining", &*budget.remaining.lock())
                .field("quantum_size", &budget.settings.quantum_size)
                .finish(),
            Budget::Unbounded => f.write_str("AdmissionController(unbounded)"),
        }
    }
}

impl AdmissionController {
    /// Bounded controller with `floor(total_capacity / quantum_size)` quanta
    /// and default overhead and poll interval.
    ///
    /// # Errors
    ///
    /// `AdmissionError::InvalidAmount` if either value is negative or not finite,
    /// or if `quantum_size` is zero.
    pub fn bounded(total_capacity: f64, quantum_size: f64) -> Result<Self, AdmissionError> {
        Self::bounded_with(
            total_capacity,
            BudgetSettings::default().with_quantum_size(quantum_size),
        )
    }

    /// Bounded controller with explicit settings.
    ///
    /// # Errors
    ///
    /// `AdmissionError::InvalidAmount` for out-of-range capacity or settings.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bounded_with(
        total_capacity: f64,
        settings: BudgetSettings,
    ) -> Result<Self, AdmissionError> {
        settings.validate()?;
        if !total_capacity.is_finite() || total_capacity < 0.0 {
            return Err(AdmissionError::InvalidAmount(total_capacity));
        }
        let total = (total_capacity / settings.quantum_size)
            .floor()
            .min(f64::from(u32::MAX)) as u32;
        info!(
            total_quanta = total,
            quantum_size = settings.quantum_size,
            "bounded admission controller created"
        );
        Ok(Self {
            budget: Budget::Bounded(Arc::new(ResourceBudget {
                total,
                settings,
                remaining: Mutex::new(total),
                released: Condvar::new(),
            })),
        })
    }

    /// Controller that grants everything immediately and keeps no accounts.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            budget: Budget::Unbounded,
        }
    }

    /// Whether this controller enforces a budget.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        matches!(self.budget, Budget::Bounded(_))
    }

    /// Total quanta of the budget, `None` when unbounded.
    #[must_use]
    pub fn total_quanta(&self) -> Option<u32> {
        match &self.budget {
            Budget::Bounded(budget) => Some(budget.total),
            Budget::Unbounded => None,
        }
    }

    /// Quanta currently free, `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        match &self.budget {
            Budget::Bounded(budget) => Some(*budget.remaining.lock()),
            Budget::Unbounded => None,
        }
    }

    /// Quanta a request for `amount` needs: `ceil(amount * (1 + overhead) / quantum)`.
    ///
    /// Always `0` for an unbounded controller, whatever the amount.
    ///
    /// # Errors
    ///
    /// `AdmissionError::InvalidAmount` for negative or non-finite amounts on a
    /// bounded controller.
    pub fn required_quanta(&self, amount: f64) -> Result<u64, AdmissionError> {
        let Budget::Bounded(budget) = &self.budget else {
            return Ok(0);
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(AdmissionError::InvalidAmount(amount));
        }
        Ok(quanta_for(amount, &budget.settings))
    }

    /// Validate a request and return the budget plus the quanta to take.
    fn admit(&self, amount: f64) -> Result<Option<(&Arc<ResourceBudget>, u32)>, AdmissionError> {
        let Budget::Bounded(budget) = &self.budget else {
            return Ok(None);
        };
        let quanta = self.required_quanta(amount)?;
        match u32::try_from(quanta) {
            Ok(quanta) if quanta <= budget.total => Ok(Some((budget, quanta))),
            _ => Err(AdmissionError::Unsatisfiable {
                requested: quanta,
                capacity: budget.total,
                quantum_size: budget.settings.quantum_size,
            }),
        }
    }

    /// Block until `amount` can be granted, then hold it until the grant drops.
    ///
    /// # Errors
    ///
    /// - `AdmissionError::Unsatisfiable` immediately, without blocking, when the
    ///   request exceeds the total budget.
    /// - `AdmissionError::InvalidAmount` for negative or non-finite amounts.
    ///
    /// An unbounded controller grants every request, whatever the amount.
    pub fn request(&self, amount: f64) -> Result<Grant, AdmissionError> {
        let Some((budget, quanta)) = self.admit(amount)? else {
            return Ok(Grant::noop());
        };
        budget.take_blocking(quanta);
        Ok(Grant::held(budget, quanta))
    }

    /// Single non-blocking attempt; `Ok(None)` when not enough quanta are free.
    ///
    /// # Errors
    ///
    /// Same as [`AdmissionController::request`].
    pub fn try_request(&self, amount: f64) -> Result<Option<Grant>, AdmissionError> {
        let Some((budget, quanta)) = self.admit(amount)? else {
            return Ok(Some(Grant::noop()));
        };
        if budget.try_take(quanta) {
            Ok(Some(Grant::held(budget, quanta)))
        } else {
            Ok(None)
        }
    }

    /// Run `f` while holding a grant for `amount`.
    ///
    /// The grant is released whether `f` returns `Ok`, `Err` or panics.
    ///
    /// # Errors
    ///
    /// Admission failures converted into `E`, or whatever `f` returns.
    pub fn run<T, E, F>(&self, amount: f64, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<AdmissionError>,
    {
        let _grant = self.request(amount)?;
        f()
    }

    /// Async variant of [`AdmissionController::request`] that sleeps on the
    /// runtime timer between attempts instead of blocking the thread.
    ///
    /// # Errors
    ///
    /// Same as [`AdmissionController::request`].
    #[cfg(feature = "tokio-runtime")]
    pub async fn request_async(&self, amount: f64) -> Result<Grant, AdmissionError> {
        let Some((budget, quanta)) = self.admit(amount)? else {
            return Ok(Grant::noop());
        };
        while !budget.try_take(quanta) {
            debug!(quanta, total = budget.total, "waiting for quanta");
            tokio::time::sleep(budget.settings.poll_interval).await;
        }
        Ok(Grant::held(budget, quanta))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quanta_for(amount: f64, settings: &BudgetSettings) -> u64 {
    let inflated = amount + amount * settings.overhead_fraction;
    (inflated / settings.quantum_size).ceil() as u64
}

/// Quanta held by one protected section. Dropping it returns them to the budget.
#[must_use = "quanta are released as soon as the grant is dropped"]
pub struct Grant {
    budget: Option<Arc<ResourceBudget>>,
    quanta: u32,
}

impl Grant {
    const fn noop() -> Self {
        Self {
            budget: None,
            quanta: 0,
        }
    }

    fn held(budget: &Arc<ResourceBudget>, quanta: u32) -> Self {
        info!(quanta, total = budget.total, "quanta granted");
        Self {
            budget: Some(Arc::clone(budget)),
            quanta,
        }
    }

    /// Number of quanta held.
    #[must_use]
    pub const fn quanta(&self) -> u32 {
        self.quanta
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant").field("quanta", &self.quanta).finish()
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        if let Some(budget) = self.budget.take() {
            info!(quanta = self.quanta, "releasing quanta");
            budget.give_back(self.quanta);
        }
    }
}
