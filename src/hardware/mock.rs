//! Mock Hardware Implementations
//!
//! Simulated instruments used by the tests and by dummy mode when the real
//! instruments cannot be reached at startup.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockStage` - Goniometer stage that records every commanded target
//! - `MockPowerMeter` - Power meter with an optional surface plasmon resonance
//!   response coupled to a `MockStage`
//!
//! Both mocks can be told to fail after a number of successful operations, which
//! is how the abort-on-communication-failure path is tested.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use crate::hardware::capabilities::{
    FilterMode, InstantPower, Movable, PowerReadout, PowerSample, WavelengthTunable,
};

// =============================================================================
// MockStage - Simulated Goniometer
// =============================================================================

/// Mock goniometer stage
///
/// Moves complete after an optional fixed delay. Every target passed to
/// `move_abs` is recorded so tests can check the angle mapping.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::new();
/// stage.home().await?;
/// stage.move_abs(60.0).await?;
/// assert_eq!(stage.moves().await, vec![60.0]);
/// ```
pub struct MockStage {
    position: RwLock<f64>,
    home_position: f64,
    homed: AtomicBool,
    velocity: RwLock<Option<(f64, f64)>>,
    moves: RwLock<Vec<f64>>,
    move_delay: Duration,
    fail_after_moves: Option<usize>,
}

impl MockStage {
    /// Create new mock stage at position 0.0, homing back to 0.0
    pub fn new() -> Self {
        Self {
            position: RwLock::new(0.0),
            home_position: 0.0,
            homed: AtomicBool::new(false),
            velocity: RwLock::new(None),
            moves: RwLock::new(Vec::new()),
            move_delay: Duration::ZERO,
            fail_after_moves: None,
        }
    }

    /// Add a fixed delay to every move
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// Let the first `count` moves succeed and fail every later one
    pub fn fail_moves_after(mut self, count: usize) -> Self {
        self.fail_after_moves = Some(count);
        self
    }

    /// Targets of all successful moves, in order
    pub async fn moves(&self) -> Vec<f64> {
        self.moves.read().await.clone()
    }

    /// Whether `home` has been called
    pub fn is_homed(&self) -> bool {
        self.homed.load(Ordering::SeqCst)
    }

    /// Last velocity/acceleration pair applied
    pub async fn velocity(&self) -> Option<(f64, f64)> {
        *self.velocity.read().await
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Movable for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        let done = self.moves.read().await.len();
        if let Some(limit) = self.fail_after_moves {
            if done >= limit {
                bail!("MockStage: simulated communication loss after {} moves", limit);
            }
        }

        if !self.move_delay.is_zero() {
            sleep(self.move_delay).await;
        }

        *self.position.write().await = target;
        self.moves.write().await.push(target);
        tracing::trace!(target, "MockStage: move complete");
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        *self.position.write().await = self.home_position;
        self.homed.store(true, Ordering::SeqCst);
        tracing::debug!("MockStage: homed");
        Ok(())
    }

    async fn set_velocity(&self, velocity: f64, acceleration: f64) -> Result<()> {
        if velocity <= 0.0 || acceleration <= 0.0 {
            bail!("MockStage: velocity and acceleration must be positive");
        }
        *self.velocity.write().await = Some((velocity, acceleration));
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.read().await)
    }
}

// =============================================================================
// MockPowerMeter - Simulated Power Meter
// =============================================================================

/// Angular reflectivity dip of a metal film in Kretschmann geometry
///
/// Lorentzian approximation: `R(θ) = 1 - depth / (1 + ((θ - θr) / γ)²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonanceModel {
    /// Resonance angle θr (deg)
    pub resonance_deg: f64,
    /// Half width at half minimum γ (deg)
    pub half_width_deg: f64,
    /// Fractional depth of the dip (0..1)
    pub depth: f64,
}

impl Default for ResonanceModel {
    fn default() -> Self {
        Self {
            resonance_deg: 44.0,
            half_width_deg: 1.5,
            depth: 0.85,
        }
    }
}

impl ResonanceModel {
    /// Relative reflected power at `angle_deg`
    pub fn reflectivity(&self, angle_deg: f64) -> f64 {
        let x = (angle_deg - self.resonance_deg) / self.half_width_deg;
        1.0 - self.depth / (1.0 + x * x)
    }
}

struct Coupling {
    stage: Arc<MockStage>,
    angle_offset_deg: f64,
    model: ResonanceModel,
}

/// Number of simulated samples behind one averaged reading
const SAMPLES_PER_AVERAGE: usize = 16;

/// Mock power meter
///
/// Readings are `base_power` times the resonance response (when coupled to a
/// stage) with uniform relative noise. Averaged reads compute mean and standard
/// deviation over simulated samples, like the real statistics buffer.
///
/// # Example
///
/// ```rust,ignore
/// let meter = MockPowerMeter::new(2.5e-3).with_noise(0.0);
/// let sample = meter.read_averaged_power().await?;
/// assert_eq!(sample.mean, 2.5e-3);
/// ```
pub struct MockPowerMeter {
    base_power: f64,
    noise: f64,
    range_nm: (u32, u32),
    wavelength_nm: RwLock<u32>,
    filter: RwLock<FilterMode>,
    coupling: Option<Coupling>,
    rng: Mutex<StdRng>,
    reads: AtomicUsize,
    fail_after_reads: Option<usize>,
}

impl MockPowerMeter {
    /// Create new mock power meter with specified base power (Watts)
    pub fn new(base_power: f64) -> Self {
        Self {
            base_power,
            noise: 0.01,
            range_nm: (400, 1100),
            wavelength_nm: RwLock::new(633),
            filter: RwLock::new(FilterMode::None),
            coupling: None,
            rng: Mutex::new(StdRng::seed_from_u64(0x5e11_da7a)),
            reads: AtomicUsize::new(0),
            fail_after_reads: None,
        }
    }

    /// Relative noise amplitude (0.01 = ±1 %)
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Seed the noise generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Make readings depend on the relative angle of `stage`
    ///
    /// The relative angle is `angle_offset_deg - stage position`.
    pub fn coupled_to(
        mut self,
        stage: Arc<MockStage>,
        angle_offset_deg: f64,
        model: ResonanceModel,
    ) -> Self {
        self.coupling = Some(Coupling {
            stage,
            angle_offset_deg,
            model,
        });
        self
    }

    /// Let the first `count` averaged reads succeed and fail every later one
    pub fn fail_reads_after(mut self, count: usize) -> Self {
        self.fail_after_reads = Some(count);
        self
    }

    /// Number of averaged reads served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Current filter setting
    pub async fn filter(&self) -> FilterMode {
        *self.filter.read().await
    }

    async fn expected_power(&self) -> f64 {
        match &self.coupling {
            Some(coupling) => {
                let position = *coupling.stage.position.read().await;
                let angle = coupling.angle_offset_deg - position;
                self.base_power * coupling.model.reflectivity(angle)
            }
            None => self.base_power,
        }
    }

    async fn noisy_samples(&self, expected: f64, count: usize) -> Vec<f64> {
        if self.noise == 0.0 {
            return vec![expected; count];
        }
        let mut rng = self.rng.lock().await;
        (0..count)
            .map(|_| expected * (1.0 + rng.gen_range(-self.noise..=self.noise)))
            .collect()
    }
}

impl Default for MockPowerMeter {
    fn default() -> Self {
        Self::new(1.0e-3)
    }
}

#[async_trait]
impl WavelengthTunable for MockPowerMeter {
    async fn set_wavelength(&self, nm: u32) -> Result<()> {
        let (min, max) = self.range_nm;
        if !(min..=max).contains(&nm) {
            bail!(
                "Wavelength {} nm outside detector range {}-{} nm; keeping current wavelength",
                nm,
                min,
                max
            );
        }
        *self.wavelength_nm.write().await = nm;
        Ok(())
    }

    async fn wavelength(&self) -> Result<u32> {
        Ok(*self.wavelength_nm.read().await)
    }
}

#[async_trait]
impl PowerReadout for MockPowerMeter {
    async fn set_filtering(&self, mode: FilterMode) -> Result<()> {
        *self.filter.write().await = mode;
        Ok(())
    }

    async fn read_averaged_power(&self) -> Result<PowerSample> {
        let done = self.reads.load(Ordering::SeqCst);
        if let Some(limit) = self.fail_after_reads {
            if done >= limit {
                bail!("MockPowerMeter: simulated read failure after {} reads", limit);
            }
        }

        let expected = self.expected_power().await;
        let samples = self.noisy_samples(expected, SAMPLES_PER_AVERAGE).await;
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(PowerSample {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    async fn read_instant_power(&self) -> Result<InstantPower> {
        let expected = self.expected_power().await;
        let power = self.noisy_samples(expected, 1).await[0];
        Ok(InstantPower {
            wavelength_nm: f64::from(*self.wavelength_nm.read().await),
            power,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
