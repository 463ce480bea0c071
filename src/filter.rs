// src/filter.rs
use nalgebra::{Const, DimMin, SMatrix, SVector};
use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::error::{ConfigError, FilterError};
use crate::skeleton::{DepthCovariance, DepthVector, JOINT_COUNT};
use crate::transition::{ConstrainedTransition, MeasurementFrame, TransitionModel};

const JACOBIAN_STEP: f64 = 1e-6;

/// Forward-difference Jacobian of `f` at `x`.
///
/// Column `j` is `(f(x + h e_j) - f(x)) / h` with `h` scaled to the magnitude
/// of `x[j]`.
pub fn numerical_jacobian<const N: usize, const M: usize, F>(f: F, x: &SVector<f64, N>) -> SMatrix<f64, M, N>
where
    F: Fn(&SVector<f64, N>) -> SVector<f64, M>,
{
    let fx = f(x);
    let mut jacobian = SMatrix::<f64, M, N>::zeros();
    for j in 0..N {
        let h = JACOBIAN_STEP * x[j].abs().max(1.0);
        let mut perturbed = *x;
        perturbed[j] += h;
        let column = (f(&perturbed) - fx) / h;
        jacobian.set_column(j, &column);
    }
    jacobian
}

/// Extended Kalman filter with an identity observation model.
///
/// The transition is supplied per call, so any motion or constraint model
/// can drive the same recursion.
#[derive(Debug, Clone)]
pub struct ExtendedKalmanFilter<const N: usize> {
    state: SVector<f64, N>,
    covariance: SMatrix<f64, N, N>,
    process_noise: SMatrix<f64, N, N>,
    measurement_noise: SMatrix<f64, N, N>,
}

impl<const N: usize> ExtendedKalmanFilter<N> {
    /// Zero state, identity `P` and `Q`, `R = 0.1 I`.
    pub fn new() -> Self {
        Self::with_noise(
            SVector::zeros(),
            SMatrix::identity(),
            SMatrix::identity(),
            SMatrix::identity() * 0.1,
        )
    }

    pub fn with_noise(
        state: SVector<f64, N>,
        covariance: SMatrix<f64, N, N>,
        process_noise: SMatrix<f64, N, N>,
        measurement_noise: SMatrix<f64, N, N>,
    ) -> Self {
        Self { state, covariance, process_noise, measurement_noise }
    }

    pub fn state(&self) -> &SVector<f64, N> {
        &self.state
    }

    pub fn covariance(&self) -> &SMatrix<f64, N, N> {
        &self.covariance
    }

    /// `x <- f(x)`, `P <- F P F^T + Q` with `F` linearized at the prior `x`.
    pub fn predict<F>(&mut self, f: F)
    where
        F: Fn(&SVector<f64, N>) -> SVector<f64, N>,
    {
        let jacobian = numerical_jacobian(&f, &self.state);
        self.state = f(&self.state);
        self.covariance = jacobian * self.covariance * jacobian.transpose() + self.process_noise;
    }

    /// Corrects against `z` with `H = I`.
    ///
    /// If `P + R` is singular nothing is changed and the predicted state
    /// stands.
    pub fn update(&mut self, z: &SVector<f64, N>) -> Result<(), FilterError>
    where
        Const<N>: DimMin<Const<N>, Output = Const<N>>,
    {
        let innovation = z - self.state;
        let innovation_cov = self.covariance + self.measurement_noise;
        let inverse = innovation_cov
            .try_inverse()
            .ok_or(FilterError::SingularInnovation)?;
        let gain = self.covariance * inverse;

        self.state += gain * innovation;
        self.covariance = (SMatrix::<f64, N, N>::identity() - gain) * self.covariance;
        Ok(())
    }
}

impl<const N: usize> Default for ExtendedKalmanFilter<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The skeleton depth estimator: one EKF over the 13 joint depths, advanced
/// by a transition model that reads the current measurement frame.
#[derive(Debug, Clone)]
pub struct DepthFilter<M = ConstrainedTransition> {
    ekf: ExtendedKalmanFilter<JOINT_COUNT>,
    model: M,
}

impl DepthFilter<ConstrainedTransition> {
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let model = ConstrainedTransition::new(config.topology()?, config.smoothing);
        let ekf = ExtendedKalmanFilter::with_noise(
            DepthVector::zeros(),
            config.initial_state_covariance(),
            config.process_covariance(),
            config.measurement_covariance(),
        );
        Ok(Self { ekf, model })
    }
}

impl<M> DepthFilter<M>
where
    M: TransitionModel<JOINT_COUNT, Context = MeasurementFrame>,
{
    pub fn with_model(model: M, ekf: ExtendedKalmanFilter<JOINT_COUNT>) -> Self {
        Self { ekf, model }
    }

    /// Filtered depth per joint.
    pub fn depths(&self) -> &DepthVector {
        self.ekf.state()
    }

    pub fn covariance(&self) -> &DepthCovariance {
        self.ekf.covariance()
    }

    /// Advances the state through the transition model for this frame.
    ///
    /// A frame with non-finite values is rejected and the state is left as
    /// it was.
    pub fn predict(&mut self, frame: &MeasurementFrame, dt: f64) -> Result<(), FilterError> {
        frame.validate()?;
        let model = &self.model;
        self.ekf.predict(|x| model.transition(x, frame, dt));
        debug!(trace = self.ekf.covariance().trace(), "depth filter predicted");
        Ok(())
    }

    pub fn update(&mut self, z: &DepthVector) -> Result<(), FilterError> {
        match self.ekf.update(z) {
            Ok(()) => {
                debug!(trace = self.ekf.covariance().trace(), "depth filter updated");
                Ok(())
            }
            Err(err) => {
                warn!(%err, "keeping predicted depths");
                Err(err)
            }
        }
    }
}
