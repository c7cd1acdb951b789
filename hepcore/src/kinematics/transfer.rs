extern crate statrs;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

/// Flavour hypothesis a transfer function is parameterized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TfFlavour {
    B,
    Light,
}

/// Pseudorapidity bin used by the response parameterizations, the barrel
/// region and everything beyond.
#[inline]
pub fn tf_eta_bin(eta: f64) -> usize {
    if eta.abs() > 1.0 {
        1
    } else {
        0
    }
}

/// Calorimeter-style resolution parameters for one flavour and eta bin.
///
/// The width of the energy response follows
/// `sigma(e) = sqrt(noise^2 + stochastic^2 * e + constant^2 * e^2)`,
/// the mean response is `scale * e` with an additive `offset`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ResponseParams {
    pub scale: f64,
    pub offset: f64,
    pub noise: f64,
    pub stochastic: f64,
    pub constant: f64,
}

impl ResponseParams {
    pub fn new(scale: f64, offset: f64, noise: f64, stochastic: f64, constant: f64) -> Self {
        ResponseParams { scale, offset, noise, stochastic, constant }
    }

    #[inline]
    pub fn mean(&self, energy: f64) -> f64 {
        self.scale * energy + self.offset
    }

    #[inline]
    pub fn width(&self, energy: f64) -> f64 {
        let e = energy.max(0.0);
        (self.noise * self.noise + self.stochastic * self.stochastic * e + self.constant * self.constant * e * e)
            .sqrt()
            .max(1e-6)
    }
}

/// A single-flavour, single-eta-bin energy transfer function.
///
/// Evaluates the probability density of observing a reconstructed energy
/// given a quark-level energy. Subjet variants carry their own, wider,
/// parameters because groomed subjets lose part of the shower.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TransferFunction {
    pub flavour: TfFlavour,
    pub eta_bin: usize,
    pub params: ResponseParams,
}

impl TransferFunction {
    pub fn new(flavour: TfFlavour, eta_bin: usize, params: ResponseParams) -> Self {
        TransferFunction { flavour, eta_bin, params }
    }

    /// Density of `e_reco` given quark energy `e_gen`.
    ///
    /// # Examples
    ///
    /// ```
    /// use hepcore::kinematics::transfer::{ResponseParams, TfFlavour, TransferFunction};
    ///
    /// let tf = TransferFunction::new(TfFlavour::B, 0, ResponseParams::new(1.0, 0.0, 5.0, 1.0, 0.05));
    /// let at_peak = tf.density(100.0, 100.0);
    /// let off_peak = tf.density(100.0, 140.0);
    /// assert!(at_peak > off_peak);
    /// ```
    pub fn density(&self, e_gen: f64, e_reco: f64) -> f64 {
        let normal = Normal::new(self.params.mean(e_gen), self.params.width(e_gen)).unwrap();
        normal.pdf(e_reco)
    }
}

/// The full table of transfer functions: two flavours, two eta bins, full
/// jets and subjets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferFunctionSet {
    pub b: [ResponseParams; 2],
    pub light: [ResponseParams; 2],
    pub b_subjet: [ResponseParams; 2],
    pub light_subjet: [ResponseParams; 2],
}

impl Default for TransferFunctionSet {
    fn default() -> Self {
        Self {
            b: [
                ResponseParams::new(0.98, 2.0, 4.8, 1.1, 0.04),
                ResponseParams::new(0.96, 3.0, 5.6, 1.3, 0.05),
            ],
            light: [
                ResponseParams::new(1.00, 0.5, 4.2, 0.9, 0.03),
                ResponseParams::new(0.99, 1.0, 5.0, 1.1, 0.04),
            ],
            b_subjet: [
                ResponseParams::new(0.94, 2.5, 6.2, 1.4, 0.06),
                ResponseParams::new(0.92, 3.5, 7.0, 1.6, 0.07),
            ],
            light_subjet: [
                ResponseParams::new(0.97, 1.0, 5.4, 1.2, 0.05),
                ResponseParams::new(0.95, 1.5, 6.2, 1.4, 0.06),
            ],
        }
    }
}

impl TransferFunctionSet {
    /// Transfer function for a full jet at the given pseudorapidity.
    pub fn for_jet(&self, flavour: TfFlavour, eta: f64) -> TransferFunction {
        let bin = tf_eta_bin(eta);
        let params = match flavour {
            TfFlavour::B => self.b[bin],
            TfFlavour::Light => self.light[bin],
        };
        TransferFunction::new(flavour, bin, params)
    }

    /// Transfer function for a groomed subjet at the given pseudorapidity.
    pub fn for_subjet(&self, flavour: TfFlavour, eta: f64) -> TransferFunction {
        let bin = tf_eta_bin(eta);
        let params = match flavour {
            TfFlavour::B => self.b_subjet[bin],
            TfFlavour::Light => self.light_subjet[bin],
        };
        TransferFunction::new(flavour, bin, params)
    }
}
