use std::f64::consts::PI;
use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Wraps an azimuthal angle difference into the interval (-pi, pi].
///
/// # Arguments
///
/// * `phi_1` - First azimuthal angle in radians.
/// * `phi_2` - Second azimuthal angle in radians.
///
/// # Examples
///
/// ```
/// use std::f64::consts::PI;
/// use hepcore::kinematics::four_momentum::delta_phi;
///
/// let d = delta_phi(0.1, 2.0 * PI - 0.1);
/// assert!((d - 0.2).abs() < 1e-12);
/// ```
#[inline]
pub fn delta_phi(phi_1: f64, phi_2: f64) -> f64 {
    let mut d = phi_1 - phi_2;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d <= -PI {
        d += 2.0 * PI;
    }
    d
}

/// Cone distance in the (eta, phi) plane.
///
/// # Arguments
///
/// * `eta_1`, `phi_1` - Coordinates of the first direction.
/// * `eta_2`, `phi_2` - Coordinates of the second direction.
///
/// # Returns
///
/// The distance `sqrt(d_eta^2 + d_phi^2)` with the azimuthal difference
/// wrapped into (-pi, pi]. Symmetric in its arguments.
#[inline]
pub fn delta_r(eta_1: f64, phi_1: f64, eta_2: f64, phi_2: f64) -> f64 {
    let d_eta = eta_1 - eta_2;
    let d_phi = delta_phi(phi_1, phi_2);
    (d_eta * d_eta + d_phi * d_phi).sqrt()
}

/// A four-momentum in collider coordinates (pt, eta, phi, mass).
///
/// # Description
///
/// The canonical representation for reconstructed and generated particles.
/// Cartesian components and the energy are derived on demand, addition of
/// two four-momenta goes through Cartesian space so that the mass of a sum
/// is the invariant mass of the pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FourMomentum {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
}

impl FourMomentum {
    /// Constructs a new `FourMomentum`.
    ///
    /// # Arguments
    ///
    /// * `pt` - Transverse momentum.
    /// * `eta` - Pseudorapidity.
    /// * `phi` - Azimuthal angle in radians.
    /// * `mass` - Rest mass.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hepcore::kinematics::four_momentum::FourMomentum;
    /// let p = FourMomentum::new(50.0, 0.0, 0.0, 0.0);
    /// assert!((p.energy() - 50.0).abs() < 1e-9);
    /// ```
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        FourMomentum { pt, eta, phi, mass }
    }

    /// Constructs a `FourMomentum` from Cartesian components and energy.
    ///
    /// Negative squared masses from rounding are clamped to zero.
    pub fn from_cartesian(px: f64, py: f64, pz: f64, energy: f64) -> Self {
        let pt = (px * px + py * py).sqrt();
        let phi = py.atan2(px);
        let p = (pt * pt + pz * pz).sqrt();
        let eta = if pt > 0.0 {
            (pz / pt).asinh()
        } else if pz > 0.0 {
            f64::INFINITY
        } else if pz < 0.0 {
            f64::NEG_INFINITY
        } else {
            0.0
        };
        let m2 = energy * energy - p * p;
        let mass = m2.max(0.0).sqrt();
        FourMomentum { pt, eta, phi, mass }
    }

    #[inline]
    pub fn px(&self) -> f64 {
        self.pt * self.phi.cos()
    }

    #[inline]
    pub fn py(&self) -> f64 {
        self.pt * self.phi.sin()
    }

    #[inline]
    pub fn pz(&self) -> f64 {
        self.pt * self.eta.sinh()
    }

    /// Magnitude of the three-momentum.
    #[inline]
    pub fn p(&self) -> f64 {
        self.pt * self.eta.cosh()
    }

    #[inline]
    pub fn energy(&self) -> f64 {
        let p = self.p();
        (p * p + self.mass * self.mass).sqrt()
    }

    /// Cone distance to another four-momentum.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hepcore::kinematics::four_momentum::FourMomentum;
    /// let a = FourMomentum::new(30.0, 0.5, 0.0, 0.0);
    /// let b = FourMomentum::new(40.0, 0.5, 0.3, 0.0);
    /// assert!((a.delta_r(&b) - 0.3).abs() < 1e-12);
    /// assert!((a.delta_r(&b) - b.delta_r(&a)).abs() < 1e-12);
    /// ```
    #[inline]
    pub fn delta_r(&self, other: &FourMomentum) -> f64 {
        delta_r(self.eta, self.phi, other.eta, other.phi)
    }
}

impl std::ops::Add for FourMomentum {
    type Output = Self;

    /// Combines two four-momenta, the mass of the result is the invariant
    /// mass of the pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::f64::consts::PI;
    /// use hepcore::kinematics::four_momentum::FourMomentum;
    ///
    /// let a = FourMomentum::new(50.0, 0.0, 0.0, 0.0);
    /// let b = FourMomentum::new(50.0, 0.0, PI, 0.0);
    /// let sum = a + b;
    /// assert!((sum.mass - 100.0).abs() < 1e-6);
    /// ```
    fn add(self, other: Self) -> FourMomentum {
        FourMomentum::from_cartesian(
            self.px() + other.px(),
            self.py() + other.py(),
            self.pz() + other.pz(),
            self.energy() + other.energy(),
        )
    }
}

impl std::iter::Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::new(0.0, 0.0, 0.0, 0.0), |acc, p| acc + p)
    }
}

impl Display for FourMomentum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FourMomentum(pt: {:.3}, eta: {:.3}, phi: {:.3}, mass: {:.3})",
            self.pt, self.eta, self.phi, self.mass
        )
    }
}

/// Anything carrying a four-momentum.
///
/// The matcher and the likelihood machinery only ever look at directions and
/// transverse momenta, implementors hand out their four-vector and get the
/// angular helpers for free.
pub trait Kinematic {
    fn four_momentum(&self) -> FourMomentum;

    #[inline]
    fn pt(&self) -> f64 {
        self.four_momentum().pt
    }

    #[inline]
    fn eta(&self) -> f64 {
        self.four_momentum().eta
    }

    #[inline]
    fn phi(&self) -> f64 {
        self.four_momentum().phi
    }

    /// Cone distance to any other `Kinematic`.
    #[inline]
    fn delta_r_to<K: Kinematic + ?Sized>(&self, other: &K) -> f64 {
        delta_r(self.eta(), self.phi(), other.eta(), other.phi())
    }
}

impl Kinematic for FourMomentum {
    fn four_momentum(&self) -> FourMomentum {
        *self
    }
}
