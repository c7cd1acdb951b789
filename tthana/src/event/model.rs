use std::fmt;
use std::fmt::{Display, Formatter};

use hepcore::kinematics::four_momentum::{FourMomentum, Kinematic};
use hepcore::kinematics::transfer::{TfFlavour, TransferFunction, TransferFunctionSet};
use serde::{Deserialize, Serialize};

/// Transfer functions attached to a selected jet, full-jet and subjet
/// variants for both flavour hypotheses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct JetTransfer {
    pub b: TransferFunction,
    pub light: TransferFunction,
    pub b_subjet: TransferFunction,
    pub light_subjet: TransferFunction,
}

impl JetTransfer {
    pub fn attach(set: &TransferFunctionSet, eta: f64) -> Self {
        JetTransfer {
            b: set.for_jet(TfFlavour::B, eta),
            light: set.for_jet(TfFlavour::Light, eta),
            b_subjet: set.for_subjet(TfFlavour::B, eta),
            light_subjet: set.for_subjet(TfFlavour::Light, eta),
        }
    }
}

/// A reconstructed jet.
///
/// `btag_flag` is written by the likelihood analyzer, generator-level fields
/// are only present for simulated events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Jet {
    pub p4: FourMomentum,
    pub btag_disc: f64,
    pub btag_flag: f64,
    pub mc_flavour: Option<i32>,
    pub gen_p4: Option<FourMomentum>,
    pub transfer: Option<JetTransfer>,
    pub from_subjet: Option<SubjetRole>,
}

impl Jet {
    pub fn new(p4: FourMomentum, btag_disc: f64) -> Self {
        Jet {
            p4,
            btag_disc,
            btag_flag: 0.0,
            mc_flavour: None,
            gen_p4: None,
            transfer: None,
            from_subjet: None,
        }
    }
}

impl Kinematic for Jet {
    fn four_momentum(&self) -> FourMomentum {
        self.p4
    }
}

/// A reconstructed charged lepton.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lepton {
    pub p4: FourMomentum,
    pub pdg_id: i32,
    pub charge: f64,
    pub iso: f64,
}

impl Lepton {
    pub fn new(p4: FourMomentum, pdg_id: i32, charge: f64, iso: f64) -> Self {
        Lepton { p4, pdg_id, charge, iso }
    }
}

impl Kinematic for Lepton {
    fn four_momentum(&self) -> FourMomentum {
        self.p4
    }
}

/// Role of a subjet inside its boosted top candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjetRole {
    W1,
    W2,
    NonW,
}

impl SubjetRole {
    #[inline]
    pub fn is_non_w(&self) -> bool {
        matches!(self, SubjetRole::NonW)
    }
}

impl Display for SubjetRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SubjetRole::W1 => write!(f, "sjW1"),
            SubjetRole::W2 => write!(f, "sjW2"),
            SubjetRole::NonW => write!(f, "sjNonW"),
        }
    }
}

/// One groomed subjet of a top candidate. The b-tag flag stays empty until
/// reconciliation assigns a role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subjet {
    pub p4: FourMomentum,
    pub role: SubjetRole,
    pub btag_flag: Option<f64>,
}

impl Subjet {
    pub fn new(p4: FourMomentum, role: SubjetRole) -> Self {
        Subjet { p4, role, btag_flag: None }
    }
}

impl Kinematic for Subjet {
    fn four_momentum(&self) -> FourMomentum {
        self.p4
    }
}

/// A boosted hadronic top candidate with its three subjets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopCandidate {
    pub p4: FourMomentum,
    pub f_w: f64,
    pub r_min: f64,
    pub r_min_expected: f64,
    pub subjets: [Subjet; 3],
    pub del_r_lepton: Option<f64>,
}

impl TopCandidate {
    pub fn new(p4: FourMomentum, f_w: f64, r_min: f64, r_min_expected: f64, subjets: [Subjet; 3]) -> Self {
        TopCandidate {
            p4,
            f_w,
            r_min,
            r_min_expected,
            subjets,
            del_r_lepton: None,
        }
    }

    /// Absolute distance of the observed minimum pairwise subjet distance
    /// from its expectation.
    #[inline]
    pub fn del_r_min(&self) -> f64 {
        (self.r_min - self.r_min_expected).abs()
    }

    /// Numeric attribute access by name, the vocabulary the textual cut
    /// criteria are written in.
    pub fn attribute(&self, name: &str) -> Option<f64> {
        match name {
            "pt" => Some(self.p4.pt),
            "eta" => Some(self.p4.eta),
            "phi" => Some(self.p4.phi),
            "mass" => Some(self.p4.mass),
            "fW" => Some(self.f_w),
            "Rmin" => Some(self.r_min),
            "RminExpected" => Some(self.r_min_expected),
            "delRmin" => Some(self.del_r_min()),
            "delRlepton" => self.del_r_lepton,
            _ => None,
        }
    }
}

impl Kinematic for TopCandidate {
    fn four_momentum(&self) -> FourMomentum {
        self.p4
    }
}

/// A generator-level quark.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenParticle {
    pub p4: FourMomentum,
    pub pdg_id: i32,
    pub delmass_top: Option<f64>,
}

impl GenParticle {
    pub fn new(p4: FourMomentum, pdg_id: i32) -> Self {
        GenParticle { p4, pdg_id, delmass_top: None }
    }
}

impl Kinematic for GenParticle {
    fn four_momentum(&self) -> FourMomentum {
        self.p4
    }
}

/// Missing transverse energy.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Met {
    pub px: f64,
    pub py: f64,
}

impl Met {
    pub fn new(px: f64, py: f64) -> Self {
        Met { px, py }
    }

    pub fn from_pt_phi(pt: f64, phi: f64) -> Self {
        Met { px: pt * phi.cos(), py: pt * phi.sin() }
    }

    #[inline]
    pub fn pt(&self) -> f64 {
        (self.px * self.px + self.py * self.py).sqrt()
    }

    #[inline]
    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }
}

/// The reconstructed content of one event as handed to the pipeline. Owned
/// per event, nothing in here is shared across events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventRecord {
    pub leptons: Vec<Lepton>,
    pub jets: Vec<Jet>,
    pub top_candidates: Vec<TopCandidate>,
    pub gen_b_from_top: Vec<GenParticle>,
    pub gen_b_from_higgs: Vec<GenParticle>,
    pub gen_w_quarks: Vec<GenParticle>,
    pub met: Met,
}
