//! Analysis configuration.
//!
//! One immutable configuration object travels through the whole pipeline,
//! nothing reads tunables from anywhere else. Defaults reproduce the
//! standard single-lepton plus di-lepton selection, JSON documents can
//! override any part of it.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::Path;

use hepcore::btag::pdf::BtagPdfSet;
use hepcore::kinematics::transfer::TransferFunctionSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::categories::EventCategory;
use crate::event::model::TopCandidate;

/// Comparison operator of a textual cut criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equal,
}

impl Comparator {
    fn from_symbol(symbol: &str) -> Option<Comparator> {
        match symbol {
            "<" => Some(Comparator::Less),
            "<=" => Some(Comparator::LessEq),
            ">" => Some(Comparator::Greater),
            ">=" => Some(Comparator::GreaterEq),
            "==" => Some(Comparator::Equal),
            _ => None,
        }
    }

    #[inline]
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Less => value < threshold,
            Comparator::LessEq => value <= threshold,
            Comparator::Greater => value > threshold,
            Comparator::GreaterEq => value >= threshold,
            Comparator::Equal => value == threshold,
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Less => write!(f, "<"),
            Comparator::LessEq => write!(f, "<="),
            Comparator::Greater => write!(f, ">"),
            Comparator::GreaterEq => write!(f, ">="),
            Comparator::Equal => write!(f, "=="),
        }
    }
}

/// Attribute names the cut vocabulary accepts, everything a
/// [`TopCandidate`] can answer for.
const CUT_ATTRIBUTES: [&str; 9] = [
    "pt",
    "eta",
    "phi",
    "mass",
    "fW",
    "Rmin",
    "RminExpected",
    "delRmin",
    "delRlepton",
];

/// One candidate-level cut, e.g. `pt > 200.0`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CutCriterion {
    pub attribute: String,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl CutCriterion {
    pub fn new(attribute: &str, comparator: Comparator, threshold: f64) -> Self {
        CutCriterion {
            attribute: attribute.to_string(),
            comparator,
            threshold,
        }
    }

    /// Parses the textual form, e.g. `"mass < 220.0"`. Unknown attributes
    /// and malformed expressions are configuration errors.
    pub fn parse(text: &str) -> Result<CutCriterion> {
        let pattern = Regex::new(r"^\s*(\w+)\s*(<=|>=|==|<|>)\s*(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\s*$").unwrap();
        let captures = pattern
            .captures(text)
            .ok_or_else(|| Error::CutCriterion(text.to_string()))?;

        let attribute = captures.get(1).unwrap().as_str();
        if !CUT_ATTRIBUTES.contains(&attribute) {
            return Err(Error::CutCriterion(text.to_string()));
        }
        let comparator = Comparator::from_symbol(captures.get(2).unwrap().as_str())
            .ok_or_else(|| Error::CutCriterion(text.to_string()))?;
        let threshold: f64 = captures
            .get(3)
            .unwrap()
            .as_str()
            .parse()
            .map_err(|_| Error::CutCriterion(text.to_string()))?;

        Ok(CutCriterion::new(attribute, comparator, threshold))
    }

    /// Whether a candidate satisfies this criterion. Candidates without the
    /// requested attribute fail it.
    pub fn passes(&self, candidate: &TopCandidate) -> bool {
        match candidate.attribute(&self.attribute) {
            Some(value) => self.comparator.compare(value, self.threshold),
            None => false,
        }
    }
}

impl Display for CutCriterion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.comparator, self.threshold)
    }
}

/// Logical AND over a criteria list.
pub fn candidate_passes(candidate: &TopCandidate, criteria: &[CutCriterion]) -> bool {
    criteria.iter().all(|c| c.passes(candidate))
}

/// How the untagged jet pool is defined after the likelihood scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UntaggedSelectionPolicy {
    /// The best four-b permutation of the refreshed tables fixes the tagged
    /// prefix, the remainder is untagged.
    ByLikelihoodRatio,
    /// Plain working-point comparison on the discriminant.
    ByDiscriminant,
}

/// Lepton selection cuts, tight legs drive the single-lepton mode, loose
/// legs the di-lepton mode.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LeptonCuts {
    pub tight_pt: f64,
    pub loose_pt: f64,
    pub max_eta: f64,
    pub tight_iso: f64,
    pub loose_iso: f64,
}

/// Jet acceptance cuts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct JetCuts {
    pub min_pt: f64,
    pub max_eta: f64,
}

/// Likelihood-ratio thresholds per analysis category.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CategoryLrCuts {
    pub cat1: f64,
    pub cat2: f64,
    pub cat3: f64,
    pub cat6: f64,
}

impl CategoryLrCuts {
    pub fn for_category(&self, category: EventCategory) -> Option<f64> {
        match category {
            EventCategory::Cat1 => Some(self.cat1),
            EventCategory::Cat2 => Some(self.cat2),
            EventCategory::Cat3 => Some(self.cat3),
            EventCategory::Cat6 => Some(self.cat6),
            EventCategory::NoCat => None,
        }
    }
}

/// Truth-match counts required before an event is handed to the
/// integrator. Only consulted when `require_quark_match` is on.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RequiredMatches {
    pub w_quarks: usize,
    pub b_from_top: usize,
    pub b_from_higgs: usize,
}

/// The immutable analysis configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cone acceptance cut shared by every matching step.
    pub delta_r_cut: f64,
    /// Reference top mass for hadronic-b identification.
    pub top_mass_reference: f64,
    /// Reference W mass for untagged-pair ranking.
    pub w_mass_reference: f64,
    pub lepton: LeptonCuts,
    pub jet: JetCuts,
    /// Working point on the b-tag discriminant.
    pub btag_wp: f64,
    /// How many leading-discriminant jets enter the permutation scan.
    pub max_jets_for_likelihood: usize,
    pub untagged_policy: UntaggedSelectionPolicy,
    pub lr_cuts: CategoryLrCuts,
    /// Gate integration on generator-truth match counts.
    pub require_quark_match: bool,
    pub required_matches: RequiredMatches,
    /// Candidate-level cuts applied before a top candidate is used.
    pub top_cuts: Vec<CutCriterion>,
    pub transfer: TransferFunctionSet,
    pub btag_pdfs: BtagPdfSet,
    /// Weight of the alternative hypothesis in the bad-probability check.
    pub bad_prob_alt_weight: f64,
    /// Below this relative weight an integration result is discarded.
    pub bad_prob_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            delta_r_cut: 0.3,
            top_mass_reference: 172.04,
            w_mass_reference: 80.0,
            lepton: LeptonCuts {
                tight_pt: 30.0,
                loose_pt: 20.0,
                max_eta: 2.4,
                tight_iso: 0.12,
                loose_iso: 0.2,
            },
            jet: JetCuts { min_pt: 30.0, max_eta: 2.5 },
            btag_wp: 0.814,
            max_jets_for_likelihood: 6,
            untagged_policy: UntaggedSelectionPolicy::ByLikelihoodRatio,
            // thresholds on the (4b) vs (2b, 1c) refreshed ratio
            lr_cuts: CategoryLrCuts {
                cat1: 0.85,
                cat2: 0.92,
                cat3: 0.88,
                cat6: 0.85,
            },
            require_quark_match: false,
            required_matches: RequiredMatches {
                w_quarks: 2,
                b_from_top: 2,
                b_from_higgs: 2,
            },
            top_cuts: vec![
                CutCriterion::new("pt", Comparator::Greater, 200.0),
                CutCriterion::new("mass", Comparator::Greater, 120.0),
                CutCriterion::new("mass", Comparator::Less, 220.0),
                CutCriterion::new("fW", Comparator::Less, 0.175),
            ],
            transfer: TransferFunctionSet::default(),
            btag_pdfs: BtagPdfSet::default_tables(),
            bad_prob_alt_weight: 0.02,
            bad_prob_threshold: 1e-4,
        }
    }
}

impl AnalysisConfig {
    /// A configuration that lets almost everything through, for debugging
    /// selection effects.
    pub fn permissive() -> Self {
        Self {
            delta_r_cut: 0.5,
            lepton: LeptonCuts {
                tight_pt: 20.0,
                loose_pt: 10.0,
                max_eta: 2.5,
                tight_iso: 0.3,
                loose_iso: 0.5,
            },
            jet: JetCuts { min_pt: 20.0, max_eta: 3.0 },
            top_cuts: vec![CutCriterion::new("pt", Comparator::Greater, 150.0)],
            ..Default::default()
        }
    }

    /// A tightened configuration for high-purity running.
    pub fn strict() -> Self {
        Self {
            delta_r_cut: 0.2,
            jet: JetCuts { min_pt: 40.0, max_eta: 2.4 },
            btag_wp: 0.941,
            require_quark_match: true,
            ..Default::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.delta_r_cut <= 0.0 {
            return Err(Error::Config("delta_r_cut must be positive".to_string()));
        }
        if self.max_jets_for_likelihood == 0 {
            return Err(Error::Config("max_jets_for_likelihood must be at least 1".to_string()));
        }
        Ok(())
    }
}
