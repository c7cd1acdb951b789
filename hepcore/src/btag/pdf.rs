use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Jet flavour a probability table is keyed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavour {
    B,
    C,
    Light,
}

impl Flavour {
    /// Collapses a generator PDG id onto the three table flavours.
    pub fn from_pdg(pdg_id: i32) -> Flavour {
        match pdg_id.abs() {
            5 => Flavour::B,
            4 => Flavour::C,
            _ => Flavour::Light,
        }
    }
}

impl Display for Flavour {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Flavour::B => write!(f, "b"),
            Flavour::C => write!(f, "c"),
            Flavour::Light => write!(f, "l"),
        }
    }
}

/// The table families shipped with the analysis: the legacy 8 TeV set, the
/// refreshed single-eta-bin set and the pt/eta binned three-dimensional set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableFamily {
    Legacy,
    Refreshed,
    PtEtaBinned,
}

impl Display for TableFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TableFamily::Legacy => write!(f, "old"),
            TableFamily::Refreshed => write!(f, "new_eta_1bin"),
            TableFamily::PtEtaBinned => write!(f, "new_pt_eta_bin_3d"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("no {flavour} table in family {family}")]
    MissingTable { family: TableFamily, flavour: Flavour },
}

/// Per-jet flavour probabilities, one lookup result per flavour.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FlavourProbs {
    pub b: f64,
    pub c: f64,
    pub light: f64,
}

impl FlavourProbs {
    pub fn new(b: f64, c: f64, light: f64) -> Self {
        FlavourProbs { b, c, light }
    }
}

/// A uniformly binned one-dimensional histogram over the discriminant axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Histogram1D {
    pub lo: f64,
    pub hi: f64,
    pub contents: Vec<f64>,
}

impl Histogram1D {
    pub fn new(lo: f64, hi: f64, contents: Vec<f64>) -> Self {
        assert!(!contents.is_empty(), "histogram needs at least one bin");
        assert!(hi > lo, "histogram needs a non-empty axis range");
        Histogram1D { lo, hi, contents }
    }

    /// Scale the bin contents so they sum to one.
    pub fn normalize(&mut self) {
        let total: f64 = self.contents.iter().sum();
        if total > 0.0 {
            for c in self.contents.iter_mut() {
                *c /= total;
            }
        }
    }

    /// Bin content at `x`.
    ///
    /// The argument is clamped into the axis range first, and the overflow
    /// edge (`x == hi`) folds into the last finite bin, so a discriminant of
    /// exactly 1.0 never reads an empty overflow slot.
    pub fn value_at(&self, x: f64) -> f64 {
        let n = self.contents.len();
        let x = x.clamp(self.lo, self.hi);
        let width = (self.hi - self.lo) / n as f64;
        let mut idx = ((x - self.lo) / width).floor() as usize;
        if idx >= n {
            idx = n - 1;
        }
        self.contents[idx]
    }
}

/// Picks the bin of `x` along a non-uniform ascending edge vector,
/// clamping out-of-range values into the first or last bin.
#[inline]
fn bin_of(edges: &[f64], x: f64) -> usize {
    debug_assert!(edges.len() >= 2);
    if x < edges[0] {
        return 0;
    }
    let n_bins = edges.len() - 1;
    for i in 0..n_bins {
        if x >= edges[i] && x < edges[i + 1] {
            return i;
        }
    }
    n_bins - 1
}

/// A pt and |eta| binned family of discriminant histograms.
///
/// `slices[pt_bin][eta_bin]` holds the discriminant distribution for jets in
/// that kinematic cell; each slice is normalized independently so every cell
/// reads as a conditional probability over the discriminant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Histogram3D {
    pub pt_edges: Vec<f64>,
    pub eta_edges: Vec<f64>,
    pub slices: Vec<Vec<Histogram1D>>,
}

impl Histogram3D {
    pub fn new(pt_edges: Vec<f64>, eta_edges: Vec<f64>, slices: Vec<Vec<Histogram1D>>) -> Self {
        assert!(pt_edges.len() >= 2 && eta_edges.len() >= 2);
        assert_eq!(slices.len(), pt_edges.len() - 1);
        for row in &slices {
            assert_eq!(row.len(), eta_edges.len() - 1);
        }
        Histogram3D { pt_edges, eta_edges, slices }
    }

    pub fn normalize(&mut self) {
        for row in self.slices.iter_mut() {
            for h in row.iter_mut() {
                h.normalize();
            }
        }
    }

    pub fn value_at(&self, pt: f64, eta: f64, disc: f64) -> f64 {
        let pt_bin = bin_of(&self.pt_edges, pt);
        let eta_bin = bin_of(&self.eta_edges, eta.abs());
        self.slices[pt_bin][eta_bin].value_at(disc)
    }
}

/// A flavour probability table, either a plain discriminant histogram or a
/// kinematically binned one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FlavourTable {
    OneDim(Histogram1D),
    ThreeDim(Histogram3D),
}

/// The bundle of all flavour tables known to the analysis.
///
/// Tables are normalized on insertion. A lookup against a family/flavour
/// combination that was never loaded is a configuration error and comes back
/// as `Err`, not as a per-jet zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BtagPdfSet {
    #[serde(with = "tables_serde")]
    tables: HashMap<(TableFamily, Flavour), FlavourTable>,
}

/// Serializes the tuple-keyed table map as an entry list, since JSON object
/// keys must be strings.
mod tables_serde {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Flavour, FlavourTable, TableFamily};

    pub fn serialize<S>(
        tables: &HashMap<(TableFamily, Flavour), FlavourTable>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(tables.iter())
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<(TableFamily, Flavour), FlavourTable>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries: Vec<((TableFamily, Flavour), FlavourTable)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

impl BtagPdfSet {
    pub fn new() -> Self {
        BtagPdfSet { tables: HashMap::new() }
    }

    pub fn insert_1d(&mut self, family: TableFamily, flavour: Flavour, mut histogram: Histogram1D) {
        histogram.normalize();
        self.tables.insert((family, flavour), FlavourTable::OneDim(histogram));
    }

    pub fn insert_3d(&mut self, family: TableFamily, flavour: Flavour, mut histogram: Histogram3D) {
        histogram.normalize();
        self.tables.insert((family, flavour), FlavourTable::ThreeDim(histogram));
    }

    /// Probability of the observed discriminant for one flavour hypothesis.
    ///
    /// # Arguments
    ///
    /// * `family` - Which table family to read.
    /// * `flavour` - Flavour hypothesis.
    /// * `pt`, `eta` - Jet kinematics, only consulted by binned tables.
    /// * `disc` - The b-tagging discriminant, clamped into [0, 1].
    pub fn probability(
        &self,
        family: TableFamily,
        flavour: Flavour,
        pt: f64,
        eta: f64,
        disc: f64,
    ) -> Result<f64, PdfError> {
        let table = self
            .tables
            .get(&(family, flavour))
            .ok_or(PdfError::MissingTable { family, flavour })?;
        let disc = disc.clamp(0.0, 1.0);
        Ok(match table {
            FlavourTable::OneDim(h) => h.value_at(disc),
            FlavourTable::ThreeDim(h) => h.value_at(pt, eta, disc),
        })
    }

    /// All three flavour probabilities of one jet against one family.
    pub fn flavour_probs(&self, family: TableFamily, pt: f64, eta: f64, disc: f64) -> Result<FlavourProbs, PdfError> {
        Ok(FlavourProbs::new(
            self.probability(family, Flavour::B, pt, eta, disc)?,
            self.probability(family, Flavour::C, pt, eta, disc)?,
            self.probability(family, Flavour::Light, pt, eta, disc)?,
        ))
    }

    /// Built-in smooth default tables for all three families.
    ///
    /// Shapes follow the usual discriminant behavior, b rising towards one,
    /// light falling steeply, charm in between; the binned family steepens
    /// mildly with pt. Meant for simulation-driven runs and tests, real
    /// campaigns load measured tables through the configuration.
    pub fn default_tables() -> Self {
        let mut set = BtagPdfSet::new();

        let n_bins = 20;
        let sampled = |f: &dyn Fn(f64) -> f64| -> Vec<f64> {
            (0..n_bins)
                .map(|i| {
                    let x = (i as f64 + 0.5) / n_bins as f64;
                    f(x)
                })
                .collect()
        };

        let b_shape = |steep: f64| move |x: f64| 0.04 + steep * x * x * x;
        let c_shape = |x: f64| 0.25 + 0.9 * x;
        let l_shape = |steep: f64| move |x: f64| 0.03 + (-(steep * x)).exp();

        set.insert_1d(TableFamily::Legacy, Flavour::B, Histogram1D::new(0.0, 1.0, sampled(&b_shape(2.6))));
        set.insert_1d(TableFamily::Legacy, Flavour::C, Histogram1D::new(0.0, 1.0, sampled(&c_shape)));
        set.insert_1d(TableFamily::Legacy, Flavour::Light, Histogram1D::new(0.0, 1.0, sampled(&l_shape(5.0))));

        set.insert_1d(TableFamily::Refreshed, Flavour::B, Histogram1D::new(0.0, 1.0, sampled(&b_shape(3.2))));
        set.insert_1d(TableFamily::Refreshed, Flavour::C, Histogram1D::new(0.0, 1.0, sampled(&c_shape)));
        set.insert_1d(TableFamily::Refreshed, Flavour::Light, Histogram1D::new(0.0, 1.0, sampled(&l_shape(6.0))));

        let pt_edges = vec![20.0, 40.0, 60.0, 100.0, 600.0];
        let eta_edges = vec![0.0, 1.0, 2.5];
        let binned = |per_flavour: &dyn Fn(f64, usize) -> f64| -> Histogram3D {
            let slices: Vec<Vec<Histogram1D>> = (0..pt_edges.len() - 1)
                .map(|pt_bin| {
                    (0..eta_edges.len() - 1)
                        .map(|_eta_bin| {
                            let contents: Vec<f64> = (0..n_bins)
                                .map(|i| {
                                    let x = (i as f64 + 0.5) / n_bins as f64;
                                    per_flavour(x, pt_bin)
                                })
                                .collect();
                            Histogram1D::new(0.0, 1.0, contents)
                        })
                        .collect()
                })
                .collect();
            Histogram3D::new(pt_edges.clone(), eta_edges.clone(), slices)
        };

        set.insert_3d(
            TableFamily::PtEtaBinned,
            Flavour::B,
            binned(&|x, pt_bin| 0.04 + (3.0 + 0.2 * pt_bin as f64) * x * x * x),
        );
        set.insert_3d(TableFamily::PtEtaBinned, Flavour::C, binned(&|x, _| 0.25 + 0.9 * x));
        set.insert_3d(
            TableFamily::PtEtaBinned,
            Flavour::Light,
            binned(&|x, pt_bin| 0.03 + (-(5.5 + 0.3 * pt_bin as f64) * x).exp()),
        );

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_at_clamps_and_folds_overflow() {
        let h = Histogram1D::new(0.0, 1.0, vec![1.0, 2.0, 3.0, 4.0]);
        assert!((h.value_at(-0.5) - h.value_at(0.0)).abs() < 1e-12);
        assert!((h.value_at(1.0) - 4.0).abs() < 1e-12);
        assert!((h.value_at(7.3) - 4.0).abs() < 1e-12);
        assert!((h.value_at(0.3) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalization_on_insert() {
        let mut set = BtagPdfSet::new();
        set.insert_1d(TableFamily::Legacy, Flavour::B, Histogram1D::new(0.0, 1.0, vec![1.0, 3.0]));
        let low = set.probability(TableFamily::Legacy, Flavour::B, 50.0, 0.0, 0.2).unwrap();
        let high = set.probability(TableFamily::Legacy, Flavour::B, 50.0, 0.0, 0.8).unwrap();
        assert!((low - 0.25).abs() < 1e-12);
        assert!((high - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let set = BtagPdfSet::new();
        let result = set.probability(TableFamily::Refreshed, Flavour::C, 40.0, 0.5, 0.6);
        assert!(matches!(
            result,
            Err(PdfError::MissingTable { family: TableFamily::Refreshed, flavour: Flavour::C })
        ));
    }

    #[test]
    fn test_three_dim_slice_selection() {
        let cell = |v: f64| Histogram1D::new(0.0, 1.0, vec![v]);
        let h = Histogram3D::new(
            vec![20.0, 60.0, 600.0],
            vec![0.0, 1.0, 2.5],
            vec![vec![cell(1.0), cell(2.0)], vec![cell(3.0), cell(4.0)]],
        );
        assert!((h.value_at(30.0, 0.5, 0.5) - 1.0).abs() < 1e-12);
        assert!((h.value_at(30.0, -1.8, 0.5) - 2.0).abs() < 1e-12);
        assert!((h.value_at(100.0, 0.2, 0.5) - 3.0).abs() < 1e-12);
        // out-of-range kinematics clamp into the nearest cell
        assert!((h.value_at(900.0, 9.0, 0.5) - 4.0).abs() < 1e-12);
        assert!((h.value_at(5.0, 0.0, 0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_tables_cover_all_families() {
        let set = BtagPdfSet::default_tables();
        for family in [TableFamily::Legacy, TableFamily::Refreshed, TableFamily::PtEtaBinned] {
            let probs = set.flavour_probs(family, 80.0, 0.4, 0.9).unwrap();
            assert!(probs.b > 0.0 && probs.c > 0.0 && probs.light > 0.0);
            // high discriminant reads b-like
            assert!(probs.b > probs.light);
        }
    }
}
