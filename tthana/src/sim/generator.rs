//! Seeded synthetic event generation.
//!
//! Builds ttH-like events for the demo binary and integration-style tests:
//! a hadronic boosted top with its three quarks, a leptonic top side and a
//! Higgs decaying to two b quarks. Quarks are smeared into jets with
//! flavour-dependent discriminants, the hadronic triplet doubles as the
//! boosted top candidate. Everything is driven by one seeded generator, so
//! a run is reproducible from its seed.

use std::f64::consts::PI;

use hepcore::kinematics::four_momentum::FourMomentum;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

use crate::event::model::{EventRecord, GenParticle, Jet, Lepton, Met, Subjet, SubjetRole, TopCandidate};

/// Tunables of the synthetic event factory.
#[derive(Clone, Copy, Debug)]
pub struct GeneratorConfig {
    /// Fractional jet pt resolution.
    pub jet_resolution: f64,
    /// Angular smearing of jets against their quarks.
    pub angular_smear: f64,
    /// Discriminant location for b jets.
    pub b_disc_location: f64,
    /// Discriminant location for light jets.
    pub light_disc_location: f64,
    pub disc_spread: f64,
    /// Chance of one extra soft light jet.
    pub extra_jet_probability: f64,
    pub met_spread: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            jet_resolution: 0.10,
            angular_smear: 0.04,
            b_disc_location: 0.92,
            light_disc_location: 0.12,
            disc_spread: 0.06,
            extra_jet_probability: 0.3,
            met_spread: 18.0,
        }
    }
}

/// The seeded factory itself.
pub struct EventGenerator {
    rng: StdRng,
    pub config: GeneratorConfig,
}

impl EventGenerator {
    pub fn new(seed: u64) -> Self {
        EventGenerator {
            rng: StdRng::seed_from_u64(seed),
            config: GeneratorConfig::default(),
        }
    }

    pub fn with_config(seed: u64, config: GeneratorConfig) -> Self {
        EventGenerator {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        let dist = Normal::new(mean, std_dev).unwrap();
        dist.sample(&mut self.rng)
    }

    /// A quark at a smeared offset from a reference direction.
    fn quark_near(&mut self, pt: f64, eta: f64, phi: f64, spread: f64, pdg_id: i32) -> GenParticle {
        let eta = self.gaussian(eta, spread);
        let phi = wrap_phi(self.gaussian(phi, spread));
        GenParticle::new(FourMomentum::new(pt, eta, phi, 0.0), pdg_id)
    }

    /// Smears a quark into a reconstructed jet.
    fn jet_from_quark(&mut self, quark: &GenParticle) -> Jet {
        let pt = (quark.p4.pt * (1.0 + self.gaussian(0.0, self.config.jet_resolution))).max(15.0);
        let eta = self.gaussian(quark.p4.eta, self.config.angular_smear);
        let phi = wrap_phi(self.gaussian(quark.p4.phi, self.config.angular_smear));

        let is_b = quark.pdg_id.abs() == 5;
        let location = if is_b {
            self.config.b_disc_location
        } else {
            self.config.light_disc_location
        };
        let disc = self.gaussian(location, self.config.disc_spread).clamp(0.0, 1.0);

        let mut jet = Jet::new(FourMomentum::new(pt, eta, phi, 8.0), disc);
        jet.mc_flavour = Some(quark.pdg_id);
        jet.gen_p4 = Some(quark.p4);
        jet
    }

    /// One synthetic single-lepton ttH-like event.
    pub fn generate(&mut self) -> EventRecord {
        // hadronic top axis and momentum
        let top_pt = self.rng.gen_range(230.0..380.0);
        let top_eta = self.rng.gen_range(-1.2..1.2);
        let top_phi = self.rng.gen_range(-PI..PI);

        let b_had = self.quark_near(0.45 * top_pt, top_eta, top_phi, 0.30, 5);

        // the W quark pair is placed at the opening angle that puts the pair
        // mass on the W, aimed towards eta zero so both quarks stay in
        // acceptance
        let w_pt_1 = 0.32 * top_pt;
        let w_pt_2 = 0.25 * top_pt;
        let w_quark_1 = self.quark_near(w_pt_1, top_eta, top_phi, 0.20, 2);
        let pair_mass = self.gaussian(80.5, 2.0);
        let d_phi: f64 = self.rng.gen_range(0.2..0.5);
        let cosh_d_eta = pair_mass * pair_mass / (2.0 * w_pt_1 * w_pt_2) + d_phi.cos();
        let d_eta = cosh_d_eta.acosh() * if top_eta > 0.0 { -1.0 } else { 1.0 };
        let w_quark_2 = GenParticle::new(
            FourMomentum::new(
                w_pt_2,
                w_quark_1.p4.eta + d_eta,
                wrap_phi(w_quark_1.p4.phi + d_phi),
                0.0,
            ),
            -1,
        );

        // leptonic top side recoils in azimuth
        let lep_phi = wrap_phi(top_phi + PI);
        let b_lep_pt = self.rng.gen_range(60.0..120.0);
        let b_lep = self.quark_near(b_lep_pt, -top_eta, lep_phi, 0.40, -5);

        let higgs_eta = self.rng.gen_range(-1.5..1.5);
        let higgs_phi = self.rng.gen_range(-PI..PI);
        let higgs_pt_1 = self.rng.gen_range(70.0..140.0);
        let b_higgs_1 = self.quark_near(higgs_pt_1, higgs_eta, higgs_phi, 0.45, 5);
        let higgs_pt_2 = self.rng.gen_range(60.0..120.0);
        let b_higgs_2 = self.quark_near(higgs_pt_2, higgs_eta, higgs_phi, 0.45, -5);

        let mut jets = vec![
            self.jet_from_quark(&b_had),
            self.jet_from_quark(&w_quark_1),
            self.jet_from_quark(&w_quark_2),
            self.jet_from_quark(&b_lep),
            self.jet_from_quark(&b_higgs_1),
            self.jet_from_quark(&b_higgs_2),
        ];
        if self.rng.gen_bool(self.config.extra_jet_probability) {
            let soft_pt = self.rng.gen_range(32.0..55.0);
            let soft = self.quark_near(soft_pt, 0.0, 0.0, 1.2, 1);
            jets.push(self.jet_from_quark(&soft));
        }

        let lepton_pt = self.gaussian(45.0, 8.0).max(32.0);
        let lepton = Lepton::new(
            FourMomentum::new(lepton_pt, self.gaussian(-top_eta, 0.4), wrap_phi(self.gaussian(lep_phi, 0.4)), 0.0),
            13,
            if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 },
            self.rng.gen_range(0.0..0.08),
        );

        let subjets = [
            Subjet::new(
                FourMomentum::new(w_quark_1.p4.pt, w_quark_1.p4.eta, w_quark_1.p4.phi, 6.0),
                SubjetRole::W1,
            ),
            Subjet::new(
                FourMomentum::new(w_quark_2.p4.pt, w_quark_2.p4.eta, w_quark_2.p4.phi, 6.0),
                SubjetRole::W2,
            ),
            Subjet::new(FourMomentum::new(b_had.p4.pt, b_had.p4.eta, b_had.p4.phi, 9.0), SubjetRole::NonW),
        ];
        let r_min = pairwise_r_min(&subjets);
        let top_candidate = TopCandidate::new(
            FourMomentum::new(top_pt, top_eta, top_phi, self.gaussian(172.0, 10.0).clamp(125.0, 215.0)),
            self.rng.gen_range(0.0..0.17),
            r_min,
            self.gaussian(r_min, 0.1),
            subjets,
        );

        let met = Met::new(
            self.gaussian(0.0, self.config.met_spread),
            self.gaussian(0.0, self.config.met_spread),
        );

        EventRecord {
            leptons: vec![lepton],
            jets,
            top_candidates: vec![top_candidate],
            gen_b_from_top: vec![b_had, b_lep],
            gen_b_from_higgs: vec![b_higgs_1, b_higgs_2],
            gen_w_quarks: vec![w_quark_1, w_quark_2],
            met,
        }
    }

    pub fn generate_batch(&mut self, n: usize) -> Vec<EventRecord> {
        (0..n).map(|_| self.generate()).collect()
    }
}

#[inline]
fn wrap_phi(phi: f64) -> f64 {
    let mut phi = phi;
    while phi > PI {
        phi -= 2.0 * PI;
    }
    while phi <= -PI {
        phi += 2.0 * PI;
    }
    phi
}

fn pairwise_r_min(subjets: &[Subjet; 3]) -> f64 {
    use hepcore::kinematics::four_momentum::Kinematic;
    let d01 = subjets[0].delta_r_to(&subjets[1]);
    let d02 = subjets[0].delta_r_to(&subjets[2]);
    let d12 = subjets[1].delta_r_to(&subjets[2]);
    d01.min(d02).min(d12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::config::AnalysisConfig;
    use crate::analysis::pipeline::interpret_batch;

    #[test]
    fn test_same_seed_reproduces() {
        let mut first = EventGenerator::new(7);
        let mut second = EventGenerator::new(7);
        let events_1 = first.generate_batch(5);
        let events_2 = second.generate_batch(5);
        assert_eq!(
            serde_json::to_string(&events_1).unwrap(),
            serde_json::to_string(&events_2).unwrap()
        );
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut first = EventGenerator::new(1);
        let mut second = EventGenerator::new(2);
        let event_1 = first.generate();
        let event_2 = second.generate();
        assert!((event_1.jets[0].p4.pt - event_2.jets[0].p4.pt).abs() > 1e-9);
    }

    #[test]
    fn test_event_topology() {
        let mut generator = EventGenerator::new(11);
        let event = generator.generate();

        assert_eq!(event.leptons.len(), 1);
        assert!(event.jets.len() >= 6);
        assert_eq!(event.top_candidates.len(), 1);
        assert_eq!(event.gen_b_from_top.len(), 2);
        assert_eq!(event.gen_b_from_higgs.len(), 2);
        assert_eq!(event.gen_w_quarks.len(), 2);

        // four b quarks, four b-ish discriminants
        let n_b_like = event.jets.iter().filter(|j| j.btag_disc > 0.5).count();
        assert_eq!(n_b_like, 4);
        assert!(event.jets.iter().all(|j| j.gen_p4.is_some() && j.mc_flavour.is_some()));

        let top = &event.top_candidates[0];
        assert!(top.p4.pt > 200.0);
        assert!(top.p4.mass > 120.0 && top.p4.mass < 220.0);
        assert_eq!(top.subjets[2].role, SubjetRole::NonW);
    }

    #[test]
    fn test_sampled_momenta_in_range() {
        let mut generator = EventGenerator::new(3);
        for _ in 0..25 {
            let event = generator.generate();
            let b_lep = &event.gen_b_from_top[1];
            assert!(b_lep.p4.pt >= 60.0 && b_lep.p4.pt < 120.0);
            assert!(event.gen_b_from_higgs[0].p4.pt >= 70.0 && event.gen_b_from_higgs[0].p4.pt < 140.0);
            assert!(event.gen_b_from_higgs[1].p4.pt >= 60.0 && event.gen_b_from_higgs[1].p4.pt < 120.0);
        }
    }

    #[test]
    fn test_w_quark_pair_mass_on_shell() {
        let mut generator = EventGenerator::new(19);
        for _ in 0..25 {
            let event = generator.generate();
            let pair = event.gen_w_quarks[0].p4 + event.gen_w_quarks[1].p4;
            assert!(pair.mass > 70.0 && pair.mass < 91.0, "pair mass {}", pair.mass);
        }
    }

    #[test]
    fn test_generated_events_interpret() {
        let config = AnalysisConfig::default();
        let mut generator = EventGenerator::new(42);
        let events = generator.generate_batch(40);

        let (outcomes, statistics) = interpret_batch(&events, &config, 2).unwrap();
        assert_eq!(outcomes.len(), 40);
        assert_eq!(statistics.n_processed, 40);
        // six-jet events sit squarely in the cat1 W window, seven-jet
        // events sometimes miss the tighter window and leave the boosted
        // selection
        assert!(statistics.n_passed >= 25);
        assert!(statistics.n_passed + statistics.n_outside_boosted >= 39);
        assert_eq!(statistics.n_quark_multiplicity, 0);
        // every surviving event keeps one jet per hadronic-top quark
        assert_eq!(statistics.n_triplet_recovered, statistics.n_passed);
    }
}
