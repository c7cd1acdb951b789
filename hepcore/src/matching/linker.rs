use nalgebra::DMatrix;

use crate::kinematics::four_momentum::Kinematic;
use crate::matching::annotation::{MatchTable, PoolTag};

/// One accepted geometric link between element `index_a` of the first
/// collection and element `index_b` of the second, at cone distance
/// `delta_r`. Indices always refer to the collections as passed by the
/// caller, never to shrunken working copies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    pub index_a: usize,
    pub index_b: usize,
    pub delta_r: f64,
}

/// Finds the single closest pair across two collections.
///
/// # Arguments
///
/// * `set_a` - First collection.
/// * `set_b` - Second collection.
/// * `max_delta_r` - Acceptance cut, only distances strictly below qualify.
///
/// # Returns
///
/// The global minimum of the full pairwise distance matrix as a [`Link`],
/// or `None` when no pair lies strictly below the cut (empty collections
/// included). Ties are broken by first occurrence in a row-major scan, so
/// the result is deterministic for identical input ordering. The inputs are
/// never modified.
///
/// # Examples
///
/// ```
/// use hepcore::kinematics::four_momentum::FourMomentum;
/// use hepcore::matching::linker::link_closest;
///
/// let quarks = vec![FourMomentum::new(80.0, 0.0, 0.0, 0.0)];
/// let jets = vec![
///     FourMomentum::new(75.0, 1.5, 0.0, 10.0),
///     FourMomentum::new(90.0, 0.1, 0.0, 8.0),
/// ];
/// let link = link_closest(&quarks, &jets, 0.3).unwrap();
/// assert_eq!((link.index_a, link.index_b), (0, 1));
/// assert!((link.delta_r - 0.1).abs() < 1e-9);
/// ```
pub fn link_closest<A: Kinematic, B: Kinematic>(set_a: &[A], set_b: &[B], max_delta_r: f64) -> Option<Link> {
    let all_a: Vec<usize> = (0..set_a.len()).collect();
    let all_b: Vec<usize> = (0..set_b.len()).collect();
    closest_among(set_a, &all_a, set_b, &all_b, max_delta_r)
}

/// Row-major global-minimum scan restricted to the given index subsets.
fn closest_among<A: Kinematic, B: Kinematic>(
    set_a: &[A],
    idx_a: &[usize],
    set_b: &[B],
    idx_b: &[usize],
    max_delta_r: f64,
) -> Option<Link> {
    if idx_a.is_empty() || idx_b.is_empty() {
        return None;
    }

    let dist = DMatrix::from_fn(idx_a.len(), idx_b.len(), |i, j| {
        set_a[idx_a[i]].delta_r_to(&set_b[idx_b[j]])
    });

    let mut best_d = f64::INFINITY;
    let mut best: Option<(usize, usize)> = None;
    for i in 0..dist.nrows() {
        for j in 0..dist.ncols() {
            let d = dist[(i, j)];
            // strict on both: the cut excludes the boundary, equal distances
            // keep the earlier row-major hit
            if d < max_delta_r && d < best_d {
                best_d = d;
                best = Some((i, j));
            }
        }
    }

    best.map(|(i, j)| Link {
        index_a: idx_a[i],
        index_b: idx_b[j],
        delta_r: best_d,
    })
}

/// Greedily links as many pairs as possible and annotates both sides.
///
/// # Arguments
///
/// * `set_a`, `pool_a` - First collection and the pool tag its annotations
///   are filed under.
/// * `set_b`, `pool_b` - Second collection and its pool tag.
/// * `max_delta_r` - Acceptance cut handed to every round.
/// * `table` - Match table receiving one mutual annotation per accepted
///   link.
///
/// # Returns
///
/// The number of accepted links. Runs at most `min(|A|, |B|)` rounds, each
/// round accepts the current global-minimum pair and removes both elements
/// from the working copies; the first round without an acceptable pair ends
/// the scan. Annotations carry original indices.
pub fn match_all<A: Kinematic, B: Kinematic>(
    set_a: &[A],
    pool_a: PoolTag,
    set_b: &[B],
    pool_b: PoolTag,
    max_delta_r: f64,
    table: &mut MatchTable,
) -> usize {
    let mut remaining_a: Vec<usize> = (0..set_a.len()).collect();
    let mut remaining_b: Vec<usize> = (0..set_b.len()).collect();
    let rounds = remaining_a.len().min(remaining_b.len());

    let mut n_links = 0;
    for _ in 0..rounds {
        let link = match closest_among(set_a, &remaining_a, set_b, &remaining_b, max_delta_r) {
            Some(link) => link,
            None => break,
        };
        table.insert_pair(pool_a, link.index_a, pool_b, link.index_b, link.delta_r);
        remaining_a.retain(|&i| i != link.index_a);
        remaining_b.retain(|&j| j != link.index_b);
        n_links += 1;
    }
    n_links
}

/// Links the two closest pairs across two collections.
///
/// The best pair is accepted first, both elements are removed from working
/// copies, then the best remaining pair is accepted. Fails as a whole when
/// either round finds nothing below the cut, partial results are never
/// returned. Links come back in acceptance order with original indices.
pub fn link_two_closest<A: Kinematic, B: Kinematic>(
    set_a: &[A],
    set_b: &[B],
    max_delta_r: f64,
) -> Option<(Link, Link)> {
    let mut remaining_a: Vec<usize> = (0..set_a.len()).collect();
    let mut remaining_b: Vec<usize> = (0..set_b.len()).collect();

    let first = closest_among(set_a, &remaining_a, set_b, &remaining_b, max_delta_r)?;
    remaining_a.retain(|&i| i != first.index_a);
    remaining_b.retain(|&j| j != first.index_b);

    let second = closest_among(set_a, &remaining_a, set_b, &remaining_b, max_delta_r)?;
    Some((first, second))
}

/// Diagnostic three-round variant of [`link_two_closest`].
///
/// Runs three removal rounds on working copies and reports either all three
/// links or, on failure, how many rounds had succeeded before the scan ran
/// dry. Useful when checking whether a full top-quark triplet can be
/// recovered from a jet collection.
pub fn link_three_closest<A: Kinematic, B: Kinematic>(
    set_a: &[A],
    set_b: &[B],
    max_delta_r: f64,
) -> Result<[Link; 3], usize> {
    let mut remaining_a: Vec<usize> = (0..set_a.len()).collect();
    let mut remaining_b: Vec<usize> = (0..set_b.len()).collect();

    let mut links: Vec<Link> = Vec::with_capacity(3);
    for round in 0..3 {
        match closest_among(set_a, &remaining_a, set_b, &remaining_b, max_delta_r) {
            Some(link) => {
                remaining_a.retain(|&i| i != link.index_a);
                remaining_b.retain(|&j| j != link.index_b);
                links.push(link);
            }
            None => return Err(round),
        }
    }
    Ok([links[0], links[1], links[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::four_momentum::FourMomentum;

    fn at(eta: f64, phi: f64) -> FourMomentum {
        FourMomentum::new(50.0, eta, phi, 0.0)
    }

    #[test]
    fn test_link_closest_empty_inputs() {
        let empty: Vec<FourMomentum> = Vec::new();
        let some = vec![at(0.0, 0.0)];
        assert!(link_closest(&empty, &some, 0.3).is_none());
        assert!(link_closest(&some, &empty, 0.3).is_none());
        assert!(link_closest(&empty, &empty, 0.3).is_none());
    }

    #[test]
    fn test_link_closest_cut_is_strict() {
        let a = vec![at(0.0, 0.0)];
        let b = vec![at(0.5, 0.0)];
        assert!(link_closest(&a, &b, 0.5).is_none());
        assert!(link_closest(&a, &b, 0.5001).is_some());
    }

    #[test]
    fn test_link_closest_row_major_tie_break() {
        // every pairwise distance is exactly 0.5, the first row-major
        // entry must win
        let a = vec![at(0.0, 0.0), at(1.0, 0.0)];
        let b = vec![at(0.5, 0.0), at(0.5, 0.0)];
        let link = link_closest(&a, &b, 1.0).unwrap();
        assert_eq!((link.index_a, link.index_b), (0, 0));
    }

    #[test]
    fn test_link_closest_is_deterministic() {
        let a = vec![at(0.1, 0.2), at(-0.7, 1.1), at(2.0, -2.0)];
        let b = vec![at(0.3, 0.2), at(-0.5, 1.0), at(1.9, -2.1)];
        let first = link_closest(&a, &b, 0.5).unwrap();
        let second = link_closest(&a, &b, 0.5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_match_all_annotates_original_indices() {
        let subjets = vec![at(0.0, 0.0), at(1.0, 0.0)];
        let bjets = vec![at(0.03, 0.0), at(1.02, 0.0)];
        let mut table = MatchTable::new();

        let n = match_all(&subjets, PoolTag::Subjet, &bjets, PoolTag::BJet, 0.3, &mut table);
        assert_eq!(n, 2);

        let first = table.get(PoolTag::Subjet, 1, PoolTag::BJet).unwrap();
        assert_eq!(first.partner, 1);
        assert!((first.delta_r - 0.02).abs() < 1e-9);
        let back = table.get(PoolTag::BJet, 0, PoolTag::Subjet).unwrap();
        assert_eq!(back.partner, 0);
    }

    #[test]
    fn test_match_all_stops_at_first_failure() {
        let a = vec![at(0.0, 0.0), at(4.0, 0.0)];
        let b = vec![at(0.1, 0.0), at(-4.0, 0.0)];
        let mut table = MatchTable::new();

        let n = match_all(&a, PoolTag::Subjet, &b, PoolTag::BJet, 0.3, &mut table);
        assert_eq!(n, 1);
        assert_eq!(table.count(PoolTag::Subjet, PoolTag::BJet), 1);
        assert!(table.get(PoolTag::Subjet, 1, PoolTag::BJet).is_none());
    }

    #[test]
    fn test_match_all_bounded_by_smaller_collection() {
        let a = vec![at(0.0, 0.0), at(0.5, 0.0), at(1.0, 0.0)];
        let b = vec![at(0.01, 0.0)];
        let mut table = MatchTable::new();

        let n = match_all(&a, PoolTag::Jet, &b, PoolTag::BQuark, 5.0, &mut table);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_match_all_identical_runs_agree() {
        let a = vec![at(0.1, 0.0), at(0.9, 2.0), at(-1.2, -0.4)];
        let b = vec![at(0.2, 0.1), at(1.0, 1.9), at(-1.0, -0.5), at(3.0, 0.0)];

        let mut table_1 = MatchTable::new();
        let mut table_2 = MatchTable::new();
        let n_1 = match_all(&a, PoolTag::Jet, &b, PoolTag::BQuark, 0.5, &mut table_1);
        let n_2 = match_all(&a, PoolTag::Jet, &b, PoolTag::BQuark, 0.5, &mut table_2);

        assert_eq!(n_1, n_2);
        for i in 0..a.len() {
            let r_1 = table_1.get(PoolTag::Jet, i, PoolTag::BQuark).map(|r| r.partner);
            let r_2 = table_2.get(PoolTag::Jet, i, PoolTag::BQuark).map(|r| r.partner);
            assert_eq!(r_1, r_2);
        }
    }

    #[test]
    fn test_link_two_closest_removes_matched_elements() {
        let quarks = vec![at(0.0, 0.0), at(1.0, 0.0)];
        let jets = vec![at(0.1, 0.0), at(1.05, 0.0), at(5.0, 0.0)];

        let (first, second) = link_two_closest(&quarks, &jets, 0.3).unwrap();
        assert_eq!((first.index_a, first.index_b), (1, 1));
        assert_eq!((second.index_a, second.index_b), (0, 0));
    }

    #[test]
    fn test_link_two_closest_fails_as_a_whole() {
        // only one jet in range of anything, the second round must sink
        // the whole call
        let quarks = vec![at(0.0, 0.0), at(0.2, 0.0)];
        let jets = vec![at(0.05, 0.0), at(9.0, 0.0)];
        assert!(link_two_closest(&quarks, &jets, 0.3).is_none());
    }

    #[test]
    fn test_link_three_closest_reports_failing_round() {
        let a = vec![at(0.0, 0.0), at(1.0, 0.0), at(2.0, 0.0)];
        let b = vec![at(0.05, 0.0), at(1.05, 0.0), at(8.0, 0.0)];
        assert_eq!(link_three_closest(&a, &b, 0.3), Err(2));

        let b_full = vec![at(0.05, 0.0), at(1.05, 0.0), at(2.05, 0.0)];
        let links = link_three_closest(&a, &b_full, 0.3).unwrap();
        assert_eq!(links.len(), 3);
    }
}
