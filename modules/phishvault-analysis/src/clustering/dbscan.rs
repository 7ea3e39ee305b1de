//! DBSCAN over scan feature vectors with a composite distance:
//! visual fingerprint, hosting subnet and DOM structure.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use phishvault_common::{hamming, FINGERPRINT_BITS};

const VISUAL_WEIGHT: f64 = 0.6;
const NETWORK_WEIGHT: f64 = 0.2;
const STRUCTURE_WEIGHT: f64 = 0.2;

/// Clustering unit derived from one scan artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub id: String,
    pub visual_hash: u64,
    /// Empty when unknown.
    pub ip: String,
    pub dom_tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// 1-based, in the order clusters were opened.
    pub id: usize,
    pub members: Vec<FeatureVector>,
}

impl Cluster {
    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanParams {
    pub epsilon: f64,
    /// Neighborhood size, counting the point itself, needed for a core point.
    pub min_points: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            epsilon: 0.3,
            min_points: 2,
        }
    }
}

/// True for two dotted-quad addresses sharing their first three octets.
fn same_subnet_24(a: &str, b: &str) -> bool {
    let pa: Vec<&str> = a.split('.').collect();
    let pb: Vec<&str> = b.split('.').collect();
    pa.len() == 4 && pb.len() == 4 && pa[..3] == pb[..3]
}

fn network_distance(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }
    if a == b || same_subnet_24(a, b) {
        0.0
    } else {
        1.0
    }
}

/// 1 - |A ∩ B| / |A ∪ B| over token sets; two empty sets are identical.
pub fn jaccard_distance(a: &[String], b: &[String]) -> f64 {
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    1.0 - intersection as f64 / union as f64
}

/// Campaign distance in [0, 1]; 0 means indistinguishable.
pub fn distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let visual = f64::from(hamming(a.visual_hash, b.visual_hash)) / f64::from(FINGERPRINT_BITS);
    VISUAL_WEIGHT * visual
        + NETWORK_WEIGHT * network_distance(&a.ip, &b.ip)
        + STRUCTURE_WEIGHT * jaccard_distance(&a.dom_tokens, &b.dom_tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Unvisited,
    Noise,
    Member,
}

/// Indices within `epsilon` of `center`, the center included.
fn region(points: &[FeatureVector], center: usize, epsilon: f64) -> Vec<usize> {
    (0..points.len())
        .filter(|&i| i == center || distance(&points[center], &points[i]) <= epsilon)
        .collect()
}

/// Partition `points` into clusters. Points reachable from no core point are
/// noise and appear in no cluster. Clusters are seeded in input order and a
/// point never moves once it joins one.
pub fn run_dbscan(points: &[FeatureVector], params: &DbscanParams) -> Vec<Cluster> {
    let mut state = vec![State::Unvisited; points.len()];
    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if state[seed] != State::Unvisited {
            continue;
        }
        let neighbors = region(points, seed, params.epsilon);
        if neighbors.len() < params.min_points {
            state[seed] = State::Noise;
            continue;
        }

        state[seed] = State::Member;
        let mut members = vec![seed];
        let mut frontier: VecDeque<usize> = neighbors.into_iter().filter(|&i| i != seed).collect();

        while let Some(p) = frontier.pop_front() {
            match state[p] {
                State::Member => continue,
                // Border point: joins, but does not expand.
                State::Noise => {
                    state[p] = State::Member;
                    members.push(p);
                }
                State::Unvisited => {
                    state[p] = State::Member;
                    members.push(p);
                    let reach = region(points, p, params.epsilon);
                    if reach.len() >= params.min_points {
                        frontier.extend(reach.into_iter().filter(|&i| state[i] != State::Member));
                    }
                }
            }
        }

        clusters.push(Cluster {
            id: clusters.len() + 1,
            members: members.into_iter().map(|i| points[i].clone()).collect(),
        });
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(id: &str, ip: &str, hash: u64, tokens: &[&str]) -> FeatureVector {
        FeatureVector {
            id: id.to_string(),
            visual_hash: hash,
            ip: ip.to_string(),
            dom_tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn three_point_case_yields_one_pair_and_noise() {
        let points = vec![
            fv("A", "192.168.1.5", 0x1234_5678_1234_5678, &["login", "password"]),
            fv("B", "192.168.1.20", 0x1234_5678_1234_5679, &["login", "password"]),
            fv("C", "10.0.0.1", 0xFFFF_FFFF_FFFF_FFFF, &["blog", "post"]),
        ];
        let clusters = run_dbscan(&points, &DbscanParams::default());

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, 1);
        assert_eq!(clusters[0].member_ids(), vec!["A", "B"]);
    }

    #[test]
    fn distance_components() {
        let a = fv("a", "10.1.2.3", 0, &["form", "input"]);
        assert_eq!(distance(&a, &a), 0.0);

        // Same /24, same tokens, all 64 bits flipped.
        let b = fv("b", "10.1.2.99", u64::MAX, &["form", "input"]);
        assert!((distance(&a, &b) - 0.6).abs() < 1e-12);

        // Different network, disjoint tokens, same hash.
        let c = fv("c", "172.16.0.1", 0, &["table"]);
        assert!((distance(&a, &c) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn unknown_ips_never_share_a_network() {
        assert_eq!(network_distance("", ""), 1.0);
        assert_eq!(network_distance("2001:db8::1", "2001:db8::1"), 0.0);
        assert_eq!(network_distance("2001:db8::1", "2001:db8::2"), 1.0);
    }

    #[test]
    fn jaccard_treats_tokens_as_sets() {
        let a = vec!["x".to_string(), "x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "z".to_string()];
        assert!((jaccard_distance(&a, &b) - (1.0 - 1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(jaccard_distance(&[], &[]), 0.0);
    }

    #[test]
    fn density_chain_joins_through_core_points() {
        // Each neighbor differs by 8 more bits: 8 bits = 0.075 apart, 16 = 0.15,
        // 24 = 0.225, 32 = 0.3, 40 = 0.375.
        let points: Vec<FeatureVector> = (0..5)
            .map(|i| fv(&format!("p{i}"), "10.0.0.1", (1u64 << (8 * i)) - 1, &["form"]))
            .collect();
        let clusters = run_dbscan(&points, &DbscanParams { epsilon: 0.1, min_points: 2 });
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 5);
    }

    #[test]
    fn members_are_never_reassigned() {
        // A-B close, C-D close, B and C far: two clusters, each point once.
        let points = vec![
            fv("A", "10.0.0.1", 0, &["f"]),
            fv("B", "10.0.0.2", 0b1, &["f"]),
            fv("C", "10.9.9.1", u64::MAX, &["g"]),
            fv("D", "10.9.9.2", u64::MAX - 1, &["g"]),
        ];
        let clusters = run_dbscan(&points, &DbscanParams::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].member_ids(), vec!["A", "B"]);
        assert_eq!(clusters[1].member_ids(), vec!["C", "D"]);
        assert_eq!(clusters[1].id, 2);
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(run_dbscan(&[], &DbscanParams::default()).is_empty());
    }

    #[test]
    fn min_points_one_makes_every_point_a_cluster() {
        let points = vec![fv("A", "1.1.1.1", 0, &[]), fv("B", "9.9.9.9", u64::MAX, &["x"])];
        let clusters = run_dbscan(&points, &DbscanParams { epsilon: 0.3, min_points: 1 });
        assert_eq!(clusters.len(), 2);
    }
}
