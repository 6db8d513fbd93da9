//! Replica deficit and destination selection.

use rand::Rng;

use crate::peer::{Peer, parse_capacity};
use crate::poll::TorrentHolding;

/// Sampling weight of a peer without an upload limit.
pub const DEFAULT_WEIGHT: u64 = 1;

/// Copies still missing for `holding` to reach `target_replicas`.
pub fn deficit(holding: &TorrentHolding, target_replicas: usize) -> usize {
    target_replicas.saturating_sub(holding.holder_count())
}

/// Picks destinations for `holding` using the thread-local RNG.
///
/// See [`plan_with_rng`].
pub fn plan<'a>(
    peers: &'a [Peer],
    holding: &TorrentHolding,
    target_replicas: usize,
) -> Vec<&'a Peer> {
    plan_with_rng(peers, holding, target_replicas, &mut rand::rng())
}

/// Picks up to `deficit` destinations by capacity-weighted sampling without
/// replacement.
///
/// A peer is a candidate when it is enabled, does not hold the torrent
/// (same host and port), its storage cap fits the torrent and its weight is
/// nonzero. Returns fewer destinations than the deficit when the candidate
/// pool is smaller.
pub fn plan_with_rng<'a, R>(
    peers: &'a [Peer],
    holding: &TorrentHolding,
    target_replicas: usize,
    rng: &mut R,
) -> Vec<&'a Peer>
where
    R: Rng,
{
    let wanted = deficit(holding, target_replicas);
    if wanted == 0 {
        return Vec::new();
    }

    let mut pool: Vec<(&Peer, u64)> = peers
        .iter()
        .filter(|peer| !peer.disabled)
        .filter(|peer| !holding.holders.iter().any(|(key, _)| peer.is_endpoint(key)))
        .filter(|peer| fits_storage(peer, holding.total_size))
        .map(|peer| (peer, weight_of(peer)))
        .filter(|(_, weight)| *weight > 0)
        .collect();

    let draws = wanted.min(pool.len());
    let mut chosen = Vec::with_capacity(draws);
    for _ in 0..draws {
        let total: u128 = pool.iter().map(|(_, weight)| u128::from(*weight)).sum();
        let mut ticket = rng.random_range(0..total);

        let mut picked = pool.len() - 1;
        for (index, (_, weight)) in pool.iter().enumerate() {
            let weight = u128::from(*weight);
            if ticket < weight {
                picked = index;
                break;
            }
            ticket -= weight;
        }
        chosen.push(pool.swap_remove(picked).0);
    }

    tracing::debug!(
        "{}: {} of {} wanted destinations chosen",
        holding.name,
        chosen.len(),
        wanted
    );
    chosen
}

/// Storage caps are soft: a missing or unreadable cap never excludes a peer.
fn fits_storage(peer: &Peer, total_size: u64) -> bool {
    let Some(literal) = &peer.storage_cap else {
        return true;
    };
    match parse_capacity(literal) {
        Some(cap) => cap >= total_size,
        None => {
            tracing::warn!(
                "Peer {} has unreadable storage cap '{}', not limiting it",
                peer.nickname,
                literal
            );
            true
        }
    }
}

fn weight_of(peer: &Peer) -> u64 {
    let Some(literal) = &peer.upload_limit else {
        return DEFAULT_WEIGHT;
    };
    parse_capacity(literal).unwrap_or_else(|| {
        tracing::warn!(
            "Peer {} has unreadable upload limit '{}', using weight {}",
            peer.nickname,
            literal,
            DEFAULT_WEIGHT
        );
        DEFAULT_WEIGHT
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::peer::{ClientKind, PeerKey};

    fn peer(host: &str, port: u16) -> Peer {
        Peer::new(ClientKind::Transmission, host, port)
    }

    fn holding(size: u64, holders: &[&Peer]) -> TorrentHolding {
        TorrentHolding {
            info_hash: "ab".repeat(20),
            name: "ubuntu.iso".to_string(),
            total_size: size,
            holders: holders.iter().map(|peer| (peer.key(), 1.0)).collect(),
        }
    }

    #[test]
    fn test_satisfied_torrent_needs_nothing() {
        let a = peer("a", 1);
        let b = peer("b", 1);
        let peers = vec![a.clone(), b.clone(), peer("c", 1)];
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert!(plan_with_rng(&peers, &holding(10, &[&a, &b]), 2, &mut rng).is_empty());
        assert_eq!(deficit(&holding(10, &[&a, &b]), 2), 0);
        assert_eq!(deficit(&holding(10, &[&a]), 3), 2);
    }

    #[test]
    fn test_two_distinct_non_holders_for_deficit_of_two() {
        let holder = peer("a", 1);
        let peers = vec![
            holder.clone(),
            peer("b", 1),
            peer("c", 1),
            peer("d", 1),
            peer("e", 1),
        ];
        let torrent = holding(10, &[&holder]);

        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let chosen = plan_with_rng(&peers, &torrent, 3, &mut rng);

            assert_eq!(chosen.len(), 2);
            let keys: HashSet<PeerKey> = chosen.iter().map(|peer| peer.key()).collect();
            assert_eq!(keys.len(), 2);
            assert!(!keys.contains(&holder.key()));
        }
    }

    #[test]
    fn test_same_host_other_port_stays_eligible() {
        let holder = peer("box", 9091);
        let sibling = peer("box", 9092);
        let peers = vec![holder.clone(), sibling.clone()];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let chosen = plan_with_rng(&peers, &holding(10, &[&holder]), 2, &mut rng);
        assert_eq!(chosen, vec![&sibling]);
    }

    #[test]
    fn test_small_pool_yields_fewer_destinations() {
        let holder = peer("a", 1);
        let peers = vec![holder.clone(), peer("b", 1)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let chosen = plan_with_rng(&peers, &holding(10, &[&holder]), 5, &mut rng);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].host, "b");
    }

    #[test]
    fn test_storage_cap_excludes_small_peers_only() {
        let small = peer("small", 1).with_storage_cap("1K");
        let large = peer("large", 1).with_storage_cap("1M");
        let unlimited = peer("unlimited", 1);
        let garbled = peer("garbled", 1).with_storage_cap("lots");
        let peers = vec![small, large, unlimited, garbled];
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let chosen = plan_with_rng(&peers, &holding(4096, &[]), 10, &mut rng);
        let hosts: HashSet<&str> = chosen.iter().map(|peer| peer.host.as_str()).collect();
        assert_eq!(hosts, HashSet::from(["large", "unlimited", "garbled"]));
    }

    #[test]
    fn test_disabled_and_zero_weight_peers_are_never_chosen() {
        let mut disabled = peer("off", 1);
        disabled.disabled = true;
        let zero = peer("zero", 1).with_upload_limit("0");
        let live = peer("live", 1).with_upload_limit("bogus");
        let peers = vec![disabled, zero, live];
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let chosen = plan_with_rng(&peers, &holding(1, &[]), 3, &mut rng);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].host, "live");
    }

    #[test]
    fn test_heavier_peers_are_picked_more_often() {
        let heavy = peer("heavy", 1).with_upload_limit("9M");
        let light = peer("light", 1).with_upload_limit("1M");
        let peers = vec![light, heavy];
        let torrent = holding(1, &[]);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let heavy_first = (0..2000)
            .filter(|_| plan_with_rng(&peers, &torrent, 1, &mut rng)[0].host == "heavy")
            .count();
        // Expected 1800 of 2000.
        assert!(
            (1650..=1950).contains(&heavy_first),
            "heavy first {heavy_first} times"
        );
    }
}
