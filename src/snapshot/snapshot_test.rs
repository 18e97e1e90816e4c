use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use super::*;
use crate::RestoreError;
use crate::StorageError;

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap()
}

fn chain(
    created: i64,
    full_revision: u64,
    deltas: &[(u64, u64)],
) -> Vec<Snapshot> {
    let full = Snapshot::full(full_revision, at(created));
    let mut out = vec![full.clone()];
    for (i, (start, last)) in deltas.iter().enumerate() {
        out.push(Snapshot::delta(&full, *start, *last, at(created + 1000 * (i as i64 + 1))));
    }
    out
}

#[test]
fn test_full_snapshot_key_layout() {
    let s = Snapshot::full(30, at(1_700_000_000_123));
    assert_eq!(s.chain_dir(), "Backup-1700000000123");
    assert_eq!(s.name(), "Full-00000000-00000030-1700000000123");
    assert_eq!(s.key(), "Backup-1700000000123/Full-00000000-00000030-1700000000123");
}

#[test]
fn test_delta_snapshot_key_layout() {
    let full = Snapshot::full(30, at(1_000));
    let delta = Snapshot::delta(&full, 31, 42, at(5_000)).with_compression(true);
    assert_eq!(delta.key(), "Backup-1000/Incr-00000031-00000042-5000.gz");
}

#[test]
fn test_key_round_trip_keeps_flags() {
    let full = Snapshot::full(7, at(1_000)).with_compression(true).with_final(true);
    assert_eq!(full.name(), "Full-00000000-00000007-1000.gz.final");

    let parsed = Snapshot::from_key(&full.key()).unwrap();
    assert_eq!(parsed, full);
    assert!(parsed.compressed);
    assert!(parsed.is_final);
}

#[test]
fn test_from_key_tolerates_backend_prefix() {
    let full = Snapshot::full(9, at(2_000));
    let parsed = Snapshot::from_key(&format!("bucket/v2/{}", full.key())).unwrap();
    assert_eq!(parsed, full);
}

#[test]
fn test_delta_cannot_be_final() {
    let full = Snapshot::full(1, at(1_000));
    let delta = Snapshot::delta(&full, 2, 3, at(2_000)).with_final(true);
    assert!(!delta.is_final);

    let forged = "Backup-1000/Incr-00000002-00000003-2000.final";
    assert!(matches!(
        Snapshot::from_key(forged),
        Err(StorageError::InvalidSnapshotKey(_))
    ));
}

#[test]
fn test_from_key_rejects_malformed_keys() {
    for key in [
        "Full-00000000-00000001-1000",
        "Backup-x/Full-00000000-00000001-1000",
        "Backup-1000/Snap-00000000-00000001-1000",
        "Backup-1000/Incr-00000009-00000001-2000",
        "Backup-1000/Full-00000005-00000009-1000",
        "Backup-1000/Full-00000000-00000009-2000",
        "Backup-1000/Incr-1-2",
        "Backup-1000/temp-Incr-00000001-00000002-2000",
    ] {
        assert!(Snapshot::from_key(key).is_err(), "{key} should be rejected");
    }
}

#[test]
fn test_sort_puts_full_before_deltas_within_chain() {
    let mut all = chain(5_000, 10, &[(11, 12), (13, 20)]);
    all.extend(chain(1_000, 3, &[(4, 4)]));
    all.reverse();

    sort_snapshots(&mut all);

    let keys: Vec<String> = all.iter().map(|s| s.name()).collect();
    assert_eq!(
        keys,
        vec![
            "Full-00000000-00000003-1000",
            "Incr-00000004-00000004-2000",
            "Full-00000000-00000010-5000",
            "Incr-00000011-00000012-6000",
            "Incr-00000013-00000020-7000",
        ]
    );
}

#[test]
fn test_group_into_chains_collects_orphans() {
    let mut all = chain(1_000, 3, &[(4, 6)]);
    all.extend(chain(9_000, 10, &[(11, 11)]));
    // Delta whose full snapshot was already removed
    let gone = Snapshot::full(1, at(500));
    all.push(Snapshot::delta(&gone, 2, 2, at(600)));

    let set = group_into_chains(&all);
    assert_eq!(set.chains.len(), 2);
    assert_eq!(set.chains[0].created_on(), at(1_000));
    assert_eq!(set.chains[1].deltas.len(), 1);
    assert_eq!(set.orphans.len(), 1);
    assert_eq!(set.orphans[0].chain_created_on, at(500));
}

#[test]
fn test_latest_chain_picks_newest_full() {
    let mut all = chain(1_000, 3, &[(4, 6)]);
    all.extend(chain(9_000, 10, &[(11, 11), (12, 15)]));

    let latest = latest_chain(&all).unwrap();
    assert_eq!(latest.full.last_revision, 10);
    assert_eq!(latest.last_revision(), 15);
    assert_eq!(latest.snapshots().count(), 3);
    assert!(latest.validate().is_ok());

    assert!(latest_chain(&[]).is_none());
}

#[test]
fn test_chain_validate_detects_gap() {
    let all = chain(1_000, 3, &[(4, 6), (8, 9)]);
    let latest = latest_chain(&all).unwrap();
    match latest.validate() {
        Err(RestoreError::ChainGap {
            previous_revision,
            next_start,
            ..
        }) => {
            assert_eq!(previous_revision, 6);
            assert_eq!(next_start, 8);
        }
        other => panic!("expected gap, got {other:?}"),
    }
}

#[test]
fn test_full_snapshot_truncates_to_millis() {
    let t = at(1_000) + Duration::microseconds(750);
    let s = Snapshot::full(1, t);
    assert_eq!(s.created_on, at(1_000));
    assert_eq!(Snapshot::from_key(&s.key()).unwrap(), s);
}
