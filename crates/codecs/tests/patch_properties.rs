//! Patches produced by the byte-wise backends reconstruct their input.

use codecs::bsdiff::{apply_patch, decode_patch, Bsdiff, PatchFormat, ZstdBsdiff};
use codecs::ByteDiffer;
use proptest::prelude::*;

fn mutated(base: &[u8], edits: &[(usize, u8)], cut: usize) -> Vec<u8> {
    let mut data = base.to_vec();
    for &(at, value) in edits {
        let index = at % data.len();
        data[index] = value;
    }
    data.truncate(data.len().saturating_sub(cut % 64).max(1));
    data
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn bsdiff_round_trips(
        base in proptest::collection::vec(any::<u8>(), 64..2048),
        edits in proptest::collection::vec((any::<usize>(), any::<u8>()), 0..16),
        cut in any::<usize>(),
    ) {
        let new = mutated(&base, &edits, cut);
        let patch = Bsdiff.diff(&base, &new).expect("diff");
        prop_assert_eq!(apply_patch(&base, &patch.data).expect("apply"), new);
    }

    #[test]
    fn zstd_bsdiff_round_trips(
        base in proptest::collection::vec(any::<u8>(), 64..2048),
        edits in proptest::collection::vec((any::<usize>(), any::<u8>()), 0..16),
    ) {
        let new = mutated(&base, &edits, 0);
        let patch = ZstdBsdiff::with_level(3).diff(&base, &new).expect("diff");
        let decoded = decode_patch(&patch.data).expect("decode");
        prop_assert_eq!(decoded.format, PatchFormat::ZstdBsdiff);
        prop_assert_eq!(&decoded.controls, &patch.controls);
        prop_assert_eq!(decoded.apply(&base).expect("apply"), new);
    }
}

#[test]
fn identical_inputs_round_trip() {
    let data: Vec<u8> = (0..16_384u32).map(|i| (i % 253) as u8).collect();
    let patch = Bsdiff.diff(&data, &data).expect("diff");
    let produced: u64 = patch
        .controls
        .iter()
        .map(|entry| entry.diff_len + entry.extra_len)
        .sum();
    assert_eq!(produced, data.len() as u64);
    assert_eq!(apply_patch(&data, &patch.data).expect("apply"), data);
}
