use super::*;
use test_log::test;

fn sizes(list: &[(u32, u32)]) -> Vec<(usize, Size)> {
    list.iter()
        .enumerate()
        .map(|(i, &(w, h))| (i, Size::new(w, h)))
        .collect()
}

fn assert_no_overlap<K: std::fmt::Debug>(state: &PackingState<K>) {
    let placed = state.placements();
    for (i, a) in placed.iter().enumerate() {
        assert!(a.rect.fits_in(state.size()), "{:?} outside {:?}", a, state.size());
        for b in &placed[i + 1..] {
            assert!(!a.rect.intersects(&b.rect), "{:?} overlaps {:?}", a, b);
        }
    }
}

#[test]
fn three_rectangles_fit_trivial_bound() {
    let mut state = PackingState::default();
    let outcome = state.pack(&sizes(&[(10, 10), (20, 5), (5, 30)]), 8192).unwrap();

    let size = state.size();
    assert!(size.width <= 35 && size.height <= 30, "atlas {:?}", size);
    assert_eq!(outcome.placements.len(), 3);
    assert!(!outcome.repacked);
    assert!(outcome.grew);
    assert_no_overlap(&state);
}

#[test]
fn placements_follow_request_order() {
    let mut state = PackingState::default();
    let requests = sizes(&[(4, 4), (8, 2), (3, 9)]);
    let outcome = state.pack(&requests, 1024).unwrap();
    for ((id, size), placement) in requests.iter().zip(&outcome.placements) {
        assert_eq!(*id, placement.id);
        assert_eq!(*size, placement.rect.size());
    }
}

#[test]
fn resumable_pack_keeps_existing_positions() {
    let mut state = PackingState::with_size(Size::new(64, 64));
    state.pack(&sizes(&[(10, 10), (10, 10)]), 1024).unwrap();
    let before: Vec<_> = state.placements().to_vec();

    let more = vec![(2usize, Size::new(10, 10)), (3, Size::new(8, 8))];
    let outcome = state.pack(&more, 1024).unwrap();

    assert!(!outcome.repacked);
    assert!(!outcome.grew);
    for old in &before {
        assert_eq!(state.get(old.id), Some(old.rect));
    }
    assert_no_overlap(&state);
}

#[test]
fn overflow_triggers_full_repack() {
    let mut state = PackingState::default();
    state.pack(&sizes(&[(10, 10)]), 1024).unwrap();
    let size_before = state.size();

    let more: Vec<(usize, Size)> = (1..20).map(|i| (i, Size::new(7, 12))).collect();
    let outcome = state.pack(&more, 1024).unwrap();

    assert!(outcome.repacked);
    assert!(outcome.grew);
    assert!(state.size().width >= size_before.width);
    assert!(state.size().height >= size_before.height);
    assert_eq!(state.placements().len(), 20);
    assert_no_overlap(&state);
}

#[test]
fn superset_requests_never_shrink_the_atlas() {
    let mut state = PackingState::default();
    let mut requests = Vec::new();
    let mut last = Size::default();
    // Deterministic pseudo-random sizes.
    let mut seed = 12345u32;
    for i in 0..200usize {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let w = 1 + (seed >> 16) % 24;
        let h = 1 + (seed >> 8) % 31;
        requests.push((i, Size::new(w, h)));

        state.pack(&requests, 8192).unwrap();
        let size = state.size();
        assert!(size.width >= last.width && size.height >= last.height);
        last = size;
    }
    assert_eq!(state.placements().len(), 200);
    assert_no_overlap(&state);
}

#[test]
fn already_placed_ids_are_not_duplicated() {
    let mut state = PackingState::default();
    state.pack(&sizes(&[(5, 5)]), 64).unwrap();
    let rect = state.get(0);
    let outcome = state.pack(&[(0usize, Size::new(5, 5)), (0, Size::new(5, 5))], 64).unwrap();
    assert_eq!(state.placements().len(), 1);
    assert_eq!(outcome.placements[0].rect, rect.unwrap());
    assert_eq!(outcome.placements[1].rect, rect.unwrap());
}

#[test]
fn zero_sized_requests_take_no_space() {
    let mut state = PackingState::default();
    let outcome = state
        .pack(&[(' ', Size::new(0, 12)), ('a', Size::new(6, 6))], 64)
        .unwrap();
    assert_eq!(outcome.placements[0].rect, PixelRect::default());
    assert_eq!(state.placements().len(), 1);
    assert_eq!(state.get(' '), None);
}

#[test]
fn exceeding_max_size_fails_and_leaves_state_untouched() {
    let mut state = PackingState::default();
    state.pack(&sizes(&[(30, 30)]), 64).unwrap();
    let snapshot = state.clone();

    let too_many: Vec<(usize, Size)> = (1..10).map(|i| (i, Size::new(30, 30))).collect();
    let err = state.pack(&too_many, 64).unwrap_err();

    assert!(matches!(err, AtlasError::AtlasFull { max: 64, .. }));
    assert_eq!(state, snapshot);
}

#[test]
fn single_rect_larger_than_max_fails() {
    let mut state = PackingState::default();
    let err = state.pack(&[(0u8, Size::new(100, 4))], 64).unwrap_err();
    assert!(matches!(err, AtlasError::AtlasFull { .. }));
    assert!(state.is_empty());
}

#[test]
fn state_survives_serialization() {
    let mut state = PackingState::default();
    state.pack(&[('a', Size::new(3, 4)), ('b', Size::new(5, 2))], 64).unwrap();
    let json = serde_json::to_string(&state).unwrap();
    let mut restored: PackingState<char> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, state);

    let outcome = restored.pack(&[('c', Size::new(1, 1))], 64).unwrap();
    assert_eq!(restored.get('a'), state.get('a'));
    assert_eq!(outcome.placements.len(), 1);
}
