use super::*;

#[test]
fn frame_range_contains_boundaries() {
    let r = FrameRange::new(FrameIndex(2), FrameIndex(5)).unwrap();
    assert!(!r.contains(FrameIndex(1)));
    assert!(r.contains(FrameIndex(2)));
    assert!(r.contains(FrameIndex(4)));
    assert!(!r.contains(FrameIndex(5)));
}

#[test]
fn frame_range_rejects_inverted_bounds() {
    assert!(FrameRange::new(FrameIndex(3), FrameIndex(2)).is_err());
}

#[test]
fn empty_range_has_no_frames() {
    let r = FrameRange::empty(FrameIndex(7));
    assert!(r.is_empty());
    assert_eq!(r.len_frames(), 0);
    assert_eq!(r.iter().count(), 0);
}

#[test]
fn iter_yields_increasing_indices() {
    let r = FrameRange::new(FrameIndex(3), FrameIndex(6)).unwrap();
    let got: Vec<u64> = r.iter().map(|f| f.0).collect();
    assert_eq!(got, vec![3, 4, 5]);
    assert_eq!(r.to_string(), "[3, 6)");
}

#[test]
fn owner_is_worker_zero() {
    assert!(WorkerId(0).is_owner());
    assert!(!WorkerId(1).is_owner());
}
