use super::*;

fn ranges(plan: &FramePlan) -> Vec<(u64, u64)> {
    plan.partitions()
        .into_iter()
        .map(|(_, r)| (r.start.0, r.end.0))
        .collect()
}

#[test]
fn last_worker_absorbs_remainder() {
    let plan = FramePlan::new(10, 3).unwrap();
    assert_eq!(ranges(&plan), vec![(0, 3), (3, 6), (6, 10)]);
}

#[test]
fn single_worker_owns_everything() {
    let plan = FramePlan::new(96, 1).unwrap();
    assert_eq!(plan.partition(WorkerId(0)).unwrap(), plan.full_range());
}

#[test]
fn partitions_cover_every_frame_exactly_once() {
    for total in 2..=40u64 {
        for workers in 1..=12usize {
            let plan = FramePlan::new(total, workers).unwrap();
            let mut seen = vec![0u32; total as usize];
            let mut prev_end = 0u64;
            for (_, r) in plan.partitions() {
                if !r.is_empty() {
                    assert_eq!(r.start.0, prev_end, "gap at total={total} workers={workers}");
                    prev_end = r.end.0;
                }
                for f in r.iter() {
                    seen[f.0 as usize] += 1;
                }
            }
            assert_eq!(prev_end, total);
            assert!(
                seen.iter().all(|&n| n == 1),
                "total={total} workers={workers} seen={seen:?}"
            );
        }
    }
}

#[test]
fn surplus_workers_get_empty_partitions() {
    let plan = FramePlan::new(3, 5).unwrap();
    let parts = plan.partitions();
    assert_eq!(parts.len(), 5);
    let non_empty: Vec<_> = parts.iter().filter(|(_, r)| !r.is_empty()).collect();
    assert_eq!(non_empty.len(), 1);
    assert_eq!(non_empty[0].0, WorkerId(4));
    assert_eq!(non_empty[0].1.len_frames(), 3);
}

#[test]
fn rejects_degenerate_inputs() {
    assert!(FramePlan::new(1, 1).is_err());
    assert!(FramePlan::new(0, 1).is_err());
    assert!(FramePlan::new(10, 0).is_err());
    let plan = FramePlan::new(10, 2).unwrap();
    assert!(plan.partition(WorkerId(2)).is_err());
}

#[test]
fn progress_spans_zero_to_one() {
    let plan = FramePlan::new(3, 1).unwrap();
    assert_eq!(plan.progress(FrameIndex(0)), 0.0);
    assert_eq!(plan.progress(FrameIndex(1)), 0.5);
    assert_eq!(plan.progress(FrameIndex(2)), 1.0);

    let plan = FramePlan::new(96, 4).unwrap();
    assert_eq!(plan.progress(FrameIndex(95)), 1.0);
}
