use proptest::prelude::*;

use traffic_counter::{iou, BBox, Candidate, SuppressionScope, Suppressor};

fn bbox() -> impl Strategy<Value = BBox> {
    (0.0f32..400.0, 0.0f32..400.0, 1.0f32..120.0, 1.0f32..120.0)
        .prop_map(|(x, y, w, h)| BBox::new(x, y, w, h))
}

fn candidate() -> impl Strategy<Value = Candidate> {
    (bbox(), 0usize..4, 0.0f32..1.0).prop_map(|(bbox, class_id, confidence)| Candidate {
        bbox,
        class_id,
        confidence,
    })
}

fn scope() -> impl Strategy<Value = SuppressionScope> {
    prop_oneof![Just(SuppressionScope::Joint), Just(SuppressionScope::PerClass)]
}

proptest! {
    #[test]
    fn kept_candidates_come_from_the_input(
        candidates in prop::collection::vec(candidate(), 0..40),
        iou_threshold in 0.0f32..1.0,
        scope in scope(),
    ) {
        let suppressor = Suppressor::new(0.3, iou_threshold).with_scope(scope);
        let kept = suppressor.suppress(&candidates);
        prop_assert!(kept.len() <= candidates.len());
        for c in &kept {
            prop_assert!(candidates.contains(c));
            prop_assert!(c.confidence >= 0.3);
        }
    }

    #[test]
    fn kept_candidates_are_ordered_and_do_not_overlap(
        candidates in prop::collection::vec(candidate(), 0..40),
        iou_threshold in 0.0f32..1.0,
        scope in scope(),
    ) {
        let suppressor = Suppressor::new(0.3, iou_threshold).with_scope(scope);
        let kept = suppressor.suppress(&candidates);
        for pair in kept.windows(2) {
            prop_assert!(pair[0].confidence >= pair[1].confidence);
        }
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                let competes = scope == SuppressionScope::Joint || a.class_id == b.class_id;
                if competes {
                    prop_assert!(iou(&a.bbox, &b.bbox) <= iou_threshold);
                }
            }
        }
    }

    #[test]
    fn best_candidate_always_survives(
        candidates in prop::collection::vec(candidate(), 1..40),
        iou_threshold in 0.0f32..1.0,
    ) {
        let kept = Suppressor::new(0.0, iou_threshold).suppress(&candidates);
        let best = candidates
            .iter()
            .map(|c| c.confidence)
            .fold(f32::MIN, f32::max);
        prop_assert_eq!(kept[0].confidence, best);
    }

    #[test]
    fn suppression_is_idempotent(
        candidates in prop::collection::vec(candidate(), 0..40),
        iou_threshold in 0.0f32..1.0,
        scope in scope(),
    ) {
        let suppressor = Suppressor::new(0.3, iou_threshold).with_scope(scope);
        let once = suppressor.suppress(&candidates);
        let twice = suppressor.suppress(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn iou_is_symmetric_and_bounded(a in bbox(), b in bbox()) {
        let ab = iou(&a, &b);
        prop_assert_eq!(ab, iou(&b, &a));
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn box_overlaps_itself_fully(a in bbox()) {
        prop_assert!((iou(&a, &a) - 1.0).abs() < 1e-3);
    }
}
