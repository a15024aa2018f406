use serde::Deserialize;

use crate::geometry::iou;

use super::result::Candidate;

pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

/// Which candidates may suppress each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionScope {
    /// Any overlapping pair competes regardless of class.
    #[default]
    Joint,
    /// Only candidates sharing a class id compete.
    PerClass,
}

impl std::str::FromStr for SuppressionScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "joint" => Ok(Self::Joint),
            "per_class" | "per-class" | "class" => Ok(Self::PerClass),
            other => Err(format!(
                "unknown suppression scope '{}'; expected joint or per_class",
                other
            )),
        }
    }
}

/// Greedy non-maximum suppression.
#[derive(Clone, Debug)]
pub struct Suppressor {
    confidence_threshold: f32,
    iou_threshold: f32,
    scope: SuppressionScope,
}

impl Suppressor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            scope: SuppressionScope::default(),
        }
    }

    pub fn with_scope(mut self, scope: SuppressionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scope(&self) -> SuppressionScope {
        self.scope
    }

    /// Select candidates highest confidence first, discarding any remaining
    /// candidate whose IoU with a selected one is strictly above the threshold.
    ///
    /// Candidates below the confidence threshold never enter the pool. Equal
    /// confidences keep their input order.
    pub fn suppress(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut pool: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.confidence >= self.confidence_threshold)
            .collect();
        // sort_by is stable
        pool.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut removed = vec![false; pool.len()];
        let mut selected = Vec::new();
        for i in 0..pool.len() {
            if removed[i] {
                continue;
            }
            let keep = pool[i];
            selected.push(*keep);
            for j in (i + 1)..pool.len() {
                if removed[j] || !self.competes(keep, pool[j]) {
                    continue;
                }
                if iou(&keep.bbox, &pool[j].bbox) > self.iou_threshold {
                    removed[j] = true;
                }
            }
        }
        selected
    }

    fn competes(&self, a: &Candidate, b: &Candidate) -> bool {
        match self.scope {
            SuppressionScope::Joint => true,
            SuppressionScope::PerClass => a.class_id == b.class_id,
        }
    }
}

impl Default for Suppressor {
    fn default() -> Self {
        Self::new(
            super::decode::DEFAULT_CONFIDENCE_THRESHOLD,
            DEFAULT_NMS_THRESHOLD,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn cand(x: f32, y: f32, w: f32, h: f32, class_id: usize, confidence: f32) -> Candidate {
        Candidate {
            bbox: BBox::new(x, y, w, h),
            class_id,
            confidence,
        }
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(Suppressor::default().suppress(&[]).is_empty());
    }

    #[test]
    fn overlapping_same_class_keeps_higher_confidence() {
        // IoU of these two boxes is exactly 0.5
        let low = cand(10.0, 0.0, 30.0, 10.0, 2, 0.6);
        let high = cand(0.0, 0.0, 30.0, 10.0, 2, 0.9);
        let out = Suppressor::new(0.3, 0.4).suppress(&[low, high]);
        assert_eq!(out, vec![high]);
    }

    #[test]
    fn class_scope_keeps_overlapping_different_classes() {
        let a = cand(0.0, 0.0, 100.0, 100.0, 2, 0.9);
        let b = cand(0.0, 0.0, 100.0, 90.0, 16, 0.8);
        let per_class = Suppressor::new(0.3, 0.4).with_scope(SuppressionScope::PerClass);
        assert_eq!(per_class.suppress(&[a, b]).len(), 2);

        let joint = Suppressor::new(0.3, 0.4);
        assert_eq!(joint.suppress(&[a, b]), vec![a]);
    }

    #[test]
    fn all_mutually_overlapping_leaves_one() {
        let input = vec![
            cand(0.0, 0.0, 50.0, 50.0, 0, 0.5),
            cand(1.0, 1.0, 50.0, 50.0, 0, 0.95),
            cand(2.0, 2.0, 50.0, 50.0, 0, 0.7),
        ];
        let out = Suppressor::new(0.3, 0.4).suppress(&input);
        assert_eq!(out, vec![input[1]]);
    }

    #[test]
    fn disjoint_candidates_all_survive_in_confidence_order() {
        let input = vec![
            cand(0.0, 0.0, 10.0, 10.0, 0, 0.4),
            cand(100.0, 0.0, 10.0, 10.0, 0, 0.8),
            cand(200.0, 0.0, 10.0, 10.0, 0, 0.6),
        ];
        let out = Suppressor::new(0.3, 0.4).suppress(&input);
        let confs: Vec<f32> = out.iter().map(|c| c.confidence).collect();
        assert_eq!(confs, vec![0.8, 0.6, 0.4]);
    }

    #[test]
    fn equal_confidence_keeps_input_order() {
        let first = cand(0.0, 0.0, 10.0, 10.0, 0, 0.5);
        let second = cand(2.0, 2.0, 10.0, 10.0, 1, 0.5);
        let out = Suppressor::new(0.3, 0.4).suppress(&[first, second]);
        assert_eq!(out, vec![first]);
    }

    #[test]
    fn pool_is_pruned_by_confidence_threshold() {
        let weak = cand(0.0, 0.0, 10.0, 10.0, 0, 0.1);
        assert!(Suppressor::new(0.3, 0.4).suppress(&[weak]).is_empty());
    }

    #[test]
    fn iou_equal_to_threshold_is_not_suppressed() {
        let a = cand(0.0, 0.0, 30.0, 10.0, 0, 0.9);
        let b = cand(10.0, 0.0, 30.0, 10.0, 0, 0.8);
        assert_eq!(Suppressor::new(0.3, 0.5).suppress(&[a, b]).len(), 2);
    }

    #[test]
    fn scope_parses_from_text() {
        assert_eq!("joint".parse::<SuppressionScope>(), Ok(SuppressionScope::Joint));
        assert_eq!("per_class".parse::<SuppressionScope>(), Ok(SuppressionScope::PerClass));
        assert!("bogus".parse::<SuppressionScope>().is_err());
    }
}
