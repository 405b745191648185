//! The fixed, ordered set of cardiac conditions the classifier predicts.
//!
//! Index order matches the classifier's output vector. Index 0 is the only
//! "normal" class.

/// Number of output classes.
pub const NUM_CLASSES: usize = 5;

/// Class labels in model output order.
pub const CLASS_LABELS: [&str; NUM_CLASSES] = [
    "Normal",
    "Cardiomegaly",
    "Pulmonary Congestion",
    "Aortic Abnormality",
    "Heart Failure",
];

/// Index of the `Normal` class.
pub const NORMAL_INDEX: usize = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_is_first() {
        assert_eq!(CLASS_LABELS[NORMAL_INDEX], "Normal");
    }

    #[test]
    fn labels_are_distinct() {
        for (i, a) in CLASS_LABELS.iter().enumerate() {
            assert!(CLASS_LABELS[i + 1..].iter().all(|b| a != b), "{a} repeated");
        }
    }
}
