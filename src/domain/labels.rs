/// Emotion classes in the order the detector was trained on. Index `i` of the
/// model's class axis is `EMOTION_LABELS[i]`; reordering this list mislabels
/// every detection without any error.
pub const EMOTION_LABELS: [&str; 9] = [
    "angry",
    "contempt",
    "disgust",
    "fear",
    "happy",
    "natural",
    "sad",
    "sleepy",
    "surprised",
];

/// Reported as the top emotion when nothing clears the confidence threshold.
pub const FALLBACK_EMOTION: &str = "natural";

pub fn label_for(class_id: usize) -> Option<&'static str> {
    EMOTION_LABELS.get(class_id).copied()
}
