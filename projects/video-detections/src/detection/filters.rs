use super::mask::Mask;
use super::object::DetectedObject;

/// Keep objects whose label matches one of `classes`, ignoring case.
pub fn filter_by_classes<S: AsRef<str>>(
    objects: &[DetectedObject],
    classes: &[S],
) -> Vec<DetectedObject> {
    objects
        .iter()
        .filter(|obj| classes.iter().any(|class| obj.is_labeled(class.as_ref())))
        .cloned()
        .collect()
}

/// Keep objects scored at or above `min_score`.
pub fn filter_by_min_score(objects: &[DetectedObject], min_score: f32) -> Vec<DetectedObject> {
    objects
        .iter()
        .filter(|obj| obj.is_scored_at_least(min_score))
        .cloned()
        .collect()
}

/// Drop likely multiple detections of one object.
///
/// Two objects whose centers are at most `max_distance` apart are treated as
/// the same detection and only the higher-scored one survives. On equal
/// scores the one appearing first is dropped. Input order is preserved.
pub fn filter_avoiding_duplicates(
    objects: &[DetectedObject],
    max_distance: f32,
) -> Vec<DetectedObject> {
    let mut removed = vec![false; objects.len()];
    for (i, obj) in objects.iter().enumerate() {
        for (j, candidate) in objects.iter().enumerate() {
            if i == j || removed[i] || removed[j] {
                continue;
            }
            if obj.center.distance(&candidate.center) <= max_distance {
                if obj.score > candidate.score {
                    removed[j] = true;
                } else {
                    removed[i] = true;
                }
            }
        }
    }
    objects
        .iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(obj, _)| obj.clone())
        .collect()
}

/// Keep objects whose center lies inside the mask.
pub fn filter_inside_mask(objects: &[DetectedObject], mask: &Mask) -> Vec<DetectedObject> {
    objects
        .iter()
        .filter(|obj| mask.contains(obj.center))
        .cloned()
        .collect()
}
