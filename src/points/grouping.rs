use crate::points::DataPoint;
use std::collections::BTreeMap;

/// Partition fetched points into per-metric-type groups for storage.
///
/// When no point carries an explicit `metric_type`, the whole list forms a single group
/// under `metric`. Otherwise points are grouped by their `metric_type`, with points lacking
/// one falling back to `metric`. Groups are returned ordered by metric type; points keep
/// their fetch order within a group.
#[must_use]
pub fn group_by_metric_type(metric: &str, points: Vec<DataPoint>) -> Vec<(String, Vec<DataPoint>)> {
    if points.is_empty() {
        return Vec::new();
    }

    if points.iter().all(|p| p.metric_type.is_none()) {
        return vec![(metric.to_string(), points)];
    }

    let mut groups: BTreeMap<String, Vec<DataPoint>> = BTreeMap::new();
    for point in points {
        let key = point.metric_type.clone().unwrap_or_else(|| metric.to_string());
        groups.entry(key).or_default().push(point);
    }

    groups.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::PointValue;
    use chrono::{NaiveDate, Utc};

    fn point(day: u32, metric_type: Option<&str>) -> DataPoint {
        let p = DataPoint::new(NaiveDate::from_ymd_opt(2026, 1, day).unwrap(), PointValue::Count(u64::from(day)), Utc::now());
        match metric_type {
            Some(mt) => p.with_metric_type(mt),
            None => p,
        }
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        assert!(group_by_metric_type("steps", Vec::new()).is_empty());
    }

    #[test]
    fn test_untyped_points_form_single_group() {
        let groups = group_by_metric_type("steps", vec![point(15, None), point(16, None), point(17, None)]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "steps");
        assert_eq!(groups[0].1.len(), 3);
    }

    #[test]
    fn test_typed_points_are_grouped() {
        let groups = group_by_metric_type(
            "tasks",
            vec![
                point(15, Some("feature")),
                point(15, Some("bug_fix")),
                point(16, Some("feature")),
            ],
        );

        let names: Vec<_> = groups.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["bug_fix", "feature"]);
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[1].1[0].date, NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn test_untyped_points_fall_back_to_invoked_metric() {
        let groups = group_by_metric_type("tasks", vec![point(15, Some("unknown")), point(16, None)]);

        assert_eq!(groups.len(), 2);
        assert!(groups.iter().any(|(name, pts)| name == "tasks" && pts.len() == 1));
        assert!(groups.iter().any(|(name, pts)| name == "unknown" && pts.len() == 1));
    }

    #[test]
    fn test_group_sizes_sum_to_input() {
        let input = vec![point(1, Some("a")), point(2, None), point(3, Some("b")), point(4, Some("a"))];
        let total: usize = group_by_metric_type("m", input).iter().map(|(_, pts)| pts.len()).sum();
        assert_eq!(total, 4);
    }
}
