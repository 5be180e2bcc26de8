use crate::geometry::Point3d;

/// Ramer-Douglas-Peucker simplification.
///
/// Returns the kept points and their indices in `points`. The first and
/// last points are always kept.
pub fn simplify(points: &[Point3d], epsilon: f64) -> (Vec<Point3d>, Vec<usize>) {
    if points.len() < 3 {
        return (points.to_vec(), (0..points.len()).collect());
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let (index, distance) = farthest_from_chord(points, first, last);
        if distance > epsilon {
            keep[index] = true;
            stack.push((first, index));
            stack.push((index, last));
        }
    }

    keep.iter()
        .enumerate()
        .filter(|(_, k)| **k)
        .map(|(i, _)| (points[i], i))
        .unzip()
}

fn farthest_from_chord(points: &[Point3d], first: usize, last: usize) -> (usize, f64) {
    let a = points[first];
    let ab = points[last] - a;
    let len2 = ab.norm_squared();

    let mut best = (first + 1, -1.0);
    for (i, p) in points.iter().enumerate().take(last).skip(first + 1) {
        let ap = p - a;
        let d = if len2 < 1e-24 {
            ap.norm()
        } else {
            ap.cross(&ab).norm() / len2.sqrt()
        };
        if d > best.1 {
            best = (i, d);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collinear_points_collapse() {
        let points: Vec<Point3d> = (0..10).map(|i| Point3d::new(i as f64, 0.0, 0.0)).collect();
        let (kept, idx) = simplify(&points, 1e-6);
        assert_eq!(kept.len(), 2);
        assert_eq!(idx, vec![0, 9]);
    }

    #[test]
    fn test_corner_is_kept() {
        let mut points: Vec<Point3d> = (0..5).map(|i| Point3d::new(i as f64, 0.0, 0.0)).collect();
        points.extend((1..5).map(|i| Point3d::new(4.0, i as f64, 0.0)));
        let (_, idx) = simplify(&points, 0.1);
        assert_eq!(idx, vec![0, 4, 8]);
    }

    #[test]
    fn test_short_input_untouched() {
        let points = vec![Point3d::origin(), Point3d::new(1.0, 1.0, 1.0)];
        let (kept, idx) = simplify(&points, 10.0);
        assert_eq!(kept, points);
        assert_eq!(idx, vec![0, 1]);
    }
}
