use nalgebra::{Matrix3, Point3, Vector3};

/// Computes the RMSD between two equally sized coordinate sets, without
/// alignment.
pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

/// Computes the best-fit RMSD between two coordinate sets after optimal
/// rigid-body superposition (Kabsch algorithm).
///
/// Both sets must have the same length and matching atom order. The target is
/// centered and rotated onto the centered reference; reflections are excluded
/// so chirality is preserved.
///
/// # Return
///
/// Returns `Some(rmsd)` for non-empty, equally sized inputs, otherwise `None`.
pub fn best_fit_rmsd(reference: &[Point3<f64>], target: &[Point3<f64>]) -> Option<f64> {
    if reference.len() != target.len() || reference.is_empty() {
        return None;
    }

    let n = reference.len() as f64;
    let ref_centroid = centroid(reference);
    let tgt_centroid = centroid(target);

    let ref_centered: Vec<Vector3<f64>> = reference.iter().map(|p| p - ref_centroid).collect();
    let tgt_centered: Vec<Vector3<f64>> = target.iter().map(|p| p - tgt_centroid).collect();

    // Cross-covariance of target against reference.
    let mut h = Matrix3::zeros();
    for (t, r) in tgt_centered.iter().zip(ref_centered.iter()) {
        h += t * r.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let v = v_t.transpose();

    // Guard against an improper rotation (reflection).
    let d: f64 = if (v * u.transpose()).determinant() < 0.0 {
        -1.0
    } else {
        1.0
    };
    let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
    let rotation = v * correction * u.transpose();

    let squared_dist_sum: f64 = tgt_centered
        .iter()
        .zip(ref_centered.iter())
        .map(|(t, r)| (rotation * t - r).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn square() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn rmsd_of_identical_sets_is_zero() {
        let points = square();
        assert!(calculate_rmsd(&points, &points).unwrap() < 1e-12);
        assert!(best_fit_rmsd(&points, &points).unwrap() < 1e-9);
    }

    #[test]
    fn mismatched_or_empty_inputs_yield_none() {
        let points = square();
        assert!(calculate_rmsd(&points, &points[..3]).is_none());
        assert!(best_fit_rmsd(&points, &points[..3]).is_none());
        assert!(best_fit_rmsd(&[], &[]).is_none());
    }

    #[test]
    fn best_fit_removes_rotation_and_translation() {
        let points = square();
        let rotation = Rotation3::from_euler_angles(0.3, -1.1, 0.7);
        let moved: Vec<Point3<f64>> = points
            .iter()
            .map(|p| rotation * p + Vector3::new(4.0, -2.0, 9.0))
            .collect();

        // Plain RMSD sees the displacement; best-fit RMSD does not.
        assert!(calculate_rmsd(&points, &moved).unwrap() > 1.0);
        assert!(best_fit_rmsd(&points, &moved).unwrap() < 1e-9);
    }

    #[test]
    fn best_fit_reports_residual_distortion() {
        let points = square();
        let mut distorted = points.clone();
        distorted[2] = Point3::new(1.5, 1.5, 0.5);
        let rmsd = best_fit_rmsd(&points, &distorted).unwrap();
        assert!(rmsd > 0.1, "distortion should survive alignment: {rmsd}");
    }
}
