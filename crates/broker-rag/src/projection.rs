//! The 2D projection behind `rag.embeddings`: center the stored vectors,
//! extract the top two principal components by hand-rolled power
//! iteration (no linear-algebra crate needed for a couple of eigenvectors
//! over a handful of points), project onto them, then rescale each axis
//! independently into `[0, 1]`.

/// One point in the 2D projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub x: f32,
    pub y: f32,
}

/// Projects `(id, vector)` pairs into 2D. Fewer than two vectors falls back
/// to taking each vector's first two coordinates (padded with 0 if the
/// vector is shorter than 2 dimensions) rather than attempting PCA.
pub fn project(vectors: &[(String, Vec<f32>)]) -> Vec<Point> {
    if vectors.len() < 2 {
        return vectors
            .iter()
            .map(|(id, v)| Point { id: id.clone(), x: *v.first().unwrap_or(&0.0), y: *v.get(1).unwrap_or(&0.0) })
            .collect();
    }

    let dims = vectors[0].1.len();
    let data: Vec<Vec<f64>> = vectors.iter().map(|(_, v)| v.iter().map(|x| *x as f64).collect()).collect();

    let mean: Vec<f64> = (0..dims).map(|d| data.iter().map(|v| v[d]).sum::<f64>() / data.len() as f64).collect();
    let centered: Vec<Vec<f64>> = data.iter().map(|v| v.iter().zip(&mean).map(|(x, m)| x - m).collect()).collect();

    let cov = covariance(&centered, dims);
    let pc1 = top_eigenvector(&cov, dims, None);
    let deflated = deflate(&cov, &pc1, dims);
    let pc2 = top_eigenvector(&deflated, dims, Some(&pc1));

    let raw: Vec<(f32, f32)> =
        centered.iter().map(|v| (dot(v, &pc1) as f32, dot(v, &pc2) as f32)).collect();

    let xs: Vec<f32> = raw.iter().map(|(x, _)| *x).collect();
    let ys: Vec<f32> = raw.iter().map(|(_, y)| *y).collect();

    vectors
        .iter()
        .zip(raw)
        .map(|((id, _), (x, y))| Point { id: id.clone(), x: rescale(x, &xs), y: rescale(y, &ys) })
        .collect()
}

fn covariance(centered: &[Vec<f64>], dims: usize) -> Vec<Vec<f64>> {
    let n = centered.len() as f64;
    let mut cov = vec![vec![0.0; dims]; dims];
    for v in centered {
        for i in 0..dims {
            for j in 0..dims {
                cov[i][j] += v[i] * v[j] / n;
            }
        }
    }
    cov
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn mat_vec(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| dot(row, v)).collect()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// Power iteration for the dominant eigenvector, orthogonalized against
/// `exclude` each step (used for the second component after deflation).
fn top_eigenvector(mat: &[Vec<f64>], dims: usize, exclude: Option<&[f64]>) -> Vec<f64> {
    let mut v: Vec<f64> = (0..dims).map(|i| if i == 0 { 1.0 } else { 0.1 }).collect();
    if norm(&v) == 0.0 {
        v[0] = 1.0;
    }
    for _ in 0..100 {
        let mut next = mat_vec(mat, &v);
        if let Some(exclude) = exclude {
            let proj = dot(&next, exclude);
            for (n, e) in next.iter_mut().zip(exclude) {
                *n -= proj * e;
            }
        }
        let n = norm(&next);
        if n < 1e-12 {
            break;
        }
        for x in next.iter_mut() {
            *x /= n;
        }
        v = next;
    }
    v
}

fn deflate(cov: &[Vec<f64>], pc1: &[f64], dims: usize) -> Vec<Vec<f64>> {
    let eigenvalue = dot(pc1, &mat_vec(cov, pc1));
    let mut deflated = cov.to_vec();
    for i in 0..dims {
        for j in 0..dims {
            deflated[i][j] -= eigenvalue * pc1[i] * pc1[j];
        }
    }
    deflated
}

fn rescale(value: f32, all: &[f32]) -> f32 {
    let min = all.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = all.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < 1e-9 {
        return 0.0;
    }
    (value - min) / (max - min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_vectors_falls_back_to_raw_coordinates() {
        let points = project(&[("a".into(), vec![0.3, 0.7, 0.1])]);
        assert_eq!(points, vec![Point { id: "a".into(), x: 0.3, y: 0.7 }]);
    }

    #[test]
    fn three_four_dim_vectors_project_into_unit_square_per_axis() {
        let vectors = vec![
            ("c1".to_string(), vec![0.1, 0.2, 0.3, 0.4]),
            ("c2".to_string(), vec![0.5, 0.6, 0.7, 0.8]),
            ("c3".to_string(), vec![0.9, 0.1, 0.2, 0.3]),
        ];
        let points = project(&vectors);
        assert_eq!(points.len(), 3);
        for p in &points {
            assert!(p.x >= -1e-4 && p.x <= 1.0 + 1e-4);
            assert!(p.y >= -1e-4 && p.y <= 1.0 + 1e-4);
        }
        let xs: Vec<f32> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f32> = points.iter().map(|p| p.y).collect();
        assert!(xs.iter().any(|x| (*x - 0.0).abs() < 1e-3) && xs.iter().any(|x| (*x - 1.0).abs() < 1e-3));
        assert!(ys.iter().any(|y| (*y - 0.0).abs() < 1e-3) && ys.iter().any(|y| (*y - 1.0).abs() < 1e-3));
    }
}
