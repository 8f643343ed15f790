//! Statistics over utilization histories.

/// Relative tolerance of the rank check in least squares.
const SINGULARITY_TOLERANCE: f64 = 1e-10;

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

pub fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.;
    }
    let sorted = sorted(data);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation.
pub fn mad(data: &[f64]) -> f64 {
    let center = median(data);
    let deviations: Vec<f64> = data.iter().map(|x| (x - center).abs()).collect();
    median(&deviations)
}

/// Estimates the `p`-th percentile (0 < p <= 100) with linear interpolation between the order statistics
/// at position `p * (n + 1) / 100`.
pub fn percentile(data: &[f64], p: f64) -> f64 {
    if data.is_empty() {
        return 0.;
    }
    let sorted = sorted(data);
    let n = sorted.len();
    let pos = p * (n as f64 + 1.) / 100.;
    if pos < 1. {
        return sorted[0];
    }
    if pos >= n as f64 {
        return sorted[n - 1];
    }
    let lower = pos.floor();
    let d = pos - lower;
    let lower = lower as usize;
    sorted[lower - 1] + d * (sorted[lower] - sorted[lower - 1])
}

/// Interquartile range.
pub fn iqr(data: &[f64]) -> f64 {
    percentile(data, 75.) - percentile(data, 25.)
}

/// For every series computes the coefficient of determination of its linear regression (with intercept)
/// on all other series.
///
/// Series are truncated to the length of the shortest one. Returns `None` if there are less than two series,
/// if the regression has no degrees of freedom left or if the regressors are linearly dependent.
pub fn correlation_coefficients(series: &[Vec<f64>]) -> Option<Vec<f64>> {
    let n = series.len();
    if n < 2 {
        return None;
    }
    let m = series.iter().map(|s| s.len()).min().unwrap_or(0);
    if m <= n {
        return None;
    }
    let mut result = Vec::with_capacity(n);
    for i in 0..n {
        let y = &series[i][..m];
        let design: Vec<Vec<f64>> = (0..m)
            .map(|row| {
                let mut values = Vec::with_capacity(n);
                values.push(1.);
                values.extend((0..n).filter(|j| *j != i).map(|j| series[j][row]));
                values
            })
            .collect();
        let sse = residual_sum_of_squares(design, y.to_vec())?;
        let y_mean = mean(y);
        let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        result.push(if sst == 0. { 0. } else { 1. - sse / sst });
    }
    Some(result)
}

/// Solves least squares problem `a * x = y` with Householder QR decomposition and returns the residual sum of
/// squares. Returns `None` if `a` doesn't have full column rank.
fn residual_sum_of_squares(mut a: Vec<Vec<f64>>, mut y: Vec<f64>) -> Option<f64> {
    let rows = a.len();
    let cols = a.first().map_or(0, |row| row.len());
    for k in 0..cols {
        let norm = (k..rows).map(|r| a[r][k].powi(2)).sum::<f64>().sqrt();
        let full_norm = (0..rows).map(|r| a[r][k].powi(2)).sum::<f64>().sqrt();
        if full_norm == 0. || norm <= SINGULARITY_TOLERANCE * full_norm {
            return None;
        }
        let alpha = if a[k][k] > 0. { -norm } else { norm };
        let mut v: Vec<f64> = (k..rows).map(|r| a[r][k]).collect();
        v[0] -= alpha;
        let v_norm2: f64 = v.iter().map(|x| x * x).sum();
        if v_norm2 == 0. {
            continue;
        }
        for col in k..cols {
            let s = 2. * (k..rows).map(|r| v[r - k] * a[r][col]).sum::<f64>() / v_norm2;
            for r in k..rows {
                a[r][col] -= s * v[r - k];
            }
        }
        let s = 2. * (k..rows).map(|r| v[r - k] * y[r]).sum::<f64>() / v_norm2;
        for r in k..rows {
            y[r] -= s * v[r - k];
        }
    }
    Some(y[cols..].iter().map(|r| r * r).sum())
}

fn sorted(data: &[f64]) -> Vec<f64> {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn median_and_mad() {
        let data = [1., 1., 2., 2., 4., 6., 9.];
        assert_eq!(median(&data), 2.);
        assert_eq!(mad(&data), 1.);
        assert_eq!(median(&[4., 1., 3., 2.]), 2.5);
        assert_eq!(median(&[]), 0.);
    }

    #[test]
    fn interquartile_range() {
        let data: Vec<f64> = (1..=12).map(|x| x as f64).collect();
        // positions 3.25 and 9.75
        assert_relative_eq!(percentile(&data, 25.), 3.25);
        assert_relative_eq!(percentile(&data, 75.), 9.75);
        assert_relative_eq!(iqr(&data), 6.5);
        assert_eq!(percentile(&[5.], 25.), 5.);
    }

    #[test]
    fn perfectly_correlated_series() {
        let a: Vec<f64> = (0..10).map(|x| x as f64 * 0.1).collect();
        let b: Vec<f64> = a.iter().map(|x| 2. * x + 0.5).collect();
        let r2 = correlation_coefficients(&[a, b]).unwrap();
        assert_relative_eq!(r2[0], 1., epsilon = 1e-9);
        assert_relative_eq!(r2[1], 1., epsilon = 1e-9);
    }

    #[test]
    fn partially_correlated_series() {
        let a: Vec<f64> = (0..10).map(|x| x as f64 * 0.1).collect();
        let c = vec![0.3, 0.1, 0.4, 0.1, 0.5, 0.9, 0.2, 0.6, 0.5, 0.3];
        let r2 = correlation_coefficients(&[a, c]).unwrap();
        assert!(r2[0] > 0. && r2[0] < 1.);
        // with a single regressor the coefficient is the squared correlation, so it is symmetric
        assert_relative_eq!(r2[0], r2[1], epsilon = 1e-9);
    }

    #[test]
    fn constant_regressor_is_singular() {
        let a = vec![0.5; 6];
        let b = vec![0.1, 0.4, 0.2, 0.8, 0.3, 0.6];
        assert!(correlation_coefficients(&[a, b]).is_none());
    }

    #[test]
    fn not_enough_data() {
        assert!(correlation_coefficients(&[vec![0.1, 0.2, 0.3]]).is_none());
        // one sample per series leaves no degrees of freedom
        assert!(correlation_coefficients(&[vec![0.1], vec![0.2]]).is_none());
        assert!(correlation_coefficients(&[vec![0.1, 0.2], vec![0.2, 0.4]]).is_none());
    }

    #[test]
    fn dependent_regressors() {
        let a = vec![0.1, 0.2, 0.3, 0.4, 0.5];
        let b = vec![0.2, 0.4, 0.6, 0.8, 1.0];
        let c = vec![0.5, 0.1, 0.3, 0.2, 0.4];
        // for series c the regressors a and b are collinear
        assert!(correlation_coefficients(&[a, b, c]).is_none());
    }
}
