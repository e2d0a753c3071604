//! Small dense linear algebra for the interaction estimators
//!
//! Least squares is solved with Householder QR on the design columns. No
//! column pivoting is done: a column whose residual norm after projecting out
//! the preceding columns falls below `tolerance × original norm` is reported
//! as linearly dependent on them.

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from equal-length rows. Returns `None` on ragged input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }
}

/// Why a least-squares system has no unique solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankDeficiency {
    /// Fewer observations than unknowns
    Underdetermined { rows: usize, cols: usize },
    /// Column is (numerically) a linear combination of earlier columns
    Collinear { column: usize },
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// Ordinary least squares `argmin ||Xβ − y||²` via Householder QR.
pub fn least_squares(
    design: &Matrix,
    response: &[f64],
    tolerance: f64,
) -> Result<Vec<f64>, RankDeficiency> {
    let (m, n) = (design.rows(), design.cols());
    if m < n || response.len() != m {
        return Err(RankDeficiency::Underdetermined { rows: m, cols: n });
    }

    // Column-major working copy; after the loop the upper triangle holds R
    let mut cols: Vec<Vec<f64>> = (0..n).map(|j| design.column(j)).collect();
    let original_norms: Vec<f64> = cols.iter().map(|c| norm(c)).collect();
    let mut qty = response.to_vec();

    for k in 0..n {
        let sub_norm = norm(&cols[k][k..]);
        if original_norms[k] == 0.0 || sub_norm <= tolerance * original_norms[k] {
            return Err(RankDeficiency::Collinear { column: k });
        }

        let alpha = if cols[k][k] > 0.0 { -sub_norm } else { sub_norm };
        let mut v: Vec<f64> = cols[k][k..].to_vec();
        v[0] -= alpha;
        let v_norm_sq = dot(&v, &v);

        for col in cols.iter_mut().skip(k) {
            let s = 2.0 * dot(&v, &col[k..]) / v_norm_sq;
            for (target, vi) in col[k..].iter_mut().zip(&v) {
                *target -= s * vi;
            }
        }
        let s = 2.0 * dot(&v, &qty[k..]) / v_norm_sq;
        for (target, vi) in qty[k..].iter_mut().zip(&v) {
            *target -= s * vi;
        }
    }

    // Back substitution on R β = Qᵀy
    let mut beta = vec![0.0; n];
    for i in (0..n).rev() {
        let mut acc = qty[i];
        for j in (i + 1)..n {
            acc -= cols[j][i] * beta[j];
        }
        beta[i] = acc / cols[i][i];
    }
    Ok(beta)
}

/// Mean and population standard deviation (divisor n).
pub fn mean_and_population_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample variance (divisor n − 1); NaN for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}
