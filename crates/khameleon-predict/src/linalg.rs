//! Fixed 6x6 matrix arithmetic for the Kalman filter

use std::ops::{Add, Mul, Sub};

/// Column vector of six states
pub type Vec6 = [f64; 6];

/// Dense 6x6 matrix, row-major
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat6(pub [[f64; 6]; 6]);

const N: usize = 6;
const PIVOT_EPSILON: f64 = 1e-12;

impl Mat6 {
    /// All zeros
    pub const fn zeros() -> Self {
        Mat6([[0.0; N]; N])
    }

    /// Identity
    pub fn identity() -> Self {
        Self::diagonal([1.0; N])
    }

    /// Diagonal matrix
    pub fn diagonal(d: [f64; N]) -> Self {
        let mut m = Self::zeros();
        for i in 0..N {
            m.0[i][i] = d[i];
        }
        m
    }

    /// Element at row `r`, column `c`
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.0[r][c]
    }

    /// Transpose
    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros();
        for r in 0..N {
            for c in 0..N {
                t.0[c][r] = self.0[r][c];
            }
        }
        t
    }

    /// Multiply every element by `k`
    pub fn scale(&self, k: f64) -> Self {
        let mut m = *self;
        for row in m.0.iter_mut() {
            for v in row.iter_mut() {
                *v *= k;
            }
        }
        m
    }

    /// Matrix-vector product
    pub fn mul_vec(&self, v: &Vec6) -> Vec6 {
        let mut out = [0.0; N];
        for r in 0..N {
            out[r] = (0..N).map(|c| self.0[r][c] * v[c]).sum();
        }
        out
    }

    /// `self * m * selfᵀ`
    pub fn sandwich(&self, m: &Mat6) -> Mat6 {
        *self * *m * self.transpose()
    }

    /// Inverse by Gauss-Jordan elimination with partial pivoting
    pub fn inverse(&self) -> Option<Mat6> {
        let mut a = self.0;
        let mut inv = Self::identity().0;

        for col in 0..N {
            let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
            if a[pivot][col].abs() < PIVOT_EPSILON {
                return None;
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let p = a[col][col];
            for c in 0..N {
                a[col][c] /= p;
                inv[col][c] /= p;
            }
            for r in 0..N {
                if r == col {
                    continue;
                }
                let factor = a[r][col];
                if factor == 0.0 {
                    continue;
                }
                for c in 0..N {
                    a[r][c] -= factor * a[col][c];
                    inv[r][c] -= factor * inv[col][c];
                }
            }
        }
        Some(Mat6(inv))
    }
}

impl Mul for Mat6 {
    type Output = Mat6;

    fn mul(self, rhs: Mat6) -> Mat6 {
        let mut out = Mat6::zeros();
        for r in 0..N {
            for c in 0..N {
                out.0[r][c] = (0..N).map(|k| self.0[r][k] * rhs.0[k][c]).sum();
            }
        }
        out
    }
}

impl Add for Mat6 {
    type Output = Mat6;

    fn add(self, rhs: Mat6) -> Mat6 {
        let mut out = self;
        for r in 0..N {
            for c in 0..N {
                out.0[r][c] += rhs.0[r][c];
            }
        }
        out
    }
}

impl Sub for Mat6 {
    type Output = Mat6;

    fn sub(self, rhs: Mat6) -> Mat6 {
        let mut out = self;
        for r in 0..N {
            for c in 0..N {
                out.0[r][c] -= rhs.0[r][c];
            }
        }
        out
    }
}
