use crate::directional::directional_derivative;
use crate::givens::apply_rotations;
use crate::traits::GradientField;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// When to run a second Gram-Schmidt pass while orthogonalizing a new
/// Krylov basis vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Reorthogonalization {
    Never,
    /// Reorthogonalize only when the post-projection norm has lost enough
    /// digits that `normav + 0.001 * normav2 == normav` in floating
    /// arithmetic (Brown/Hindmarsh condition).
    #[default]
    BrownHindmarsh,
    Always,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GmresSettings {
    /// Relative residual-reduction target: iterate until
    /// `‖r‖ < errtol * ‖b‖`.
    pub errtol: f64,
    /// Maximum Krylov subspace dimension. No restarts are performed.
    pub kmax: usize,
    pub reorth: Reorthogonalization,
    /// Finite-difference increment for the directional derivative.
    pub hfd: f64,
}

impl Default for GmresSettings {
    fn default() -> Self {
        Self {
            errtol: 1e-4,
            kmax: 40,
            reorth: Reorthogonalization::default(),
            hfd: 1e-7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GmresOutcome {
    /// Approximate solution of `f'(xc) · x = -f0`.
    pub x: DVector<f64>,
    /// Residual norm after each iteration, starting with the initial one.
    pub residuals: Vec<f64>,
    /// Krylov iterations actually used.
    pub iterations: usize,
}

/// Jacobian-free GMRES: solves `f'(xc) · x ≈ -f0` for the Newton-type step,
/// with every Jacobian-vector product replaced by a finite-difference
/// directional derivative of `field` at `xc`.
///
/// Classical Arnoldi with modified Gram-Schmidt and an incremental Givens
/// QR of the Hessenberg matrix. Reaching `kmax` without meeting `errtol` is
/// silent non-convergence; callers decide by inspecting `residuals`. This
/// matches an outer Newton loop that adapts its own forcing term instead of
/// restarting the inner solve.
pub fn gmres(
    f0: &DVector<f64>,
    field: &dyn GradientField,
    xc: &DVector<f64>,
    x0: Option<DVector<f64>>,
    settings: &GmresSettings,
) -> GmresOutcome {
    let n = f0.len();
    let mut x = x0.unwrap_or_else(|| DVector::zeros(n));

    // b = -f0; with a zero initial iterate the directional derivative is
    // skipped and r reduces to b.
    let r = -directional_derivative(xc, &x, field, f0, settings.hfd) - f0;
    let bnorm = f0.norm();
    let target = settings.errtol * bnorm;

    let mut rho = r.norm();
    let mut residuals = vec![rho];
    if rho < target || rho == 0.0 {
        return GmresOutcome {
            x,
            residuals,
            iterations: 0,
        };
    }

    let kmax = settings.kmax;
    let mut v: Vec<DVector<f64>> = Vec::with_capacity(kmax + 1);
    v.push(&r / rho);
    let mut h = DMatrix::<f64>::zeros(kmax + 1, kmax);
    let mut c = vec![0.0_f64; kmax];
    let mut s = vec![0.0_f64; kmax];
    let mut g = DVector::<f64>::zeros(kmax + 1);
    g[0] = rho;

    let mut k = 0;
    while rho > target && k < kmax {
        let mut av = directional_derivative(xc, &v[k], field, f0, settings.hfd);
        let normav = av.norm();

        // Modified Gram-Schmidt against all previous basis vectors.
        for j in 0..=k {
            h[(j, k)] = v[j].dot(&av);
            av -= &v[j] * h[(j, k)];
        }
        h[(k + 1, k)] = av.norm();
        let normav2 = h[(k + 1, k)];

        let reorthogonalize = match settings.reorth {
            Reorthogonalization::Never => false,
            Reorthogonalization::Always => true,
            Reorthogonalization::BrownHindmarsh => normav + 0.001 * normav2 == normav,
        };
        if reorthogonalize {
            for j in 0..=k {
                let hr = v[j].dot(&av);
                h[(j, k)] += hr;
                av -= &v[j] * hr;
            }
            h[(k + 1, k)] = av.norm();
        }

        // Happy breakdown: the Krylov subspace has saturated. Skip the
        // normalization; the rotation below zeroes the projected residual
        // and the loop exits with an exact solution at this dimension.
        if h[(k + 1, k)] != 0.0 {
            av /= h[(k + 1, k)];
        }
        v.push(av);

        // Extend the QR factorization: old rotations on the new column,
        // then one new rotation to annihilate the subdiagonal entry.
        if k > 0 {
            let col: Vec<f64> = (0..=k + 1).map(|i| h[(i, k)]).collect();
            let rotated = apply_rotations(&c[..k], &s[..k], &col);
            for (i, value) in rotated.into_iter().enumerate() {
                h[(i, k)] = value;
            }
        }
        let nu = h[(k, k)].hypot(h[(k + 1, k)]);
        if nu != 0.0 {
            c[k] = h[(k, k)] / nu;
            s[k] = -h[(k + 1, k)] / nu;
            h[(k, k)] = c[k] * h[(k, k)] - s[k] * h[(k + 1, k)];
            h[(k + 1, k)] = 0.0;
            let (g1, g2) = (c[k] * g[k] - s[k] * g[k + 1], s[k] * g[k] + c[k] * g[k + 1]);
            g[k] = g1;
            g[k + 1] = g2;
        }

        rho = g[k + 1].abs();
        residuals.push(rho);
        k += 1;
    }

    // Solve the k x k upper-triangular system h y = g by back substitution
    // and expand through the stored basis.
    let mut y = vec![0.0_f64; k];
    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in i + 1..k {
            sum -= h[(i, j)] * y[j];
        }
        y[i] = sum / h[(i, i)];
    }
    for (j, yj) in y.iter().enumerate() {
        x += &v[j] * *yj;
    }

    GmresOutcome {
        x,
        residuals,
        iterations: k,
    }
}
