use nalgebra::DVector;

/// Preconditioner used by the stabilized Newton driver.
///
/// Three operations: apply the inverse (`solve`), measure a vector in the
/// preconditioner-induced dual norm (`dual_norm`), and refresh the operator
/// at a new point (`prepare`). `prepare` is called exactly once per accepted
/// outer step; the operator is read-only for the rest of the iteration and
/// must not hold references to stale points.
pub trait Preconditioner {
    /// Applies `P^{-1}` to `v`.
    fn solve(&self, v: &DVector<f64>) -> DVector<f64>;

    /// Returns `‖v‖_P`, the dual norm induced by the preconditioner.
    fn dual_norm(&self, v: &DVector<f64>) -> f64;

    /// Refreshes the operator at the point `x`.
    fn prepare(&mut self, x: &DVector<f64>);
}

/// The default preconditioner: `solve` is the identity and the dual norm is
/// the Euclidean norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn solve(&self, v: &DVector<f64>) -> DVector<f64> {
        v.clone()
    }

    fn dual_norm(&self, v: &DVector<f64>) -> f64 {
        v.norm()
    }

    fn prepare(&mut self, _x: &DVector<f64>) {}
}

/// Diagonal preconditioner with fixed positive scaling factors, mainly
/// useful for badly scaled coordinates and for exercising non-identity
/// dual norms in tests.
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner {
    diagonal: DVector<f64>,
}

impl DiagonalPreconditioner {
    /// All entries of `diagonal` must be positive.
    pub fn new(diagonal: DVector<f64>) -> Self {
        assert!(
            diagonal.iter().all(|d| *d > 0.0),
            "diagonal preconditioner entries must be positive"
        );
        Self { diagonal }
    }
}

impl Preconditioner for DiagonalPreconditioner {
    fn solve(&self, v: &DVector<f64>) -> DVector<f64> {
        v.component_div(&self.diagonal)
    }

    fn dual_norm(&self, v: &DVector<f64>) -> f64 {
        v.iter()
            .zip(self.diagonal.iter())
            .map(|(vi, di)| vi * vi / di)
            .sum::<f64>()
            .sqrt()
    }

    fn prepare(&mut self, _x: &DVector<f64>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_dual_norm_is_euclidean() {
        let p = IdentityPreconditioner;
        let v = DVector::from_vec(vec![3.0, 4.0]);
        assert_relative_eq!(p.dual_norm(&v), 5.0, epsilon = 1e-14);
        assert_eq!(p.solve(&v), v);
    }

    #[test]
    fn diagonal_solve_divides_componentwise() {
        let p = DiagonalPreconditioner::new(DVector::from_vec(vec![2.0, 4.0]));
        let v = DVector::from_vec(vec![2.0, 8.0]);
        assert_eq!(p.solve(&v), DVector::from_vec(vec![1.0, 2.0]));
        assert_relative_eq!(p.dual_norm(&v), (2.0f64 + 16.0).sqrt(), epsilon = 1e-14);
    }
}
