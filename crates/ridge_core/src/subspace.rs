use crate::preconditioner::Preconditioner;
use crate::traits::GradientField;
use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Inputs for one direction construction at the current iterate.
#[derive(Debug)]
pub struct SubspaceRequest<'a> {
    /// Field value at `x`, always consistent with it.
    pub f0: &'a DVector<f64>,
    pub x: &'a DVector<f64>,
    /// Inexactness target for the inner solve, `eta * ‖f0‖_P`.
    pub target: f64,
    /// Maximum subspace dimension.
    pub kmax: usize,
    /// Prescribed number of negative Hessian eigenvalues at the sought
    /// critical point.
    pub saddle_index: usize,
    /// Warm-start subspace; columns seed the builder, may be empty.
    pub v0: &'a DMatrix<f64>,
    pub eig_atol: f64,
    pub eig_rtol: f64,
    /// Finite-difference increment for curvature probing.
    pub hfd: f64,
}

/// What a builder hands back to the driver.
#[derive(Debug, Clone)]
pub struct SubspaceStep {
    /// Search direction consumed once by the line search.
    pub p: DVector<f64>,
    /// Estimated gap between the eigenvalues straddling the target index.
    pub spectral_gap: f64,
    /// Field evaluations spent inside the builder.
    pub field_evals: usize,
    pub success: bool,
    /// `true` when `p` is a genuine (unmodified) Newton direction. `false`
    /// means at least one curvature mode was sign-flipped, so `p` ascends
    /// the merit function in that subspace and the ordinary Armijo search
    /// does not apply.
    pub is_newton: bool,
    /// Eigenvector estimate for the dominant flipped mode, passed forward
    /// as the rotation seed of the next build.
    pub eigenvector: Option<DVector<f64>>,
}

/// Constructs the index-constrained search direction each outer iteration.
///
/// The driver is agnostic to how the spectrum is resolved; a preconditioned
/// Lanczos process, randomized subspace iteration, or a dense
/// eigendecomposition all conform.
pub trait SubspaceBuilder {
    fn build(
        &mut self,
        field: &dyn GradientField,
        precond: &dyn Preconditioner,
        request: &SubspaceRequest<'_>,
    ) -> Result<SubspaceStep>;
}

/// Reference builder: assembles the Hessian by finite differences on the
/// gradient field, takes a dense symmetric eigendecomposition, and flips
/// the signs that disagree with the prescribed saddle index.
///
/// Costs `d` field evaluations per build, so it only suits small problems;
/// it exists to make the driver runnable end to end without an external
/// iterative eigensolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseFlipBuilder;

impl SubspaceBuilder for DenseFlipBuilder {
    fn build(
        &mut self,
        field: &dyn GradientField,
        _precond: &dyn Preconditioner,
        request: &SubspaceRequest<'_>,
    ) -> Result<SubspaceStep> {
        let d = field.dimension();
        if request.saddle_index > d {
            bail!(
                "saddle index {} exceeds the problem dimension {}.",
                request.saddle_index,
                d
            );
        }

        // Column j of the Hessian from a forward difference on the field,
        // then symmetrize; the field is a gradient so the asymmetry is pure
        // finite-difference noise.
        let mut hessian = DMatrix::<f64>::zeros(d, d);
        for j in 0..d {
            let mut xp = request.x.clone();
            xp[j] += request.hfd;
            let fj = field.eval(&xp);
            let col = (fj - request.f0) / request.hfd;
            hessian.set_column(j, &col);
        }
        hessian = (&hessian + hessian.transpose()) * 0.5;

        let eigen = SymmetricEigen::new(hessian);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));

        // Desired inertia: the lowest `saddle_index` modes negative, the
        // rest positive. A mode whose actual sign disagrees gets flipped.
        let mut p = DVector::<f64>::zeros(d);
        let mut flipped = false;
        for (rank, &idx) in order.iter().enumerate() {
            let lambda = eigen.eigenvalues[idx];
            let desired_sign = if rank < request.saddle_index { -1.0 } else { 1.0 };
            if lambda.signum() != desired_sign {
                flipped = true;
            }
            let effective = desired_sign * lambda.abs().max(request.eig_atol);
            let q = eigen.eigenvectors.column(idx);
            let coeff = q.dot(request.f0) / effective;
            p -= q * coeff;
        }

        let spectral_gap = if request.saddle_index > 0 && request.saddle_index < d {
            eigen.eigenvalues[order[request.saddle_index]]
                - eigen.eigenvalues[order[request.saddle_index - 1]]
        } else {
            0.0
        };
        let eigenvector = Some(eigen.eigenvectors.column(order[0]).into_owned());

        Ok(SubspaceStep {
            p,
            spectral_gap,
            field_evals: d,
            success: true,
            is_newton: !flipped,
            eigenvector,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::IdentityPreconditioner;
    use crate::traits::FnField;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn request<'a>(
        f0: &'a DVector<f64>,
        x: &'a DVector<f64>,
        saddle_index: usize,
        v0: &'a DMatrix<f64>,
    ) -> SubspaceRequest<'a> {
        SubspaceRequest {
            f0,
            x,
            target: 1e-8,
            kmax: 10,
            saddle_index,
            v0,
            eig_atol: 0.1,
            eig_rtol: 0.1,
            hfd: 1e-6,
        }
    }

    #[test]
    fn matching_inertia_yields_newton_direction() {
        // Gradient of x1^2 - x2^2: Hessian diag(2, -2), an index-1 saddle.
        let field = FnField::new(2, |x: &DVector<f64>| {
            DVector::from_vec(vec![2.0 * x[0], -2.0 * x[1]])
        });
        let x = DVector::from_vec(vec![0.4, 0.3]);
        let f0 = field.eval(&x);
        let v0 = DMatrix::zeros(2, 0);

        let mut builder = DenseFlipBuilder;
        let step = builder
            .build(&field, &IdentityPreconditioner, &request(&f0, &x, 1, &v0))
            .expect("build");

        assert!(step.is_newton);
        assert!(step.success);
        assert_eq!(step.field_evals, 2);
        // Newton step for a quadratic lands on the saddle in one move.
        assert_relative_eq!(&x + &step.p, DVector::zeros(2), epsilon = 1e-4);
        assert_relative_eq!(step.spectral_gap, 4.0, epsilon = 1e-4);
    }

    #[test]
    fn mismatched_inertia_flips_and_reports_non_newton() {
        // Same saddle, but we demand a minimum (index 0): the negative
        // mode has to be flipped.
        let field = FnField::new(2, |x: &DVector<f64>| {
            DVector::from_vec(vec![2.0 * x[0], -2.0 * x[1]])
        });
        let x = DVector::from_vec(vec![0.4, 0.3]);
        let f0 = field.eval(&x);
        let v0 = DMatrix::zeros(2, 0);

        let mut builder = DenseFlipBuilder;
        let step = builder
            .build(&field, &IdentityPreconditioner, &request(&f0, &x, 0, &v0))
            .expect("build");

        assert!(!step.is_newton);
        // Effective spectrum diag(2, 2): p = -diag(2,2)^{-1} f0, so the x2
        // component ascends where the plain Newton step would descend.
        assert_relative_eq!(
            step.p,
            DVector::from_vec(vec![-0.4, 0.3]),
            epsilon = 1e-4
        );
    }

    #[test]
    fn saddle_index_beyond_dimension_is_rejected() {
        let field = FnField::new(1, |x: &DVector<f64>| x.clone());
        let x = DVector::from_vec(vec![1.0]);
        let f0 = field.eval(&x);
        let v0 = DMatrix::zeros(1, 0);

        let mut builder = DenseFlipBuilder;
        let err = builder
            .build(&field, &IdentityPreconditioner, &request(&f0, &x, 3, &v0))
            .unwrap_err();
        assert!(err.to_string().contains("saddle index"));
    }
}
