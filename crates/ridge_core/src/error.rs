use thiserror::Error;

/// Hard-stop conditions of the stabilized Newton driver.
///
/// Everything else (non-convergence within the evaluation budget, GMRES
/// stagnation) is reported through result values rather than errors.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The Armijo backtracking step size collapsed below its floor before
    /// reaching sufficient decrease. The search direction is not usable and
    /// the run cannot continue.
    #[error("Armijo line search failed: step size {alpha:e} fell below 1e-8")]
    ArmijoFailure { alpha: f64 },

    /// An unrecognized Krylov seed policy name was supplied.
    #[error("unknown krylovinit policy {0:?} (expected res, rand, rot, or resrot)")]
    UnknownKrylovInit(String),
}
