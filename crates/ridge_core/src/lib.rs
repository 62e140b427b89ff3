/// The `ridge_core` crate implements a Jacobian-free Newton-Krylov solver
/// specialized to critical points of a scalar potential with a prescribed
/// saddle index: points where the Hessian carries an exact number of
/// negative eigenvalues, not just any zero of the gradient.
///
/// Key components:
/// - **Traits**: `GradientField` (the black-box gradient), `Preconditioner`
///   (solve / dual-norm / prepare), `SubspaceBuilder` (direction
///   construction behind a fixed contract).
/// - **Kernels**: finite-difference directional derivatives and Givens
///   rotation application, the pieces the linear solver is built from.
/// - **GMRES**: a no-restart Arnoldi solver whose matrix-vector products
///   are directional derivatives of the field.
/// - **Driver**: the stabilized Newton outer loop with eigenvalue-flip
///   handling, a mixed line search, and Eisenstat-Walker forcing terms.
pub mod directional;
pub mod error;
pub mod givens;
pub mod gmres;
pub mod newton;
pub mod preconditioner;
pub mod subspace;
pub mod traits;

pub use error::SolverError;
pub use gmres::{gmres, GmresOutcome, GmresSettings, Reorthogonalization};
pub use newton::{solve_saddle, KrylovInit, SaddleResult, SaddleSettings, StepKind};
pub use preconditioner::{IdentityPreconditioner, Preconditioner};
pub use subspace::{DenseFlipBuilder, SubspaceBuilder, SubspaceRequest, SubspaceStep};
pub use traits::{FnField, GradientField};
