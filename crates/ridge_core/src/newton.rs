use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use crate::subspace::{SubspaceBuilder, SubspaceRequest};
use crate::traits::GradientField;
use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const ETA_MAX: f64 = 0.5;
const GAMMA: f64 = 0.9;
const C_ARMIJO: f64 = 1e-4;
const ALPHA_FLOOR: f64 = 1e-8;

/// How the warm-start subspace handed to the builder is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KrylovInit {
    /// Preconditioned residual, `-P^{-1} f0`.
    Res,
    /// Preconditioned random vector.
    Rand,
    /// Previous eigenvector estimate (falls back to `Res` before one
    /// exists).
    Rot,
    /// Residual and previous eigenvector side by side.
    #[default]
    ResRot,
}

impl FromStr for KrylovInit {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "res" => Ok(Self::Res),
            "rand" => Ok(Self::Rand),
            "rot" => Ok(Self::Rot),
            "resrot" => Ok(Self::ResRot),
            other => Err(SolverError::UnknownKrylovInit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SaddleSettings {
    /// Convergence threshold on the residual ∞-norm.
    pub tol: f64,
    /// Field-evaluation budget for the whole run.
    pub max_evals: usize,
    /// Cap on the ∞-norm of any accepted step.
    pub max_step: f64,
    /// Finite-difference increment.
    pub hfd: f64,
    pub eig_atol: f64,
    pub eig_rtol: f64,
    /// 0 = silent, 1 = per-iteration progress, >2 = debug trace.
    pub verbose: u8,
    pub krylov_init: KrylovInit,
}

impl Default for SaddleSettings {
    fn default() -> Self {
        Self {
            tol: 1e-5,
            max_evals: 200,
            max_step: f64::INFINITY,
            hfd: 1e-7,
            eig_atol: 0.1,
            eig_rtol: 0.1,
            verbose: 0,
            krylov_init: KrylovInit::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Genuine Newton direction, accepted through the Armijo search.
    Newton,
    /// Eigenvalue-flipped direction, accepted through the crude fallback.
    Flipped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IterationRecord {
    pub residual_norm: f64,
    pub dual_norm: f64,
    pub step_kind: StepKind,
    pub alpha: f64,
    pub step_inf: f64,
    pub eta: f64,
}

#[derive(Debug, Clone)]
pub struct SaddleResult {
    pub x: DVector<f64>,
    pub residual_norm: f64,
    pub field_evals: usize,
    pub iterations: usize,
    pub converged: bool,
    pub history: Vec<IterationRecord>,
}

/// Stabilized Newton iteration toward a critical point with the prescribed
/// saddle index.
///
/// Each outer iteration asks `builder` for a direction at the inexactness
/// target `eta * ‖f0‖_P`, runs the line search matching the direction kind
/// (Armijo for genuine Newton directions, the crude secant fallback for
/// eigenvalue-flipped ones), refreshes the preconditioner at the accepted
/// point, and updates the Eisenstat-Walker forcing term. Terminates when
/// `‖f0‖_∞ ≤ tol` or the evaluation budget runs out; the latter returns the
/// best iterate with `converged = false` and a warning.
pub fn solve_saddle(
    field: &dyn GradientField,
    builder: &mut dyn SubspaceBuilder,
    precond: &mut dyn Preconditioner,
    x0: DVector<f64>,
    saddle_index: usize,
    settings: &SaddleSettings,
    v0: Option<DMatrix<f64>>,
) -> Result<SaddleResult> {
    let d = field.dimension();
    if d == 0 {
        bail!("Field has zero dimension.");
    }
    if x0.len() != d {
        bail!(
            "Initial point dimension mismatch. Expected {}, got {}.",
            d,
            x0.len()
        );
    }
    if settings.tol <= 0.0 {
        bail!("tol must be positive.");
    }
    if settings.max_evals == 0 {
        bail!("max_evals must be greater than zero.");
    }
    if settings.hfd <= 0.0 {
        bail!("hfd must be positive.");
    }

    let kmax = d.min(40);
    let mut evals = 0usize;
    let mut x = x0;
    let mut f0 = field.eval(&x);
    evals += 1;
    let mut res = f0.amax();
    precond.prepare(&x);
    let mut dual = precond.dual_norm(&f0);

    let mut eta = ETA_MAX;
    let mut alpha_old = 1.0;
    let mut rotation_seed: Option<DVector<f64>> = None;
    let mut user_v0 = v0;
    let mut history: Vec<IterationRecord> = Vec::new();
    let mut iterations = 0usize;
    let mut converged = false;

    loop {
        if res <= settings.tol {
            converged = true;
            break;
        }
        if evals >= settings.max_evals {
            log::warn!(
                "saddle search did not converge: {} field evaluations spent, ‖f‖_∞ = {:e}",
                evals,
                res
            );
            break;
        }

        let seed = match user_v0.take() {
            Some(v) => v,
            None => seed_subspace(
                settings.krylov_init,
                precond,
                &f0,
                rotation_seed.as_ref(),
                d,
            ),
        };
        let request = SubspaceRequest {
            f0: &f0,
            x: &x,
            target: eta * dual,
            kmax,
            saddle_index,
            v0: &seed,
            eig_atol: settings.eig_atol,
            eig_rtol: settings.eig_rtol,
            hfd: settings.hfd,
        };
        let step = builder.build(field, precond, &request)?;
        evals += step.field_evals;
        if step.eigenvector.is_some() {
            rotation_seed = step.eigenvector.clone();
        }
        if !step.success && settings.verbose > 2 {
            log::debug!("subspace builder reported an unconverged direction; proceeding");
        }

        let (x_new, f_new, alpha, search_evals, kind) = if step.is_newton {
            let (xt, ft, alpha, used) =
                armijo_search(field, precond, &x, &step.p, dual, settings.max_step)?;
            (xt, ft, alpha, used, StepKind::Newton)
        } else {
            let (xt, ft, alpha, used) =
                flipped_fallback(field, &x, &step.p, &f0, alpha_old, settings.max_step);
            (xt, ft, alpha, used, StepKind::Flipped)
        };
        evals += search_evals;

        let step_inf = alpha * step.p.amax();
        x = x_new;
        f0 = f_new;
        alpha_old = alpha;
        res = f0.amax();
        precond.prepare(&x);
        let dual_new = precond.dual_norm(&f0);

        // Eisenstat-Walker forcing term.
        let rat = dual_new / dual;
        let mut eta_new = GAMMA * rat * rat;
        let carry = GAMMA * eta * eta;
        if carry > 0.1 {
            eta_new = eta_new.max(carry);
        }
        eta_new = eta_new.min(ETA_MAX);
        if dual_new > 0.0 {
            eta_new = eta_new.max(0.5 * settings.tol / dual_new);
        }
        eta = eta_new;
        dual = dual_new;

        iterations += 1;
        history.push(IterationRecord {
            residual_norm: res,
            dual_norm: dual,
            step_kind: kind,
            alpha,
            step_inf,
            eta,
        });

        if settings.verbose >= 1 {
            log::info!(
                "iter {:3}  ‖f‖_∞ = {:10.3e}  evals = {:4}  {:?}",
                iterations,
                res,
                evals,
                kind
            );
        }
        if settings.verbose > 2 {
            log::debug!(
                "iter {:3}  alpha = {:.3e}  step_inf = {:.3e}  eta = {:.3e}  dual = {:.3e}",
                iterations,
                alpha,
                step_inf,
                eta,
                dual
            );
        }
    }

    Ok(SaddleResult {
        x,
        residual_norm: res,
        field_evals: evals,
        iterations,
        converged,
        history,
    })
}

fn seed_subspace(
    policy: KrylovInit,
    precond: &dyn Preconditioner,
    f0: &DVector<f64>,
    rotation_seed: Option<&DVector<f64>>,
    d: usize,
) -> DMatrix<f64> {
    let residual_column = || -precond.solve(f0);
    match policy {
        KrylovInit::Res => DMatrix::from_columns(&[residual_column()]),
        KrylovInit::Rand => {
            let mut rng = rand::thread_rng();
            let noise = DVector::from_fn(d, |_, _| rng.gen::<f64>() - 0.5);
            DMatrix::from_columns(&[precond.solve(&noise)])
        }
        KrylovInit::Rot => match rotation_seed {
            Some(v) => DMatrix::from_columns(&[v.clone()]),
            None => DMatrix::from_columns(&[residual_column()]),
        },
        KrylovInit::ResRot => match rotation_seed {
            Some(v) => DMatrix::from_columns(&[residual_column(), v.clone()]),
            None => DMatrix::from_columns(&[residual_column()]),
        },
    }
}

/// Backtracking Armijo search on `φ(α) = ‖field(x + α p)‖_P`. The first
/// backtrack halves `α`; later ones interpolate through [`parab3p`].
fn armijo_search(
    field: &dyn GradientField,
    precond: &dyn Preconditioner,
    x: &DVector<f64>,
    p: &DVector<f64>,
    phi0: f64,
    max_step: f64,
) -> Result<(DVector<f64>, DVector<f64>, f64, usize)> {
    let pinf = p.amax();
    let mut alpha = if max_step.is_finite() && pinf > 0.0 {
        (max_step / pinf).min(1.0)
    } else {
        1.0
    };

    let ff0 = phi0 * phi0;
    let mut evals = 0usize;
    let mut xt = x + p * alpha;
    let mut ft = field.eval(&xt);
    evals += 1;
    let mut phit = precond.dual_norm(&ft);

    let mut lamc = alpha;
    let mut lamm = alpha;
    let mut ffc = phit * phit;
    let mut ffm = ffc;
    let mut iarm = 0usize;

    while phit >= (1.0 - C_ARMIJO * alpha) * phi0 {
        if iarm == 0 {
            alpha *= 0.5;
        } else {
            alpha = parab3p(lamc, lamm, ff0, ffc, ffm);
        }
        if alpha < ALPHA_FLOOR {
            return Err(SolverError::ArmijoFailure { alpha }.into());
        }

        xt = x + p * alpha;
        lamm = lamc;
        lamc = alpha;
        ft = field.eval(&xt);
        evals += 1;
        phit = precond.dual_norm(&ft);
        ffm = ffc;
        ffc = phit * phit;
        iarm += 1;
    }

    Ok((xt, ft, alpha, evals))
}

/// Three-point safeguarded parabolic model for the next step length, fit
/// through `(0, ff0)`, `(lambdac, ffc)`, `(lambdam, ffm)` and clamped to
/// `[0.1, 0.5] * lambdac`.
fn parab3p(lambdac: f64, lambdam: f64, ff0: f64, ffc: f64, ffm: f64) -> f64 {
    const SIGMA0: f64 = 0.1;
    const SIGMA1: f64 = 0.5;

    let c2 = lambdam * (ffc - ff0) - lambdac * (ffm - ff0);
    if c2 >= 0.0 {
        return SIGMA1 * lambdac;
    }
    let c1 = lambdac * lambdac * (ffm - ff0) - lambdam * lambdam * (ffc - ff0);
    let lambdap = -c1 * 0.5 / c2;
    lambdap.clamp(SIGMA0 * lambdac, SIGMA1 * lambdac)
}

/// Step policy along an eigenvalue-flipped direction, where no admissible
/// descent merit function exists: a crude trial step seeded by the previous
/// accepted length, optionally corrected once by the secant root of
/// `g(t) = (1-t)(f0·p) + t(ft·p)`. Inner products are unpreconditioned.
fn flipped_fallback(
    field: &dyn GradientField,
    x: &DVector<f64>,
    p: &DVector<f64>,
    f0: &DVector<f64>,
    alpha_old: f64,
    max_step: f64,
) -> (DVector<f64>, DVector<f64>, f64, usize) {
    let pinf = p.amax();
    let cap = if max_step.is_finite() && pinf > 0.0 {
        max_step / pinf
    } else {
        f64::INFINITY
    };

    let alpha = (0.66 * alpha_old).min(cap);
    let xt = x + p * alpha;
    let ft = field.eval(&xt);
    let mut evals = 1usize;

    let slope0 = f0.dot(p);
    let slope_t = ft.dot(p);
    let denom = slope0 - slope_t;
    if denom.abs() > 1e-4 {
        let t = (slope0 / denom).clamp(0.1, 4.0);
        let alpha_c = (t * alpha).min(cap);
        let xc = x + p * alpha_c;
        let fc = field.eval(&xc);
        evals += 1;
        // Revert if the corrected step overshoots the secant model.
        if fc.dot(p).abs() <= slope_t.abs() {
            return (xc, fc, alpha_c, evals);
        }
    }

    (xt, ft, alpha, evals)
}
