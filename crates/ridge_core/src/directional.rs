use crate::traits::GradientField;
use nalgebra::DVector;

/// Forward-difference approximation of the directional derivative
/// `f'(x) · w`, the only way the solver ever touches the Jacobian.
///
/// `f0` must be `field.eval(x)`; passing it in avoids re-evaluating the
/// field at the base point. Costs exactly one field evaluation, or zero
/// when `w` is the zero vector (degenerate direction, nothing to probe).
///
/// The increment starts from `hfd`, is scaled by `max(|x·w|/‖w‖, 1)` with
/// the sign of `x·w` when that projection is nonzero, and is divided by
/// `‖w‖` so the absolute perturbation along `w` stays controlled. A
/// non-finite field value propagates to the caller unguarded.
pub fn directional_derivative(
    x: &DVector<f64>,
    w: &DVector<f64>,
    field: &dyn GradientField,
    f0: &DVector<f64>,
    hfd: f64,
) -> DVector<f64> {
    let norm_w = w.norm();
    if norm_w == 0.0 {
        return DVector::zeros(f0.len());
    }

    let xs = x.dot(w) / norm_w;
    let mut eps = hfd;
    if xs != 0.0 {
        eps *= xs.abs().max(1.0) * xs.signum();
    }
    eps /= norm_w;

    let f1 = field.eval(&(x + w * eps));
    (f1 - f0) / eps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FnField;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use std::cell::Cell;

    #[test]
    fn zero_direction_returns_zero_without_evaluating() {
        let calls = Cell::new(0usize);
        let field = FnField::new(2, |x: &DVector<f64>| {
            calls.set(calls.get() + 1);
            x.clone()
        });
        let x = DVector::from_vec(vec![1.0, -2.0]);
        let f0 = field.eval(&x);
        calls.set(0);

        let d = directional_derivative(&x, &DVector::zeros(2), &field, &f0, 1e-7);
        assert_eq!(d, DVector::zeros(2));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn linear_field_is_differentiated_exactly() {
        let a = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 3.0, -1.0, 0.0, -1.0, 4.0]);
        let a2 = a.clone();
        let field = FnField::new(3, move |x: &DVector<f64>| &a2 * x);
        let x = DVector::from_vec(vec![0.3, -0.7, 1.1]);
        let w = DVector::from_vec(vec![1.0, 2.0, -0.5]);
        let f0 = field.eval(&x);

        let d = directional_derivative(&x, &w, &field, &f0, 1e-7);
        let exact = &a * &w;
        assert_relative_eq!(d, exact, epsilon = 1e-5);
    }

    #[test]
    fn quadratic_field_matches_analytic_jacobian_action() {
        // f(x) = [x1^2, x1 x2], f'(x) w = [2 x1 w1, x2 w1 + x1 w2]
        let field = FnField::new(2, |x: &DVector<f64>| {
            DVector::from_vec(vec![x[0] * x[0], x[0] * x[1]])
        });
        let x = DVector::from_vec(vec![1.5, -0.5]);
        let w = DVector::from_vec(vec![0.2, 1.0]);
        let f0 = field.eval(&x);

        let d = directional_derivative(&x, &w, &field, &f0, 1e-7);
        let exact = DVector::from_vec(vec![2.0 * 1.5 * 0.2, -0.5 * 0.2 + 1.5 * 1.0]);
        assert_relative_eq!(d, exact, epsilon = 1e-5);
    }
}
