use nalgebra::DVector;

/// A vector field `f: R^d -> R^d`, typically the gradient of a scalar
/// potential. The solver treats evaluations as black-box and potentially
/// expensive; every call is charged against the driver's evaluation budget.
pub trait GradientField {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the field at `x`.
    fn eval(&self, x: &DVector<f64>) -> DVector<f64>;
}

/// Wraps a closure as a [`GradientField`]. Handy for tests and small
/// problems where defining a struct per field would be noise.
pub struct FnField<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    dim: usize,
    f: F,
}

impl<F> FnField<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F> GradientField for FnField<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    fn dimension(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &DVector<f64>) -> DVector<f64> {
        (self.f)(x)
    }
}
