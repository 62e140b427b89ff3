use num_complex::ComplexFloat;

/// Applies a stored sequence of Givens rotations to a vector.
///
/// Rotation `i` acts on the adjacent pair `(v[i], v[i+1])`:
///
/// ```text
/// w1 = c[i]·v[i] − s[i]·v[i+1]
/// w2 = s[i]·v[i] + conj(c[i])·v[i+1]
/// ```
///
/// The conjugate on the second term makes the same code correct for both
/// real and complex scalars. Pure function; inputs are not mutated.
///
/// # Panics
///
/// Panics if `c` and `s` differ in length or `vin` is shorter than
/// `c.len() + 1`.
pub fn apply_rotations<T: ComplexFloat>(c: &[T], s: &[T], vin: &[T]) -> Vec<T> {
    assert_eq!(c.len(), s.len(), "mismatched rotation coefficient arrays");
    assert!(
        vin.len() > c.len(),
        "vector too short for the rotation sequence"
    );

    let mut vrot = vin.to_vec();
    for i in 0..c.len() {
        let w1 = c[i] * vrot[i] - s[i] * vrot[i + 1];
        let w2 = s[i] * vrot[i] + c[i].conj() * vrot[i + 1];
        vrot[i] = w1;
        vrot[i + 1] = w2;
    }
    vrot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex;

    #[test]
    fn real_rotation_preserves_pair_norm() {
        let theta: f64 = 0.37;
        let c = [theta.cos()];
        let s = [theta.sin()];
        let vin = [3.0, -4.0];

        let vrot = apply_rotations(&c, &s, &vin);
        let before = (vin[0] * vin[0] + vin[1] * vin[1]).sqrt();
        let after = (vrot[0] * vrot[0] + vrot[1] * vrot[1]).sqrt();
        assert_relative_eq!(before, after, epsilon = 1e-14);
    }

    #[test]
    fn sequence_of_rotations_preserves_total_norm() {
        let angles = [0.1, -1.2, 2.5, 0.9];
        let c: Vec<f64> = angles.iter().map(|a| a.cos()).collect();
        let s: Vec<f64> = angles.iter().map(|a| a.sin()).collect();
        let vin = [1.0, -2.0, 0.5, 3.0, -1.5];

        let vrot = apply_rotations(&c, &s, &vin);
        let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert_relative_eq!(norm(&vin), norm(&vrot), epsilon = 1e-13);
    }

    #[test]
    fn complex_rotation_uses_conjugate_and_preserves_norm() {
        // Unitary pair: |c|^2 + |s|^2 = 1, sine real as in complex QR.
        let c = [Complex::new(0.0, 0.6)];
        let s = [Complex::new(0.8, 0.0)];
        let vin = [Complex::new(1.0, -1.0), Complex::new(2.0, 0.5)];

        let vrot = apply_rotations(&c, &s, &vin);
        let norm_sqr =
            |v: &[Complex<f64>]| v.iter().map(|z| z.norm_sqr()).sum::<f64>();
        assert_relative_eq!(norm_sqr(&vin), norm_sqr(&vrot), epsilon = 1e-13);

        let w2 = s[0] * vin[0] + c[0].conj() * vin[1];
        assert_relative_eq!(vrot[1].re, w2.re, epsilon = 1e-14);
        assert_relative_eq!(vrot[1].im, w2.im, epsilon = 1e-14);
    }

    #[test]
    fn identity_rotation_is_a_no_op() {
        let c = [1.0f64, 1.0];
        let s = [0.0f64, 0.0];
        let vin = [1.0, 2.0, 3.0];
        assert_eq!(apply_rotations(&c, &s, &vin), vin.to_vec());
    }
}
