//! Subspace arithmetic over basis-aligned wavefunctions.
//!
//! A wavefunction is a map from basis label to complex amplitude, covering all
//! 2^n labels for n qubits. A subspace is a set of basis labels, i.e. a
//! basis-aligned decomposition axis of the state space. Labels are binary
//! strings in MSB-first order: character 0 corresponds to the *last*
//! allocated qubit.
//!
//! All functions here are pure: they never touch a backend state. Projection
//! onto a subspace with (near-)zero overlap returns `None` rather than a
//! zero state, so callers can distinguish "no overlap" from a valid result.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use num_complex::Complex64;
use num_traits::Zero;

use crate::error::{Error, Result};

/// Sparse-or-dense wavefunction keyed by basis label.
pub type Wavefunction = BTreeMap<String, Complex64>;

/// A set of computational basis labels spanning a basis-aligned subspace.
pub type Subspace = Vec<String>;

/// Norm tolerance below which a wavefunction counts as invalid and an
/// amplitude counts as zero.
pub const NORM_TOL: f64 = 1e-7;

/// Convert an integer to its bitstring of the given width, MSB leftmost.
pub fn int_to_bitstring(value: u64, width: usize) -> String {
    (0..width)
        .rev()
        .map(|b| if value >> b & 1 == 1 { '1' } else { '0' })
        .collect()
}

/// Parse a basis label back into its integer index (MSB leftmost).
pub fn bitstring_to_index(label: &str) -> Result<u64> {
    let mut index = 0u64;
    for c in label.chars() {
        index = match c {
            '0' => index << 1,
            '1' => index << 1 | 1,
            _ => return Err(Error::InvalidBasisLabel(label.to_string())),
        };
    }
    Ok(index)
}

/// Euclidean norm of a wavefunction.
pub fn norm(wavefunc: &Wavefunction) -> f64 {
    wavefunc.values().map(|amp| amp.norm_sqr()).sum::<f64>().sqrt()
}

/// Zero every amplitude whose basis label is not in `subspace`.
///
/// Amplitude mass outside the subspace is discarded, not redistributed; the
/// result is generally unnormalized.
pub fn filter_subspace(wavefunc: &Wavefunction, subspace: &[String]) -> Wavefunction {
    let members: BTreeSet<&str> = subspace.iter().map(|s| s.as_str()).collect();
    wavefunc
        .iter()
        .map(|(label, amp)| {
            let kept = if members.contains(label.as_str()) {
                *amp
            } else {
                Complex64::zero()
            };
            (label.clone(), kept)
        })
        .collect()
}

/// Divide every amplitude by the wavefunction's norm.
///
/// Returns `None` (after a diagnostic) if the norm is below [`NORM_TOL`]:
/// callers must treat that as "no valid state", not as a crash.
pub fn renormalize(wavefunc: &Wavefunction) -> Option<Wavefunction> {
    let state_norm = norm(wavefunc);
    if state_norm < NORM_TOL {
        warn!("wavefunction norm {state_norm:e} is below tolerance; no valid state");
        return None;
    }
    Some(
        wavefunc
            .iter()
            .map(|(label, amp)| (label.clone(), amp / state_norm))
            .collect(),
    )
}

/// Inner product ⟨φ|ψ⟩ over the union of basis labels.
///
/// Labels missing from `phi` contribute zero amplitude. Requires `psi` to
/// have at least as many populated labels as `phi`.
pub fn overlap(psi: &Wavefunction, phi: &Wavefunction) -> Result<Complex64> {
    if psi.len() < phi.len() {
        return Err(Error::StateSizeMismatch {
            psi: psi.len(),
            phi: phi.len(),
        });
    }
    let mut inner = Complex64::zero();
    for (label, amp) in psi {
        let phi_amp = phi.get(label).copied().unwrap_or_else(Complex64::zero);
        inner += amp * phi_amp.conj();
    }
    Ok(inner)
}

/// True iff any basis label of `subspace` carries amplitude above tolerance.
///
/// The empty subspace has no overlap by definition.
pub fn overlaps_with_subspace(wavefunc: &Wavefunction, subspace: &[String]) -> bool {
    subspace.iter().any(|label| {
        wavefunc
            .get(label)
            .map(|amp| amp.norm() > NORM_TOL)
            .unwrap_or(false)
    })
}

/// Sum of squared amplitude magnitudes over the subspace's labels.
pub fn probability_in_subspace(wavefunc: &Wavefunction, subspace: &[String]) -> f64 {
    subspace
        .iter()
        .map(|label| wavefunc.get(label).map(|amp| amp.norm_sqr()).unwrap_or(0.0))
        .sum()
}

/// Filter then renormalize. `None` means zero overlap with the subspace.
pub fn project_wavefunction(wavefunc: &Wavefunction, subspace: &[String]) -> Option<Wavefunction> {
    renormalize(&filter_subspace(wavefunc, subspace))
}

/// Cartesian product of two basis-aligned subspaces, concatenating labels.
///
/// The empty list acts as the identity element. With `reverse` the
/// concatenation order is swapped (B then A).
pub fn outer_subspace_product(a: &[String], b: &[String], reverse: bool) -> Subspace {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() {
        return a.to_vec();
    }
    let mut product = Vec::with_capacity(a.len() * b.len());
    for label_a in a {
        for label_b in b {
            if reverse {
                product.push(format!("{label_b}{label_a}"));
            } else {
                product.push(format!("{label_a}{label_b}"));
            }
        }
    }
    product
}

/// All 2^n basis labels of length n, built by repeated outer products.
///
/// `n = 0` yields the empty set by convention (no degrees of freedom).
pub fn all_basis_vectors(n: usize) -> Subspace {
    if n == 0 {
        return Vec::new();
    }
    let one_dim = vec!["0".to_string(), "1".to_string()];
    let mut basis = one_dim.clone();
    for _ in 1..n {
        basis = outer_subspace_product(&one_dim, &basis, false);
    }
    basis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_pair() -> Wavefunction {
        let amp = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        let mut wf = Wavefunction::new();
        wf.insert("00".to_string(), amp);
        wf.insert("01".to_string(), Complex64::zero());
        wf.insert("10".to_string(), amp);
        wf.insert("11".to_string(), Complex64::zero());
        wf
    }

    #[test]
    fn test_all_basis_vectors_counts() {
        for n in 0..=6 {
            let basis = all_basis_vectors(n);
            let expected = if n == 0 { 0 } else { 1 << n };
            assert_eq!(basis.len(), expected, "2^{} labels expected", n);
            assert!(basis.iter().all(|label| label.len() == n));
            let distinct: BTreeSet<&String> = basis.iter().collect();
            assert_eq!(distinct.len(), basis.len(), "labels must be distinct");
        }
    }

    #[test]
    fn test_bitstring_roundtrip() {
        for v in 0..16u64 {
            let label = int_to_bitstring(v, 4);
            assert_eq!(bitstring_to_index(&label).unwrap(), v);
        }
        assert_eq!(int_to_bitstring(5, 4), "0101");
        assert!(bitstring_to_index("01x1").is_err());
    }

    #[test]
    fn test_renormalize_unit_norm() {
        let mut wf = Wavefunction::new();
        wf.insert("0".to_string(), Complex64::new(3.0, 0.0));
        wf.insert("1".to_string(), Complex64::new(0.0, 4.0));
        let normd = renormalize(&wf).expect("valid state");
        assert!((norm(&normd) - 1.0).abs() < NORM_TOL);
    }

    #[test]
    fn test_renormalize_zero_norm_is_none() {
        let mut wf = Wavefunction::new();
        wf.insert("0".to_string(), Complex64::zero());
        wf.insert("1".to_string(), Complex64::new(1e-9, 0.0));
        assert!(renormalize(&wf).is_none(), "near-zero norm must be invalid");
    }

    #[test]
    fn test_projection_idempotent() {
        let wf = uniform_pair();
        let subspace = vec!["00".to_string(), "01".to_string()];
        let once = project_wavefunction(&wf, &subspace).unwrap();
        let twice = project_wavefunction(&once, &subspace).unwrap();
        for (label, amp) in &once {
            assert!((amp - twice[label]).norm() < NORM_TOL, "projection must be idempotent");
        }
    }

    #[test]
    fn test_projection_zero_overlap() {
        let wf = uniform_pair();
        let subspace = vec!["01".to_string(), "11".to_string()];
        assert!(project_wavefunction(&wf, &subspace).is_none());
    }

    #[test]
    fn test_overlaps_with_subspace() {
        let wf = uniform_pair();
        assert!(overlaps_with_subspace(&wf, &["00".to_string()]));
        assert!(!overlaps_with_subspace(&wf, &["01".to_string()]));
        assert!(!overlaps_with_subspace(&wf, &[]), "empty subspace has no overlap");
    }

    #[test]
    fn test_probability_in_subspace() {
        let wf = uniform_pair();
        let p = probability_in_subspace(&wf, &["00".to_string(), "01".to_string()]);
        assert!((p - 0.5).abs() < 1e-12);
        assert_eq!(probability_in_subspace(&wf, &[]), 0.0);
    }

    #[test]
    fn test_overlap_inner_product() {
        let wf = uniform_pair();
        let inner = overlap(&wf, &wf).unwrap();
        assert!((inner.re - 1.0).abs() < 1e-12);
        assert!(inner.im.abs() < 1e-12);

        let mut small = Wavefunction::new();
        small.insert("00".to_string(), Complex64::new(1.0, 0.0));
        let inner = overlap(&wf, &small).unwrap();
        assert!((inner.re - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!(overlap(&small, &wf).is_err(), "|psi| must not be smaller than |phi|");
    }

    #[test]
    fn test_outer_product_identity_and_order() {
        let a = vec!["0".to_string(), "1".to_string()];
        assert_eq!(outer_subspace_product(&[], &a, false), a);
        assert_eq!(outer_subspace_product(&a, &[], false), a);

        let b = vec!["10".to_string()];
        assert_eq!(
            outer_subspace_product(&a, &b, false),
            vec!["010".to_string(), "110".to_string()]
        );
        assert_eq!(
            outer_subspace_product(&a, &b, true),
            vec!["100".to_string(), "101".to_string()]
        );
    }
}
