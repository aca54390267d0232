//! Dense statevector backend.
//!
//! Holds the single backend state a `QuantumSystem` owns: a complex amplitude
//! vector over all 2^n basis states, with qubit `i` mapped to bit `i` of the
//! state index (LSB-first internally). Basis labels exposed through
//! [`StateVector::wavefunction`] are MSB-first, so label character 0 is the
//! last allocated qubit — the two orderings are never conflated.
//!
//! The surface is exactly what the core needs from a backend: allocate,
//! apply a (controlled) single-qubit unitary, permute under a register
//! modular-add, measure-and-collapse, and expose the label-indexed state.
//! No circuit compilation, no gate-count optimization.

use num_complex::Complex64;
use num_traits::{One, Zero};
use rand::Rng;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::subspace::{bitstring_to_index, int_to_bitstring, renormalize, Wavefunction};

/// A single-qubit unitary, row-major: `u[row][col]`.
pub type Matrix2 = [[Complex64; 2]; 2];

/// The Hadamard gate.
pub fn hadamard() -> Matrix2 {
    let h = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
    [[h, h], [h, -h]]
}

/// The Pauli-X (bit flip) gate.
pub fn pauli_x() -> Matrix2 {
    let o = Complex64::one();
    let z = Complex64::zero();
    [[z, o], [o, z]]
}

/// Real rotation preparing `c0|0> + c1|1>` from `|0>`.
///
/// Protocol authors use this for biased initial states such as
/// `sqrt(1/3)|0> + sqrt(2/3)|1>`.
pub fn amplitude_rotation(c0: f64, c1: f64) -> Matrix2 {
    [
        [Complex64::new(c0, 0.0), Complex64::new(-c1, 0.0)],
        [Complex64::new(c1, 0.0), Complex64::new(c0, 0.0)],
    ]
}

/// Dense state vector over `n` qubits, initialized to the all-zero label.
#[derive(Debug, Clone)]
pub struct StateVector {
    n_qubits: usize,
    amps: Vec<Complex64>,
}

impl StateVector {
    /// Allocate `n` qubits in state |0...0>.
    pub fn new(n_qubits: usize) -> Self {
        let mut amps = vec![Complex64::zero(); 1 << n_qubits];
        amps[0] = Complex64::one();
        Self { n_qubits, amps }
    }

    pub fn n_qubits(&self) -> usize {
        self.n_qubits
    }

    /// Dimension of the state space (2^n).
    pub fn dim(&self) -> usize {
        self.amps.len()
    }

    /// Apply a single-qubit unitary to `target`, controlled on every qubit
    /// in `controls` being |1>.
    pub fn apply_controlled(&mut self, u: &Matrix2, target: usize, controls: &[usize]) {
        debug_assert!(target < self.n_qubits);
        debug_assert!(!controls.contains(&target));
        let t = 1usize << target;
        let cmask = bit_mask(controls);
        for i0 in 0..self.amps.len() {
            if i0 & t != 0 || i0 & cmask != cmask {
                continue;
            }
            let i1 = i0 | t;
            let a0 = self.amps[i0];
            let a1 = self.amps[i1];
            self.amps[i0] = u[0][0] * a0 + u[0][1] * a1;
            self.amps[i1] = u[1][0] * a0 + u[1][1] * a1;
        }
    }

    /// Apply a single-qubit unitary to `target`.
    pub fn apply(&mut self, u: &Matrix2, target: usize) {
        self.apply_controlled(u, target, &[]);
    }

    /// Flip `target` (Pauli-X shortcut).
    pub fn apply_x(&mut self, target: usize) {
        self.apply(&pauli_x(), target);
    }

    /// Add the value of register `src` into register `dst`, modulo
    /// `2^dst.len()`, controlled on `controls`; with `reverse` the exact
    /// inverse (modular subtract) is applied instead.
    ///
    /// Register qubit `i` carries bit `i` of the register value (LSB-first).
    /// This is a permutation of basis states and therefore exactly unitary
    /// and exactly reversible.
    pub fn add_register(&mut self, src: &[usize], dst: &[usize], reverse: bool, controls: &[usize]) {
        debug_assert!(dst.iter().all(|q| !src.contains(q) && !controls.contains(q)));
        let modulus = 1u64 << dst.len();
        let cmask = bit_mask(controls);
        let mut permuted = vec![Complex64::zero(); self.amps.len()];
        for idx in 0..self.amps.len() {
            if idx & cmask != cmask {
                permuted[idx] = self.amps[idx];
                continue;
            }
            let a = read_bits(idx, src) % modulus;
            let b = read_bits(idx, dst);
            let sum = if reverse {
                (b + modulus - a) % modulus
            } else {
                (b + a) % modulus
            };
            let target = write_bits(idx, dst, sum);
            permuted[target] = self.amps[idx];
        }
        self.amps = permuted;
    }

    /// Measure the given qubits, collapsing the state. Returns the sampled
    /// value with `qubits[i]` contributing bit `i`.
    pub fn measure<R: Rng>(&mut self, qubits: &[usize], rng: &mut R) -> u64 {
        let n_outcomes = 1usize << qubits.len();
        let mut probs = vec![0.0f64; n_outcomes];
        for (idx, amp) in self.amps.iter().enumerate() {
            probs[read_bits(idx, qubits) as usize] += amp.norm_sqr();
        }

        let total: f64 = probs.iter().sum();
        let mut r = rng.gen::<f64>() * total;
        let mut outcome = n_outcomes - 1;
        for (v, p) in probs.iter().enumerate() {
            if r < *p {
                outcome = v;
                break;
            }
            r -= p;
        }

        let scale = probs[outcome].sqrt();
        for (idx, amp) in self.amps.iter_mut().enumerate() {
            if read_bits(idx, qubits) as usize == outcome {
                *amp /= scale;
            } else {
                *amp = Complex64::zero();
            }
        }
        outcome as u64
    }

    /// The full wavefunction keyed by MSB-first basis labels.
    pub fn wavefunction(&self) -> Wavefunction {
        self.amps
            .iter()
            .enumerate()
            .map(|(idx, amp)| (int_to_bitstring(idx as u64, self.n_qubits), *amp))
            .collect()
    }

    /// Overwrite the state with a custom wavefunction.
    ///
    /// The map must enumerate every basis state of the full space, even those
    /// with zero amplitude. The input is renormalized before being applied; a
    /// zero-norm input is rejected without touching the state.
    pub fn set_wavefunction(&mut self, wavefunc: &Wavefunction) -> Result<()> {
        if wavefunc.len() != self.amps.len() {
            return Err(Error::IncompleteWavefunction {
                expected: self.amps.len(),
                got: wavefunc.len(),
            });
        }
        let normalized = renormalize(wavefunc).ok_or(Error::ZeroNorm)?;
        let mut amps = vec![Complex64::zero(); self.amps.len()];
        for (label, amp) in &normalized {
            if label.len() != self.n_qubits {
                return Err(Error::InvalidBasisLabel(label.clone()));
            }
            amps[bitstring_to_index(label)? as usize] = *amp;
        }
        self.amps = amps;
        Ok(())
    }
}

fn bit_mask(qubits: &[usize]) -> usize {
    qubits.iter().fold(0usize, |mask, &q| mask | 1 << q)
}

/// Extract the register value stored in `qubits` from a state index.
fn read_bits(index: usize, qubits: &[usize]) -> u64 {
    qubits
        .iter()
        .enumerate()
        .fold(0u64, |value, (i, &q)| value | ((index >> q & 1) as u64) << i)
}

/// Replace the register bits of `qubits` in a state index with `value`.
fn write_bits(index: usize, qubits: &[usize], value: u64) -> usize {
    let mut out = index;
    for (i, &q) in qubits.iter().enumerate() {
        out = (out & !(1usize << q)) | (((value >> i & 1) as usize) << q);
    }
    out
}

/// Collect the qubit indices of a contiguous range.
pub(crate) fn range_qubits(range: &std::ops::Range<usize>) -> SmallVec<[usize; 8]> {
    range.clone().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn amp_at(sv: &StateVector, label: &str) -> Complex64 {
        sv.wavefunction()[label]
    }

    #[test]
    fn test_fresh_state_is_all_zero() {
        let sv = StateVector::new(3);
        assert_eq!(sv.dim(), 8);
        assert!((amp_at(&sv, "000").re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_x_flips_lsb_qubit() {
        let mut sv = StateVector::new(2);
        sv.apply_x(0);
        // qubit 0 is the rightmost label character
        assert!((amp_at(&sv, "01").re - 1.0).abs() < 1e-12);
        sv.apply_x(1);
        assert!((amp_at(&sv, "11").re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hadamard_uniform_superposition() {
        let mut sv = StateVector::new(1);
        sv.apply(&hadamard(), 0);
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((amp_at(&sv, "0").re - h).abs() < 1e-12);
        assert!((amp_at(&sv, "1").re - h).abs() < 1e-12);
        // H is self-inverse
        sv.apply(&hadamard(), 0);
        assert!((amp_at(&sv, "0").re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_controlled_unitary_respects_control() {
        let mut sv = StateVector::new(2);
        sv.apply_controlled(&pauli_x(), 1, &[0]);
        // control qubit 0 is |0>: nothing happens
        assert!((amp_at(&sv, "00").re - 1.0).abs() < 1e-12);
        sv.apply_x(0);
        sv.apply_controlled(&pauli_x(), 1, &[0]);
        assert!((amp_at(&sv, "11").re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_register_modular_and_reversible() {
        // 2-qubit src (qubits 0,1), 2-qubit dst (qubits 2,3)
        let mut sv = StateVector::new(4);
        sv.apply_x(0);
        sv.apply_x(1); // src = 3
        sv.apply_x(3); // dst = 2
        sv.add_register(&[0, 1], &[2, 3], false, &[]);
        // dst = (2 + 3) mod 4 = 1 -> index bits: q0=1,q1=1,q2=1,q3=0 -> label 0111
        assert!((amp_at(&sv, "0111").re - 1.0).abs() < 1e-12);
        sv.add_register(&[0, 1], &[2, 3], true, &[]);
        assert!((amp_at(&sv, "1011").re - 1.0).abs() < 1e-12, "subtract must undo add");
    }

    #[test]
    fn test_measure_collapses_to_definite_value() {
        let mut rng = thread_rng();
        for _ in 0..20 {
            let mut sv = StateVector::new(1);
            sv.apply(&hadamard(), 0);
            let v = sv.measure(&[0], &mut rng);
            assert!(v < 2);
            let label = if v == 1 { "1" } else { "0" };
            assert!((amp_at(&sv, label).norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_set_wavefunction_requires_full_space() {
        let mut sv = StateVector::new(2);
        let mut wf = Wavefunction::new();
        wf.insert("00".to_string(), Complex64::one());
        assert!(matches!(
            sv.set_wavefunction(&wf),
            Err(Error::IncompleteWavefunction { .. })
        ));
    }

    #[test]
    fn test_set_wavefunction_rejects_zero_norm() {
        let mut sv = StateVector::new(1);
        let mut wf = Wavefunction::new();
        wf.insert("0".to_string(), Complex64::zero());
        wf.insert("1".to_string(), Complex64::zero());
        assert!(matches!(sv.set_wavefunction(&wf), Err(Error::ZeroNorm)));
    }
}
