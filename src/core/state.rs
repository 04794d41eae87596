// src/core/state.rs

use super::constants::AMPLITUDE_TOLERANCE;
use num_complex::Complex;
use num_traits::{One, Zero};
use std::collections::BTreeMap;
use std::fmt;

/// Sparse amplitude state of a register.
///
/// Keys are basis labels: bit `k` of a label is the activation of carrier
/// `QubitId(k)`. Only labels with a non-negligible amplitude are stored. The
/// routing and transport circuits are dominated by permutation gates, so the
/// support stays small even with many live carriers.
#[derive(Debug, Clone, PartialEq)] // Avoid Eq for floating-point complex numbers
pub struct AmplitudeState {
    amplitudes: BTreeMap<u64, Complex<f64>>,
}

impl AmplitudeState {
    /// All carriers inactive.
    pub(crate) fn ground() -> Self {
        let mut amplitudes = BTreeMap::new();
        amplitudes.insert(0, Complex::one());
        Self { amplitudes }
    }

    /// Builds a state from explicit entries. Entries below tolerance are dropped.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, Complex<f64>)>,
    {
        let mut state = Self { amplitudes: BTreeMap::new() };
        for (label, amp) in entries {
            *state.amplitudes.entry(label).or_insert_with(Complex::zero) += amp;
        }
        state.prune();
        state
    }

    pub fn amplitude(&self, label: u64) -> Complex<f64> {
        self.amplitudes.get(&label).copied().unwrap_or_else(Complex::zero)
    }

    /// Iterates `(label, amplitude)` in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, Complex<f64>)> + '_ {
        self.amplitudes.iter().map(|(k, v)| (*k, *v))
    }

    /// Number of basis labels with non-negligible amplitude.
    pub fn support(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes.values().map(|c| c.norm_sqr()).sum()
    }

    /// Component-wise comparison within `tolerance`.
    pub fn approx_eq(&self, other: &AmplitudeState, tolerance: f64) -> bool {
        let labels: std::collections::BTreeSet<u64> =
            self.amplitudes.keys().chain(other.amplitudes.keys()).copied().collect();
        labels
            .into_iter()
            .all(|k| (self.amplitude(k) - other.amplitude(k)).norm_sqr() < tolerance * tolerance)
    }

    /// Applies a basis permutation with a per-label phase factor.
    /// `f` must be a bijection on labels.
    pub(crate) fn permute<F>(&mut self, f: F)
    where
        F: Fn(u64) -> (u64, Complex<f64>),
    {
        let old = std::mem::take(&mut self.amplitudes);
        for (label, amp) in old {
            let (next, phase) = f(label);
            self.amplitudes.insert(next, amp * phase);
        }
    }

    /// Applies a general linear map given as a list of output terms per input
    /// label, then drops cancelled amplitudes.
    pub(crate) fn transform<F>(&mut self, f: F)
    where
        F: Fn(u64) -> Vec<(u64, Complex<f64>)>,
    {
        let old = std::mem::take(&mut self.amplitudes);
        for (label, amp) in old {
            for (next, coeff) in f(label) {
                *self.amplitudes.entry(next).or_insert_with(Complex::zero) += amp * coeff;
            }
        }
        self.prune();
    }

    /// Keeps only labels accepted by `keep` and returns the squared norm that
    /// remains. The state is left unnormalised.
    pub(crate) fn project<F>(&mut self, keep: F) -> f64
    where
        F: Fn(u64) -> bool,
    {
        self.amplitudes.retain(|label, _| keep(*label));
        self.norm_sqr()
    }

    pub(crate) fn renormalize(&mut self) {
        let norm = self.norm_sqr().sqrt();
        if norm > AMPLITUDE_TOLERANCE {
            for amp in self.amplitudes.values_mut() {
                *amp /= norm;
            }
        }
    }

    fn prune(&mut self) {
        self.amplitudes
            .retain(|_, amp| amp.norm_sqr() > AMPLITUDE_TOLERANCE * AMPLITUDE_TOLERANCE);
    }
}

impl fmt::Display for AmplitudeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State[")?;
        for (i, (label, amp)) in self.amplitudes.iter().enumerate() {
            write!(f, "{}{:.4}|{:b}>", if i > 0 { ", " } else { "" }, amp, label)?;
        }
        write!(f, "]")
    }
}
