//! Progression indicative d'un transcodage
//!
//! La valeur ne décroît jamais et reste sous 100 tant que l'encodeur n'a pas
//! terminé avec succès.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Plafond tant que le transcodage n'est pas terminé
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Constante de temps de la courbe utilisée sans durée connue (secondes)
const ELAPSED_TIME_CONSTANT: f64 = 60.0;

/// Compteur de progression partagé entre l'encodeur et l'orchestrateur
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    value: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose un pourcentage ; ignoré s'il est inférieur à la valeur courante
    pub fn report(&self, percent: f64) {
        if !percent.is_finite() {
            return;
        }
        let clamped = percent.clamp(0.0, MAX_RUNNING_PROGRESS as f64) as u8;
        self.value.fetch_max(clamped, Ordering::Relaxed);
    }

    pub fn get(&self) -> u8 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Pourcentage à partir de la position d'encodage et de la durée totale
pub fn from_position(out_time_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    out_time_secs / duration_secs * 100.0
}

/// Courbe `99 × (1 − e^(−t/60))` utilisée quand la durée est inconnue
pub fn from_elapsed(elapsed_secs: f64) -> f64 {
    MAX_RUNNING_PROGRESS as f64 * (1.0 - (-elapsed_secs / ELAPSED_TIME_CONSTANT).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_decreases_and_stays_below_100() {
        let progress = ProgressReporter::new();
        progress.report(40.0);
        progress.report(10.0);
        assert_eq!(progress.get(), 40);

        progress.report(250.0);
        assert_eq!(progress.get(), MAX_RUNNING_PROGRESS);

        progress.report(f64::NAN);
        assert_eq!(progress.get(), MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn clones_share_the_counter() {
        let progress = ProgressReporter::new();
        progress.clone().report(12.0);
        assert_eq!(progress.get(), 12);
    }

    #[test]
    fn heuristics() {
        assert_eq!(from_position(30.0, 120.0), 25.0);
        assert_eq!(from_position(30.0, 0.0), 0.0);

        assert_eq!(from_elapsed(0.0), 0.0);
        let one_minute = from_elapsed(60.0);
        assert!(one_minute > 60.0 && one_minute < 63.0);
        assert!(from_elapsed(3600.0) <= MAX_RUNNING_PROGRESS as f64);
        assert!(from_elapsed(120.0) > one_minute);
    }
}
