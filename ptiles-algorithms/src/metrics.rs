use std::fmt::Display;

use anyhow::{ensure, Result};

/// True positives, false positives and false negatives of a single class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ClassCounts {
    /// `TP / (TP + FP)`, NaN if the class was never predicted
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// `TP / (TP + FN)`, NaN if the class never occurs in the ground truth
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall. NaN if either is NaN or both are zero
    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let sum = precision + recall;
        if sum == 0.0 {
            f64::NAN
        } else {
            2.0 * precision * recall / sum
        }
    }

    /// Number of ground truth points of this class
    pub fn support(&self) -> usize {
        self.true_positives + self.false_negatives
    }
}

/// Per-class confusion counts over label indices `0..num_classes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionCounts {
    classes: Vec<ClassCounts>,
    skipped: usize,
}

impl ConfusionCounts {
    pub fn new(num_classes: usize) -> Self {
        Self {
            classes: vec![ClassCounts::default(); num_classes],
            skipped: 0,
        }
    }

    /// Counts all pairs of `predicted` and `truth` labels. Pairs where either label is outside of
    /// `0..num_classes` (e.g. points without a prediction) can't be attributed to a class and are only
    /// counted as skipped
    /// ```
    /// # use ptiles_algorithms::metrics::ConfusionCounts;
    /// let mut counts = ConfusionCounts::new(2);
    /// counts.accumulate(&[0, 1, 1, 255], &[0, 0, 1, 1]).unwrap();
    /// assert_eq!(counts.class(1).true_positives, 1);
    /// assert_eq!(counts.class(1).false_positives, 1);
    /// assert_eq!(counts.skipped(), 1);
    /// ```
    pub fn accumulate(&mut self, predicted: &[u8], truth: &[u8]) -> Result<()> {
        ensure!(
            predicted.len() == truth.len(),
            "Got {} predicted labels but {} ground truth labels",
            predicted.len(),
            truth.len()
        );
        let num_classes = self.classes.len();
        for (predicted, truth) in predicted.iter().zip(truth) {
            let (predicted, truth) = (*predicted as usize, *truth as usize);
            if predicted >= num_classes || truth >= num_classes {
                self.skipped += 1;
                continue;
            }
            if predicted == truth {
                self.classes[truth].true_positives += 1;
            } else {
                self.classes[predicted].false_positives += 1;
                self.classes[truth].false_negatives += 1;
            }
        }
        Ok(())
    }

    /// Adds all counts of `other`, which must have the same number of classes
    pub fn merge(&mut self, other: &ConfusionCounts) {
        for (own, theirs) in self.classes.iter_mut().zip(&other.classes) {
            own.true_positives += theirs.true_positives;
            own.false_positives += theirs.false_positives;
            own.false_negatives += theirs.false_negatives;
        }
        self.skipped += other.skipped;
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn class(&self, label: usize) -> &ClassCounts {
        &self.classes[label]
    }

    /// Number of label pairs that could not be attributed to a class
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Fraction of correctly predicted points among all attributed points
    pub fn accuracy(&self) -> f64 {
        let correct = self.classes.iter().map(|c| c.true_positives).sum();
        let total = self.classes.iter().map(|c| c.support()).sum();
        ratio(correct, total)
    }
}

/// Precision, recall and F1 score of one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Printable per-class metrics table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsTable {
    pub rows: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub skipped: usize,
}

impl MetricsTable {
    /// Creates the table for `counts`. `class_name` gives the display name of a label index
    pub fn new<F: Fn(usize) -> String>(counts: &ConfusionCounts, class_name: F) -> Self {
        let rows = counts
            .classes
            .iter()
            .enumerate()
            .map(|(label, class)| ClassMetrics {
                name: class_name(label),
                precision: class.precision(),
                recall: class.recall(),
                f1: class.f1(),
                support: class.support(),
            })
            .collect();
        Self {
            rows,
            accuracy: counts.accuracy(),
            skipped: counts.skipped(),
        }
    }
}

impl Display for MetricsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<12} {:>10} {:>10} {:>10} {:>10}",
            "class", "precision", "recall", "f1", "support"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<12} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                row.name, row.precision, row.recall, row.f1, row.support
            )?;
        }
        writeln!(f, "accuracy: {:.4}", self.accuracy)?;
        write!(f, "skipped points: {}", self.skipped)
    }
}
