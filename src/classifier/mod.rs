use ndarray::Array4;
use serde::{Deserialize, Serialize};

#[cfg(feature = "onnx")]
pub mod onnx;

/// The fixed, ordered set of diagnostic categories the model emits.
///
/// Index order is a contract with the trained model's output layer and is
/// never renegotiated at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanLabel {
    #[serde(rename = "Non-Demented")]
    NonDemented,
    #[serde(rename = "Very Mild Demented")]
    VeryMildDemented,
    #[serde(rename = "Mild Demented")]
    MildDemented,
    #[serde(rename = "Moderate Demented")]
    ModerateDemented,
}

impl ScanLabel {
    pub const ALL: [ScanLabel; 4] = [
        ScanLabel::NonDemented,
        ScanLabel::VeryMildDemented,
        ScanLabel::MildDemented,
        ScanLabel::ModerateDemented,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanLabel::NonDemented => "Non-Demented",
            ScanLabel::VeryMildDemented => "Very Mild Demented",
            ScanLabel::MildDemented => "Mild Demented",
            ScanLabel::ModerateDemented => "Moderate Demented",
        }
    }

    pub fn parse(s: &str) -> Option<ScanLabel> {
        Self::ALL.iter().copied().find(|l| l.as_str() == s)
    }
}

impl std::fmt::Display for ScanLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque inference capability: normalized tensor in, probability vector out.
///
/// Implementations are loaded once at process start, are read-only
/// thereafter, and must be safe to call from concurrent requests. `predict`
/// is blocking and potentially slow; callers run it on the blocking pool
/// under a deadline.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> anyhow::Result<Vec<f64>>;
}

/// Outcome of one classification: the arg-max label, its probability, and
/// the full distribution it was reduced from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: ScanLabel,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
}

impl ClassificationResult {
    /// Reduce a probability vector to a result.
    ///
    /// The first index attaining the maximum wins, so exact ties resolve
    /// deterministically.
    pub fn from_probabilities(probabilities: Vec<f64>) -> anyhow::Result<Self> {
        if probabilities.len() != ScanLabel::ALL.len() {
            anyhow::bail!(
                "classifier returned {} probabilities, expected {}",
                probabilities.len(),
                ScanLabel::ALL.len()
            );
        }

        let mut best = 0;
        for (i, &p) in probabilities.iter().enumerate() {
            if p > probabilities[best] {
                best = i;
            }
        }

        Ok(Self {
            label: ScanLabel::ALL[best],
            confidence: probabilities[best],
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_max_and_label_is_argmax() {
        let result =
            ClassificationResult::from_probabilities(vec![0.1, 0.2, 0.6, 0.1]).expect("valid");
        assert_eq!(result.label, ScanLabel::MildDemented);
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.probabilities, vec![0.1, 0.2, 0.6, 0.1]);
    }

    #[test]
    fn exact_tie_resolves_to_lowest_index() {
        let result =
            ClassificationResult::from_probabilities(vec![0.3, 0.3, 0.3, 0.1]).expect("valid");
        assert_eq!(result.label, ScanLabel::NonDemented);
        assert_eq!(result.confidence, 0.3);
    }

    #[test]
    fn tie_between_later_entries_picks_the_earlier_one() {
        let result =
            ClassificationResult::from_probabilities(vec![0.1, 0.4, 0.4, 0.1]).expect("valid");
        assert_eq!(result.label, ScanLabel::VeryMildDemented);
    }

    #[test]
    fn wrong_length_vector_is_rejected() {
        assert!(ClassificationResult::from_probabilities(vec![0.5, 0.5]).is_err());
        assert!(ClassificationResult::from_probabilities(vec![]).is_err());
    }

    #[test]
    fn labels_round_trip_through_strings() {
        for label in ScanLabel::ALL {
            assert_eq!(ScanLabel::parse(label.as_str()), Some(label));
        }
        assert_eq!(ScanLabel::parse("Demented"), None);
    }

    #[test]
    fn label_order_matches_model_output_contract() {
        assert_eq!(ScanLabel::ALL[0].as_str(), "Non-Demented");
        assert_eq!(ScanLabel::ALL[1].as_str(), "Very Mild Demented");
        assert_eq!(ScanLabel::ALL[2].as_str(), "Mild Demented");
        assert_eq!(ScanLabel::ALL[3].as_str(), "Moderate Demented");
    }
}
