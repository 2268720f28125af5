use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Class name to confidence, keyed by the model's runtime vocabulary.
///
/// Scores are not normalised; they are whatever the graph emits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassScores(BTreeMap<String, f32>);

impl ClassScores {
    pub fn new(scores: BTreeMap<String, f32>) -> Self {
        Self(scores)
    }

    pub fn get(&self, class: &str) -> Option<f32> {
        self.0.get(class).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest scoring class, ties resolved by key order.
    pub fn best(&self) -> Option<(&str, f32)> {
        self.iter()
            .fold(None, |best: Option<(&str, f32)>, (k, v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((k, v)),
            })
    }
}

impl FromIterator<(String, f32)> for ClassScores {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decoded prediction for a single image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoredResult {
    pub image: Option<PathBuf>,
    pub predicted_labels: Vec<String>,
    pub class_scores: Vec<ClassScores>,
}

impl ScoredResult {
    pub fn new(predicted_labels: Vec<String>, class_scores: Vec<ClassScores>) -> Self {
        Self {
            image: None,
            predicted_labels,
            class_scores,
        }
    }

    pub fn with_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }
}

impl fmt::Display for ScoredResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Suggested Prediction: {}",
            self.predicted_labels.join("\n")
        )?;
        for scores in &self.class_scores {
            for (class, score) in scores.iter() {
                writeln!(f, "Document type {class}: Reliability= {score:.2} ")?;
            }
        }
        Ok(())
    }
}
