//! Raw output tensors to per-image predictions.

use classport_core::{
    ClassScores, ClassifierError, DType, ModelOutputs, OutputValue, Result, ScoredResult, Shape,
};

use crate::config::ModelIo;

pub trait Decoder: Send + Sync {
    /// Returns exactly `batch_size` results in batch order.
    fn decode(&self, outputs: &ModelOutputs, batch_size: usize) -> Result<Vec<ScoredResult>>;
}

/// Pairs a label output with a per-class score output.
///
/// Labels may be a string tensor or an integer tensor of class indices.
/// Scores may be a sequence of maps (one per image) or an `[N, C]` float
/// tensor whose columns are named by the configured vocabulary, or by
/// index when none is configured.
#[derive(Clone, Debug)]
pub struct LabelScoreDecoder {
    label_output: String,
    score_output: String,
    classes: Option<Vec<String>>,
}

impl LabelScoreDecoder {
    pub fn new(io: &ModelIo) -> Self {
        Self {
            label_output: io.label_output.clone(),
            score_output: io.score_output.clone(),
            classes: io.classes.clone(),
        }
    }

    fn class_name(&self, index: usize) -> String {
        self.classes
            .as_ref()
            .and_then(|classes| classes.get(index).cloned())
            .unwrap_or_else(|| index.to_string())
    }

    fn decode_labels(&self, value: &OutputValue, batch_size: usize) -> Result<Vec<Vec<String>>> {
        let output = self.label_output.as_str();
        match value {
            OutputValue::Strings { shape, values } => {
                split_rows(output, shape, values.clone(), batch_size)
            }
            OutputValue::Tensor(tensor) if matches!(tensor.dtype, DType::I64 | DType::I32) => {
                let names = tensor
                    .to_i64_vec()?
                    .into_iter()
                    .map(|idx| match usize::try_from(idx) {
                        Ok(idx) => self.class_name(idx),
                        Err(_) => idx.to_string(),
                    })
                    .collect();
                split_rows(output, &tensor.shape, names, batch_size)
            }
            OutputValue::Tensor(tensor) => Err(ClassifierError::invalid_output(
                output,
                format!("{} labels are not supported", tensor.dtype),
            )),
            other => Err(ClassifierError::invalid_output(
                output,
                format!("expected a label tensor, got a {}", other.kind_name()),
            )),
        }
    }

    fn decode_scores(&self, value: &OutputValue, batch_size: usize) -> Result<Vec<ClassScores>> {
        let output = self.score_output.as_str();
        let rows: Vec<Vec<(String, f32)>> = match value {
            OutputValue::MapSequence(maps) => {
                check_count(output, maps.len(), batch_size)?;
                maps.iter()
                    .map(|map| map.iter().map(|(k, v)| (k.clone(), *v)).collect())
                    .collect()
            }
            OutputValue::Tensor(tensor) if matches!(tensor.dtype, DType::F32 | DType::F64) => {
                let [rows, cols] = *tensor.shape.dims() else {
                    return Err(ClassifierError::invalid_output(
                        output,
                        format!("expected an [N, C] score tensor, got {}", tensor.shape),
                    ));
                };
                check_count(output, rows, batch_size)?;
                if let Some(classes) = &self.classes {
                    if classes.len() != cols {
                        return Err(ClassifierError::invalid_output(
                            output,
                            format!(
                                "{cols} score columns but {} configured classes",
                                classes.len()
                            ),
                        ));
                    }
                }
                let values = tensor.to_f32_vec()?;
                values
                    .chunks(cols.max(1))
                    .take(rows)
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .map(|(i, v)| (self.class_name(i), *v))
                            .collect()
                    })
                    .collect()
            }
            other => {
                return Err(ClassifierError::invalid_output(
                    output,
                    format!("expected class scores, got a {}", other.kind_name()),
                ))
            }
        };

        rows.into_iter()
            .map(|row| {
                if let Some((class, score)) = row.iter().find(|(_, v)| !v.is_finite()) {
                    return Err(ClassifierError::invalid_output(
                        output,
                        format!("non-finite score {score} for class `{class}`"),
                    ));
                }
                Ok(row.into_iter().collect())
            })
            .collect()
    }
}

impl Decoder for LabelScoreDecoder {
    fn decode(&self, outputs: &ModelOutputs, batch_size: usize) -> Result<Vec<ScoredResult>> {
        let labels = self.decode_labels(outputs.require(&self.label_output)?, batch_size)?;
        let scores = self.decode_scores(outputs.require(&self.score_output)?, batch_size)?;

        Ok(labels
            .into_iter()
            .zip(scores)
            .map(|(labels, scores)| ScoredResult::new(labels, vec![scores]))
            .collect())
    }
}

fn check_count(output: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ClassifierError::OutputShape {
            output: output.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Splits a label tensor into one row per batch item. A rank-0 tensor counts
/// as a single row; trailing dims hold zero or more labels per item.
fn split_rows<T>(
    output: &str,
    shape: &Shape,
    values: Vec<T>,
    batch_size: usize,
) -> Result<Vec<Vec<T>>> {
    let rows = if shape.rank() == 0 { 1 } else { shape.leading() };
    check_count(output, rows, batch_size)?;
    if rows == 0 {
        return Ok(Vec::new());
    }
    if values.len() % rows != 0 {
        return Err(ClassifierError::invalid_output(
            output,
            format!("{} values cannot be split into {rows} rows", values.len()),
        ));
    }

    let per_row = values.len() / rows;
    let mut values = values.into_iter();
    Ok((0..rows)
        .map(|_| values.by_ref().take(per_row).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use classport_core::Tensor;

    use super::*;

    fn strings(values: &[&str]) -> OutputValue {
        OutputValue::Strings {
            shape: Shape::from_slice(&[values.len()]),
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn maps(rows: &[&[(&str, f32)]]) -> OutputValue {
        OutputValue::MapSequence(
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect::<BTreeMap<_, _>>()
                })
                .collect(),
        )
    }

    fn decoder() -> LabelScoreDecoder {
        LabelScoreDecoder::new(&ModelIo::default())
    }

    #[test]
    fn decodes_zipmap_outputs_in_order() {
        let outputs = ModelOutputs::new()
            .with("classLabel", strings(&["invoice", "receipt"]))
            .with(
                "loss",
                maps(&[
                    &[("invoice", 0.8), ("receipt", 0.2)],
                    &[("invoice", 0.1), ("receipt", 0.9)],
                ]),
            );

        let results = decoder().decode(&outputs, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].predicted_labels, vec!["invoice"]);
        assert_eq!(results[1].predicted_labels, vec!["receipt"]);
        assert_eq!(results[1].class_scores[0].get("receipt"), Some(0.9));
    }

    #[test]
    fn label_count_mismatch_is_output_shape_error() {
        let outputs = ModelOutputs::new()
            .with("classLabel", strings(&["invoice"]))
            .with("loss", maps(&[&[("invoice", 1.0)], &[("invoice", 1.0)]]));

        match decoder().decode(&outputs, 2) {
            Err(ClassifierError::OutputShape {
                output,
                expected,
                actual,
            }) => {
                assert_eq!(output, "classLabel");
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("expected OutputShape, got {other:?}"),
        }
    }

    #[test]
    fn score_count_mismatch_is_output_shape_error() {
        let outputs = ModelOutputs::new()
            .with("classLabel", strings(&["a", "b", "c"]))
            .with("loss", maps(&[&[("a", 1.0)], &[("b", 1.0)]]));

        assert!(matches!(
            decoder().decode(&outputs, 3),
            Err(ClassifierError::OutputShape { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn multi_label_rows_are_grouped() {
        let outputs = ModelOutputs::new()
            .with(
                "classLabel",
                OutputValue::Strings {
                    shape: Shape::from_slice(&[2, 2]),
                    values: ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
                },
            )
            .with("loss", maps(&[&[], &[]]));

        let results = decoder().decode(&outputs, 2).unwrap();
        assert_eq!(results[0].predicted_labels, vec!["a", "b"]);
        assert_eq!(results[1].predicted_labels, vec!["c", "d"]);
    }

    #[test]
    fn score_tensor_uses_configured_vocabulary() {
        let io = ModelIo {
            classes: Some(vec!["cat".into(), "dog".into(), "fox".into()]),
            ..ModelIo::default()
        };
        let outputs = ModelOutputs::new()
            .with(
                "classLabel",
                OutputValue::Tensor(
                    Tensor::from_i64(Shape::from_slice(&[2]), &[1, 2]).unwrap(),
                ),
            )
            .with(
                "loss",
                OutputValue::Tensor(
                    Tensor::from_f32(
                        Shape::from_slice(&[2, 3]),
                        &[0.1, 0.7, 0.2, 0.0, 0.3, 0.7],
                    )
                    .unwrap(),
                ),
            );

        let results = LabelScoreDecoder::new(&io).decode(&outputs, 2).unwrap();
        assert_eq!(results[0].predicted_labels, vec!["dog"]);
        assert_eq!(results[1].predicted_labels, vec!["fox"]);
        assert_eq!(results[0].class_scores[0].get("dog"), Some(0.7));
        assert_eq!(results[1].class_scores[0].best(), Some(("fox", 0.7)));
    }

    #[test]
    fn score_tensor_without_vocabulary_is_keyed_by_index() {
        let outputs = ModelOutputs::new()
            .with("classLabel", strings(&["1"]))
            .with(
                "loss",
                OutputValue::Tensor(
                    Tensor::from_f32(Shape::from_slice(&[1, 2]), &[0.25, 0.75]).unwrap(),
                ),
            );

        let results = decoder().decode(&outputs, 1).unwrap();
        assert_eq!(results[0].class_scores[0].get("0"), Some(0.25));
        assert_eq!(results[0].class_scores[0].get("1"), Some(0.75));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let outputs = ModelOutputs::new()
            .with("classLabel", strings(&["a"]))
            .with("loss", maps(&[&[("a", f32::NAN)]]));

        assert!(matches!(
            decoder().decode(&outputs, 1),
            Err(ClassifierError::InvalidOutput { .. })
        ));
    }

    #[test]
    fn missing_output_is_reported_by_name() {
        let outputs = ModelOutputs::new().with("classLabel", strings(&["a"]));
        let err = decoder().decode(&outputs, 1).unwrap_err();
        assert!(err.to_string().contains("`loss`"));
    }

    #[test]
    fn wrong_value_kind_is_invalid_output() {
        let outputs = ModelOutputs::new()
            .with("classLabel", maps(&[&[("a", 1.0)]]))
            .with("loss", maps(&[&[("a", 1.0)]]));

        assert!(matches!(
            decoder().decode(&outputs, 1),
            Err(ClassifierError::InvalidOutput { .. })
        ));
    }
}
