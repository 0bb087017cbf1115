// =============================================================================
// Fraud Model Artifact — serialized model shapes and the cold-start load
// =============================================================================
//
// The artifact is a JSON blob: either a bare model object or a bundle of
// {model, scaler, feature_names}. The model is one of three tagged shapes,
// chosen at load time:
//
//   classifier — linear logit, fraud score = sigmoid(w.x + b)
//   anomaly    — decision value s = w.x + b; fraud score = 1 / (1 + e^s)
//                (more anomalous => lower raw score => higher fraud score)
//   binary     — label = (w.x + b >= threshold); score 0.9 / 0.1
//
// The optional scaler is a standard scaler: x' = (x - mean) / scale, applied
// element-wise before the model.
// =============================================================================

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Fixed arity of the scoring vector.
pub const FEATURE_DIM: usize = 8;

// =============================================================================
// Artifact schema
// =============================================================================

/// Standard-scaler parameters fitted offline.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// The three supported model shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelShape {
    Classifier { weights: Vec<f64>, bias: f64 },
    Anomaly { weights: Vec<f64>, bias: f64 },
    Binary { weights: Vec<f64>, bias: f64, threshold: f64 },
}

impl ModelShape {
    fn weights(&self) -> &[f64] {
        match self {
            Self::Classifier { weights, .. }
            | Self::Anomaly { weights, .. }
            | Self::Binary { weights, .. } => weights,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classifier { .. } => "classifier",
            Self::Anomaly { .. } => "anomaly",
            Self::Binary { .. } => "binary",
        }
    }
}

/// On-disk layout: a bare model object, or a bundle with scaler and the
/// training-time feature names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Artifact {
    Bundle {
        model: ModelShape,
        #[serde(default)]
        scaler: Option<ScalerParams>,
        #[serde(default)]
        feature_names: Option<Vec<String>>,
    },
    Bare(ModelShape),
}

// =============================================================================
// FraudModel
// =============================================================================

/// A loaded, validated model ready for inference.
#[derive(Debug, Clone)]
pub struct FraudModel {
    shape: ModelShape,
    scaler: Option<ScalerParams>,
}

impl FraudModel {
    /// Load and validate the artifact at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact from {}", path.display()))?;

        let artifact: Artifact = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse model artifact from {}", path.display()))?;

        let (shape, scaler, feature_names) = match artifact {
            Artifact::Bundle {
                model,
                scaler,
                feature_names,
            } => (model, scaler, feature_names),
            Artifact::Bare(model) => (model, None, None),
        };

        let model = Self::from_parts(shape, scaler)?;

        info!(
            path = %path.display(),
            kind = model.shape.kind(),
            scaled = model.scaler.is_some(),
            feature_names = ?feature_names,
            "model artifact loaded"
        );

        Ok(model)
    }

    /// Validate dimensions and build the model.
    pub fn from_parts(shape: ModelShape, scaler: Option<ScalerParams>) -> Result<Self> {
        if shape.weights().len() != FEATURE_DIM {
            bail!(
                "model weight vector has {} entries, expected {FEATURE_DIM}",
                shape.weights().len()
            );
        }
        if let Some(scaler) = &scaler {
            if scaler.mean.len() != FEATURE_DIM || scaler.scale.len() != FEATURE_DIM {
                bail!("scaler mean/scale must each have {FEATURE_DIM} entries");
            }
            if scaler.scale.iter().any(|s| s.abs() < f64::EPSILON) {
                bail!("scaler contains a zero scale entry");
            }
        }
        Ok(Self { shape, scaler })
    }

    pub fn kind(&self) -> &'static str {
        self.shape.kind()
    }

    /// Score a fixed-order feature vector. Output is clipped to [0, 1].
    pub fn score(&self, vector: &[f64; FEATURE_DIM]) -> f64 {
        let mut scaled = *vector;
        if let Some(scaler) = &self.scaler {
            for i in 0..FEATURE_DIM {
                scaled[i] = (scaled[i] - scaler.mean[i]) / scaler.scale[i];
            }
        }

        let score = match &self.shape {
            ModelShape::Classifier { weights, bias } => sigmoid(dot(&scaled, weights) + bias),
            ModelShape::Anomaly { weights, bias } => {
                let raw = dot(&scaled, weights) + bias;
                1.0 / (1.0 + raw.exp())
            }
            ModelShape::Binary {
                weights,
                bias,
                threshold,
            } => {
                if dot(&scaled, weights) + bias >= *threshold {
                    0.9
                } else {
                    0.1
                }
            }
        };

        score.clamp(0.0, 1.0)
    }
}

fn dot(vector: &[f64; FEATURE_DIM], weights: &[f64]) -> f64 {
    vector.iter().zip(weights).map(|(x, w)| x * w).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
