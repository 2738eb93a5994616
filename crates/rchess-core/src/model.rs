//! 予測モデル
//!
//! 盤面エンコーディングと正規化レーティングから「手番側が悪手を指す確率」を返す。
//! モデル内部は差し替え可能で、ここでは JSON で配布するロジスティック回帰を持つ。

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoding::{BoardPlanes, INPUT_SIZE, encode_planes, flatten, normalize_rating};
use crate::evaluator::{EvalOutcome, PositionEvaluator};
use crate::position::Position;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to open model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("board weight length mismatch: expected {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },
    #[error("model contains non-finite weights")]
    NonFinite,
}

/// 予測モデルの境界
pub trait ErrorModel {
    /// 悪手確率 [0, 1]。`rating` は正規化済み。
    fn predict(&self, planes: &BoardPlanes, rating: f32) -> f32;
}

/// ロジスティック回帰（768 盤面特徴 + レーティング）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// `[plane][rank][file]` 順に平坦化した重み
    pub board_weights: Vec<f32>,
    pub rating_weight: f32,
    pub bias: f32,
}

impl LinearModel {
    /// 全重み 0（常に 0.5 を返す）
    pub fn zeros() -> Self {
        Self {
            board_weights: vec![0.0; INPUT_SIZE],
            rating_weight: 0.0,
            bias: 0.0,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let model: LinearModel = serde_json::from_str(text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model: LinearModel = serde_json::from_reader(BufReader::new(file))?;
        model.validate()?;
        log::info!("loaded model from {}", path.display());
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.board_weights.len() != INPUT_SIZE {
            return Err(ModelError::Shape {
                expected: INPUT_SIZE,
                actual: self.board_weights.len(),
            });
        }
        let finite = self.board_weights.iter().all(|w| w.is_finite())
            && self.rating_weight.is_finite()
            && self.bias.is_finite();
        if !finite {
            return Err(ModelError::NonFinite);
        }
        Ok(())
    }

    fn logit(&self, planes: &BoardPlanes, rating: f32) -> f32 {
        let board: f32 =
            flatten(planes).iter().zip(&self.board_weights).map(|(x, w)| x * w).sum();
        board + self.rating_weight * rating + self.bias
    }
}

impl ErrorModel for LinearModel {
    fn predict(&self, planes: &BoardPlanes, rating: f32) -> f32 {
        sigmoid(self.logit(planes, rating))
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// 予測モデルを局面評価器として使うためのアダプタ
///
/// 局面のエンコードとレーティング正規化はここで行い、モデルには渡さない。
pub struct ModelEvaluator<M> {
    model: M,
}

impl<M: ErrorModel> ModelEvaluator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: ErrorModel> PositionEvaluator for ModelEvaluator<M> {
    fn evaluate(&mut self, position: &Position, rating: u32) -> EvalOutcome<f32> {
        let planes = encode_planes(position);
        let p = self.model.predict(&planes, normalize_rating(rating));
        if p.is_finite() {
            EvalOutcome::Ok(p)
        } else {
            log::warn!("model returned non-finite output for {}", position.fen());
            EvalOutcome::Unavailable
        }
    }
}
