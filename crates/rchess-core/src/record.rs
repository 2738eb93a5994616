//! ラベル付きレコード
//!
//! 1 手（解析した ply）につき 1 レコード。列名と順序は学習側との契約なので、
//! フィールドの並びと serde 名は変えないこと。

use serde::{Deserialize, Serialize};

/// 永続化時の列名（順序固定）
pub const DATASET_COLUMNS: [&str; 6] =
    ["fen", "elo", "best_score", "human_score", "score_diff", "is_blunder"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledRecord {
    /// 着手前の局面
    #[serde(rename = "fen")]
    pub position: String,
    /// 手番側のレーティング
    #[serde(rename = "elo")]
    pub rating: u32,
    pub best_score: i32,
    /// 実際に指された手の評価値（手番側視点）
    #[serde(rename = "human_score")]
    pub played_score: i32,
    /// `best_score - played_score`
    pub score_diff: i32,
    /// 0 または 1
    #[serde(rename = "is_blunder")]
    pub label: u8,
}
