//! チェスの悪手ラベリングと候補手ランキングのコア
//!
//! - `scorer`: エンジン解析から 1 手ごとのラベル付きレコードを作る（バッチ側）
//! - `ranking`: 予測モデルで合法手を並べる（サービング側）
//! - `encoding`: 予測モデル入力（12 plane）とレーティング正規化

pub mod encoding;
pub mod evaluator;
pub mod model;
pub mod position;
pub mod ranking;
pub mod record;
pub mod score;
pub mod scorer;

pub use evaluator::{Candidate, EvalOutcome, PositionEvaluator, SearchEvaluator};
pub use model::{ErrorModel, LinearModel, ModelError, ModelEvaluator};
pub use position::{Color, Position, PositionError, STARTPOS_FEN, toggle_side_to_move};
pub use ranking::{Prediction, RISK_THRESHOLD, RankError, RankedMove, Ranking, predict, rank_moves};
pub use record::{DATASET_COLUMNS, LabeledRecord};
pub use score::{MATE_SCORE, MoverScore, UciScore};
pub use scorer::{MoveScorer, PlyOutcome, ScorerConfig, SkipReason, label_for};

// Re-export shakmaty の指し手型（呼び出し側で shakmaty を直接使わずに済むように）
pub use shakmaty::Move;
