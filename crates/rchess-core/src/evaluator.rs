//! 評価器の境界
//!
//! 探索エンジン（バッチ側）と予測モデル（サービング側）はどちらも差し替え可能な
//! 評価器として扱う。呼び出し結果は例外ではなくタグ付きの `EvalOutcome` で返す。

use serde::Serialize;

use crate::position::Position;
use crate::score::MoverScore;

/// 評価器呼び出しの結果
#[derive(Clone, Debug, PartialEq)]
pub enum EvalOutcome<T> {
    Ok(T),
    /// 評価器が使えない（プロセス未起動・終了済み、モデル出力不正など）
    Unavailable,
    /// 時間内に結果が返らなかった
    Timeout,
}

impl<T> EvalOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            EvalOutcome::Ok(v) => Some(v),
            EvalOutcome::Unavailable | EvalOutcome::Timeout => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EvalOutcome<U> {
        match self {
            EvalOutcome::Ok(v) => EvalOutcome::Ok(f(v)),
            EvalOutcome::Unavailable => EvalOutcome::Unavailable,
            EvalOutcome::Timeout => EvalOutcome::Timeout,
        }
    }
}

/// 候補手（指し手と手番側視点の評価値）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// UCI 表記
    pub uci: String,
    pub score: MoverScore,
}

impl Candidate {
    pub fn new(uci: impl Into<String>, score: MoverScore) -> Self {
        Self {
            uci: uci.into(),
            score,
        }
    }
}

/// 探索ベースの評価器（MultiPV 解析と単一最善評価）
pub trait SearchEvaluator {
    /// 上位 `breadth` 本の候補手を最善順で返す。並びは評価器のものをそのまま使う。
    fn analyze(
        &mut self,
        position: &Position,
        depth: u32,
        breadth: usize,
    ) -> EvalOutcome<Vec<Candidate>>;

    /// 最善応手での評価値（`position` の手番側視点）
    fn evaluate(&mut self, position: &Position, depth: u32) -> EvalOutcome<MoverScore>;
}

impl<E: SearchEvaluator + ?Sized> SearchEvaluator for &mut E {
    fn analyze(
        &mut self,
        position: &Position,
        depth: u32,
        breadth: usize,
    ) -> EvalOutcome<Vec<Candidate>> {
        (**self).analyze(position, depth, breadth)
    }

    fn evaluate(&mut self, position: &Position, depth: u32) -> EvalOutcome<MoverScore> {
        (**self).evaluate(position, depth)
    }
}

/// 局面単体を評価する予測器（誤り確率など）
pub trait PositionEvaluator {
    fn evaluate(&mut self, position: &Position, rating: u32) -> EvalOutcome<f32>;
}

impl<E: PositionEvaluator + ?Sized> PositionEvaluator for &mut E {
    fn evaluate(&mut self, position: &Position, rating: u32) -> EvalOutcome<f32> {
        (**self).evaluate(position, rating)
    }
}
