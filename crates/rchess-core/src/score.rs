//! 評価値
//!
//! エンジンの生の出力（`UciScore`）と、解析局面の手番側から見たセンチポーン
//! （`MoverScore`）を型で区別する。子局面の評価を親局面の手番側視点に戻す
//! 符号反転は `MoverScore::from_child_perspective` でのみ行う。

use serde::{Deserialize, Serialize};

/// 詰みを有限のセンチポーンへ写像するときの基準値
pub const MATE_SCORE: i32 = 10_000;

/// UCI `info ... score` の値（手番側視点）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UciScore {
    Cp(i32),
    /// 詰みまでの手数。負なら手番側が詰まされる。0 は既に詰んでいる。
    Mate(i32),
}

impl UciScore {
    /// センチポーンに変換する。
    ///
    /// `mate n` (n > 0) は `MATE_SCORE - n`、(n <= 0) は `-MATE_SCORE - n`。
    pub fn to_centipawns(self) -> i32 {
        match self {
            UciScore::Cp(cp) => cp,
            UciScore::Mate(n) if n > 0 => MATE_SCORE - n,
            UciScore::Mate(n) => -MATE_SCORE - n,
        }
    }
}

/// 解析局面の手番側から見たセンチポーン
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoverScore(pub i32);

impl MoverScore {
    /// エンジンが解析局面について返した値をそのまま手番側視点として扱う。
    pub fn from_engine(score: UciScore) -> Self {
        MoverScore(score.to_centipawns())
    }

    /// 子局面（相手番）の評価値を、親局面の手番側視点に戻す。
    pub fn from_child_perspective(child: MoverScore) -> Self {
        MoverScore(child.0.saturating_neg())
    }

    #[inline]
    pub fn centipawns(self) -> i32 {
        self.0
    }
}

impl From<UciScore> for MoverScore {
    fn from(score: UciScore) -> Self {
        MoverScore::from_engine(score)
    }
}
