//! 指し手採点（Move Scorer）
//!
//! 人間が指した手を MultiPV 解析の候補と突き合わせ、最善手との評価差から
//! 悪手ラベルを付ける。候補に無い手は子局面を単一評価し、符号を反転して
//! 手番側視点に戻す。

use log::debug;
use shakmaty::Move;

use crate::evaluator::{EvalOutcome, SearchEvaluator};
use crate::position::{uci_string, Position};
use crate::record::LabeledRecord;
use crate::score::MoverScore;

/// 悪手判定のしきい値（センチポーン）。評価差がこれを超えたらラベル 1。
pub const BLUNDER_THRESHOLD_CP: i32 = 100;

/// フォールバック評価が失敗したときの代替値（悪手寄りに倒す）
pub const FALLBACK_FAILURE_SCORE: i32 = -9_999;

pub const DEFAULT_DEPTH: u32 = 10;
pub const DEFAULT_BREADTH: usize = 5;
pub const DEFAULT_FALLBACK_DEPTH: u32 = 5;

/// 評価差からラベルを決める。
#[inline]
pub fn label_for(score_diff: i32) -> u8 {
    u8::from(score_diff > BLUNDER_THRESHOLD_CP)
}

/// 採点設定
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScorerConfig {
    /// MultiPV 解析の深さ
    pub depth: u32,
    /// MultiPV 本数
    pub breadth: usize,
    /// 候補外の手を評価するときの深さ
    pub fallback_depth: u32,
    /// この手数（FEN の fullmove）未満の局面はエンジンを呼ばずに飛ばす
    pub min_move_number: u32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            breadth: DEFAULT_BREADTH,
            fallback_depth: DEFAULT_FALLBACK_DEPTH,
            min_move_number: 1,
        }
    }
}

/// ply を飛ばした理由
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    BeforeMinMove,
    NoCandidates,
    Timeout,
    Unavailable,
}

/// 1 ply の採点結果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlyOutcome {
    Labeled(LabeledRecord),
    Skipped(SkipReason),
}

impl PlyOutcome {
    pub fn record(self) -> Option<LabeledRecord> {
        match self {
            PlyOutcome::Labeled(r) => Some(r),
            PlyOutcome::Skipped(_) => None,
        }
    }
}

/// played_score の出どころ
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlayedSource {
    Candidate,
    Fallback,
    Sentinel,
}

#[derive(Clone, Debug, Default)]
pub struct MoveScorer {
    config: ScorerConfig,
}

impl MoveScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// `position` で `played` が指されたときのレコードを作る。
    ///
    /// `position` は変更しない（子局面は別インスタンス）。
    pub fn score<E: SearchEvaluator + ?Sized>(
        &self,
        position: &Position,
        played: &Move,
        rating: u32,
        evaluator: &mut E,
    ) -> PlyOutcome {
        if position.fullmove_number() < self.config.min_move_number {
            return PlyOutcome::Skipped(SkipReason::BeforeMinMove);
        }

        let candidates =
            match evaluator.analyze(position, self.config.depth, self.config.breadth) {
                EvalOutcome::Ok(c) => c,
                EvalOutcome::Timeout => return PlyOutcome::Skipped(SkipReason::Timeout),
                EvalOutcome::Unavailable => return PlyOutcome::Skipped(SkipReason::Unavailable),
            };
        let Some(best) = candidates.first() else {
            return PlyOutcome::Skipped(SkipReason::NoCandidates);
        };
        let best_score = best.score;

        let played_uci = uci_string(played);
        let (played_score, source) =
            match candidates.iter().find(|c| c.uci == played_uci) {
                Some(c) => (c.score, PlayedSource::Candidate),
                None => self.fallback_score(position, played, evaluator),
            };

        let score_diff = best_score.centipawns().saturating_sub(played_score.centipawns());
        debug!(
            "{} played={} best={} ({}) played={} ({:?}) diff={}",
            position.fen(),
            played_uci,
            best.uci,
            best_score.centipawns(),
            played_score.centipawns(),
            source,
            score_diff
        );

        PlyOutcome::Labeled(LabeledRecord {
            position: position.fen().to_string(),
            rating,
            best_score: best_score.centipawns(),
            played_score: played_score.centipawns(),
            score_diff,
            label: label_for(score_diff),
        })
    }

    fn fallback_score<E: SearchEvaluator + ?Sized>(
        &self,
        position: &Position,
        played: &Move,
        evaluator: &mut E,
    ) -> (MoverScore, PlayedSource) {
        let sentinel = (MoverScore(FALLBACK_FAILURE_SCORE), PlayedSource::Sentinel);
        let Ok(child) = position.play(played) else {
            return sentinel;
        };
        match evaluator.evaluate(&child, self.config.fallback_depth) {
            EvalOutcome::Ok(raw) => {
                (MoverScore::from_child_perspective(raw), PlayedSource::Fallback)
            }
            EvalOutcome::Timeout | EvalOutcome::Unavailable => sentinel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Candidate;

    /// 固定の候補と子局面評価を返すスタブ
    struct Scripted {
        candidates: EvalOutcome<Vec<Candidate>>,
        child_eval: EvalOutcome<MoverScore>,
        analyze_calls: usize,
        evaluate_calls: usize,
    }

    impl Scripted {
        fn new(candidates: Vec<(&str, i32)>, child_eval: EvalOutcome<MoverScore>) -> Self {
            Self {
                candidates: EvalOutcome::Ok(
                    candidates.into_iter().map(|(m, s)| Candidate::new(m, MoverScore(s))).collect(),
                ),
                child_eval,
                analyze_calls: 0,
                evaluate_calls: 0,
            }
        }
    }

    impl SearchEvaluator for Scripted {
        fn analyze(&mut self, _: &Position, _: u32, _: usize) -> EvalOutcome<Vec<Candidate>> {
            self.analyze_calls += 1;
            self.candidates.clone()
        }

        fn evaluate(&mut self, _: &Position, _: u32) -> EvalOutcome<MoverScore> {
            self.evaluate_calls += 1;
            self.child_eval.clone()
        }
    }

    fn top5() -> Vec<(&'static str, i32)> {
        vec![("e2e4", 35), ("d2d4", 30), ("g1f3", 25), ("c2c4", 20), ("e2e3", 10)]
    }

    #[test]
    fn test_label_threshold() {
        assert_eq!(label_for(100), 0);
        assert_eq!(label_for(101), 1);
        assert_eq!(label_for(-50), 0);
    }

    #[test]
    fn test_top_candidate_is_not_blunder() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("e2e4").unwrap();
        let mut eval = Scripted::new(top5(), EvalOutcome::Unavailable);
        let record = MoveScorer::default().score(&pos, &mv, 1500, &mut eval).record().unwrap();
        assert_eq!(record.best_score, 35);
        assert_eq!(record.played_score, 35);
        assert_eq!(record.score_diff, 0);
        assert_eq!(record.label, 0);
        assert_eq!(record.rating, 1500);
        assert_eq!(record.position, pos.fen());
        assert_eq!(eval.evaluate_calls, 0);
    }

    #[test]
    fn test_candidate_match_uses_listed_score() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("e2e3").unwrap();
        let mut eval = Scripted::new(top5(), EvalOutcome::Unavailable);
        let record = MoveScorer::default().score(&pos, &mv, 1200, &mut eval).record().unwrap();
        assert_eq!(record.played_score, 10);
        assert_eq!(record.score_diff, 25);
        assert_eq!(record.label, 0);
    }

    #[test]
    fn test_outside_breadth_uses_negated_fallback() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("f2f3").unwrap();
        // 子局面では黒番視点で +150
        let mut eval = Scripted::new(top5(), EvalOutcome::Ok(MoverScore(150)));
        let record = MoveScorer::default().score(&pos, &mv, 1500, &mut eval).record().unwrap();
        assert_eq!(record.played_score, -150);
        assert_eq!(record.score_diff, 185);
        assert_eq!(record.label, 1);
        assert_eq!(eval.evaluate_calls, 1);
        // 呼び出し側の局面はそのまま
        assert_eq!(pos, Position::startpos());
    }

    #[test]
    fn test_fallback_failure_uses_sentinel() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("g2g4").unwrap();
        let mut eval = Scripted::new(top5(), EvalOutcome::Timeout);
        let record = MoveScorer::default().score(&pos, &mv, 1500, &mut eval).record().unwrap();
        assert_eq!(record.played_score, FALLBACK_FAILURE_SCORE);
        assert_eq!(record.score_diff, 35 - FALLBACK_FAILURE_SCORE);
        assert_eq!(record.label, 1);
    }

    #[test]
    fn test_empty_candidates_skip() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("e2e4").unwrap();
        let mut eval = Scripted::new(vec![], EvalOutcome::Ok(MoverScore(0)));
        let outcome = MoveScorer::default().score(&pos, &mv, 1500, &mut eval);
        assert_eq!(outcome, PlyOutcome::Skipped(SkipReason::NoCandidates));
        assert_eq!(eval.evaluate_calls, 0);
    }

    #[test]
    fn test_analyze_failure_tags() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("e2e4").unwrap();
        let mut eval = Scripted::new(vec![], EvalOutcome::Ok(MoverScore(0)));
        eval.candidates = EvalOutcome::Timeout;
        assert_eq!(
            MoveScorer::default().score(&pos, &mv, 1500, &mut eval),
            PlyOutcome::Skipped(SkipReason::Timeout)
        );
        eval.candidates = EvalOutcome::Unavailable;
        assert_eq!(
            MoveScorer::default().score(&pos, &mv, 1500, &mut eval),
            PlyOutcome::Skipped(SkipReason::Unavailable)
        );
    }

    #[test]
    fn test_min_move_number_skips_without_engine_call() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("e2e4").unwrap();
        let mut eval = Scripted::new(top5(), EvalOutcome::Ok(MoverScore(0)));
        let scorer = MoveScorer::new(ScorerConfig {
            min_move_number: 8,
            ..ScorerConfig::default()
        });
        assert_eq!(
            scorer.score(&pos, &mv, 1500, &mut eval),
            PlyOutcome::Skipped(SkipReason::BeforeMinMove)
        );
        assert_eq!(eval.analyze_calls, 0);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("b1a3").unwrap();
        let mut eval = Scripted::new(top5(), EvalOutcome::Ok(MoverScore(40)));
        let scorer = MoveScorer::default();
        let first = scorer.score(&pos, &mv, 1800, &mut eval);
        let second = scorer.score(&pos, &mv, 1800, &mut eval);
        assert_eq!(first, second);
    }
}
