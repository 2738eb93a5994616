//! 候補手ランキング（サービング側）
//!
//! 現局面の合法手をすべて適用し、子局面を予測モデルで 1 回ずつ評価して
//! 出力の降順に並べる。基準値は「手番だけ反転した現局面」の評価で、
//! 着手候補ではない。局面単体の誤り確率だけを返す `predict` もここに置く。

use serde::Serialize;

use crate::evaluator::{EvalOutcome, PositionEvaluator};
use crate::position::{uci_string, Position, PositionError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    #[error(transparent)]
    MalformedPosition(#[from] PositionError),
    #[error("no legal moves in position '{0}'")]
    NoLegalMoves(String),
    #[error("evaluator unavailable while evaluating '{0}'")]
    EvaluatorUnavailable(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedMove {
    pub uci: String,
    pub resulting_fen: String,
    pub probability: f32,
    /// `probability - baseline_probability`
    pub delta: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ranking {
    pub fen: String,
    pub rating: u32,
    pub baseline_probability: f32,
    pub moves: Vec<RankedMove>,
}

impl Ranking {
    pub fn best(&self) -> Option<&RankedMove> {
        self.moves.first()
    }
}

/// これを超える誤り確率の局面を「危険」とみなす
pub const RISK_THRESHOLD: f32 = 0.5;

/// 局面単体の予測結果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub fen: String,
    pub rating: u32,
    pub probability: f32,
    pub is_risky: bool,
}

fn evaluate_or_fail<E: PositionEvaluator + ?Sized>(
    evaluator: &mut E,
    position: &Position,
    rating: u32,
) -> Result<f32, RankError> {
    match evaluator.evaluate(position, rating) {
        EvalOutcome::Ok(p) => Ok(p),
        EvalOutcome::Unavailable | EvalOutcome::Timeout => {
            Err(RankError::EvaluatorUnavailable(position.fen().to_string()))
        }
    }
}

/// 局面をそのまま 1 回だけ評価する（手番側が誤る確率）。
pub fn predict<E: PositionEvaluator + ?Sized>(
    position: &Position,
    rating: u32,
    evaluator: &mut E,
) -> Result<Prediction, RankError> {
    let probability = evaluate_or_fail(evaluator, position, rating)?;
    Ok(Prediction {
        fen: position.fen().to_string(),
        rating,
        probability,
        is_risky: probability > RISK_THRESHOLD,
    })
}

/// 合法手を評価器の出力の降順に並べる。
///
/// 同値は合法手の生成順を保つ（安定ソート）。合法手が無い局面はエラー。
pub fn rank_moves<E: PositionEvaluator + ?Sized>(
    position: &Position,
    rating: u32,
    evaluator: &mut E,
) -> Result<Ranking, RankError> {
    let legal = position.legal_moves()?;
    if legal.is_empty() {
        return Err(RankError::NoLegalMoves(position.fen().to_string()));
    }

    let baseline = evaluate_or_fail(evaluator, &position.toggled_side_to_move()?, rating)?;

    let mut moves = Vec::with_capacity(legal.len());
    for mv in &legal {
        let child = position.play(mv)?;
        let probability = evaluate_or_fail(evaluator, &child, rating)?;
        moves.push(RankedMove {
            uci: uci_string(mv),
            resulting_fen: child.fen().to_string(),
            probability,
            delta: probability - baseline,
        });
    }
    moves.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    log::debug!(
        "ranked {} moves for {} (baseline {:.4})",
        moves.len(),
        position.fen(),
        baseline
    );
    Ok(Ranking {
        fen: position.fen().to_string(),
        rating,
        baseline_probability: baseline,
        moves,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::position::Color;

    /// FEN ごとに固定値を返す。未登録は `default`。
    struct Table {
        values: HashMap<String, f32>,
        default: f32,
        calls: Vec<String>,
    }

    impl Table {
        fn new(default: f32) -> Self {
            Self {
                values: HashMap::new(),
                default,
                calls: Vec::new(),
            }
        }
    }

    impl PositionEvaluator for Table {
        fn evaluate(&mut self, position: &Position, _rating: u32) -> EvalOutcome<f32> {
            self.calls.push(position.fen().to_string());
            EvalOutcome::Ok(*self.values.get(position.fen()).unwrap_or(&self.default))
        }
    }

    #[test]
    fn test_single_legal_move() {
        // h8 ルークの王手。b8 はルーク、b7 は c6 キングが利いているので Ka7 のみ
        let pos = Position::from_fen("k6R/8/2K5/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(pos.legal_moves().unwrap().len(), 1);
        let mut table = Table::new(0.3);
        table
            .values
            .insert(pos.toggled_side_to_move().unwrap().fen().to_string(), 0.1);

        let ranking = rank_moves(&pos, 1500, &mut table).unwrap();
        assert_eq!(ranking.moves.len(), 1);
        let only = &ranking.moves[0];
        assert_eq!(ranking.baseline_probability, 0.1);
        assert_eq!(only.probability, 0.3);
        assert_eq!(only.delta, only.probability - ranking.baseline_probability);
    }

    #[test]
    fn test_startpos_baseline_and_children() {
        let pos = Position::startpos();
        let e4 = pos.play(&pos.parse_uci("e2e4").unwrap()).unwrap();
        let toggled = pos.toggled_side_to_move().unwrap();
        assert_eq!(toggled.turn(), Color::Black);

        let mut table = Table::new(0.2);
        table.values.insert(toggled.fen().to_string(), 0.25);
        table.values.insert(e4.fen().to_string(), 0.7);

        let ranking = rank_moves(&pos, 1500, &mut table).unwrap();
        assert_eq!(ranking.moves.len(), 20);
        assert_eq!(ranking.baseline_probability, 0.25);
        let best = ranking.best().unwrap();
        assert_eq!(best.uci, "e2e4");
        assert_eq!(best.resulting_fen, e4.fen());
        assert_eq!(best.probability, 0.7);
        // 基準値 1 回 + 合法手 20 回
        assert_eq!(table.calls.len(), 21);
        assert_eq!(table.calls[0], toggled.fen());
        assert_eq!(pos, Position::startpos());
    }

    #[test]
    fn test_ties_keep_generation_order() {
        let pos = Position::startpos();
        let generated: Vec<String> =
            pos.legal_moves().unwrap().iter().map(uci_string).collect();
        let ranking = rank_moves(&pos, 1200, &mut Table::new(0.5)).unwrap();
        let ranked: Vec<String> = ranking.moves.iter().map(|m| m.uci.clone()).collect();
        assert_eq!(ranked, generated);
    }

    #[test]
    fn test_no_legal_moves_is_error() {
        let mated =
            Position::from_fen("rnbqkbnr/ppppp2p/5p2/6pQ/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 1 3")
                .unwrap();
        let mut table = Table::new(0.5);
        assert!(matches!(
            rank_moves(&mated, 1500, &mut table),
            Err(RankError::NoLegalMoves(_))
        ));
        assert!(table.calls.is_empty());
    }

    #[test]
    fn test_evaluator_failure_is_surfaced() {
        struct Down;
        impl PositionEvaluator for Down {
            fn evaluate(&mut self, _: &Position, _: u32) -> EvalOutcome<f32> {
                EvalOutcome::Unavailable
            }
        }
        assert!(matches!(
            rank_moves(&Position::startpos(), 1500, &mut Down),
            Err(RankError::EvaluatorUnavailable(_))
        ));
    }

    #[test]
    fn test_predict_evaluates_position_itself() {
        let pos = Position::startpos();
        let mut table = Table::new(0.5);
        table.values.insert(pos.fen().to_string(), 0.62);

        let p = predict(&pos, 1800, &mut table).unwrap();
        assert_eq!(p.fen, pos.fen());
        assert_eq!(p.rating, 1800);
        assert_eq!(p.probability, 0.62);
        assert!(p.is_risky);
        assert_eq!(table.calls, vec![pos.fen().to_string()]);
    }

    #[test]
    fn test_predict_threshold_is_exclusive() {
        // 詰み局面でも予測はできる
        let mated =
            Position::from_fen("rnbqkbnr/ppppp2p/5p2/6pQ/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 1 3")
                .unwrap();
        let p = predict(&mated, 1500, &mut Table::new(RISK_THRESHOLD)).unwrap();
        assert_eq!(p.probability, 0.5);
        assert!(!p.is_risky);
    }
}
