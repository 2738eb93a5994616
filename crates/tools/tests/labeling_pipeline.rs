//! 外部エンジンを使わない、棋譜 → 採点 → 集計の結合テスト

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use rchess_core::position::uci_string;
use rchess_core::{
    Candidate, EvalOutcome, MoveScorer, MoverScore, Position, ScorerConfig, SearchEvaluator,
};
use tools::labeling::{
    GameRecord, GameStatus, GameStream, SessionFactory, WorkerPool, aggregate, label_game,
};

const CANDIDATE_SCORES: [i32; 5] = [50, 40, 30, 20, 10];
/// 候補外の手の子局面評価（相手番視点）
const CHILD_EVAL: i32 = 120;

/// 合法手の生成順で上位 5 手を候補とする決定的なエンジン
#[derive(Default)]
struct FakeEngine {
    /// この回数の analyze の後は落ちたものとして振る舞う
    fail_after: Option<usize>,
    /// この局面を解析しようとすると panic する
    panic_at: Option<String>,
    analyze_calls: usize,
}

impl SearchEvaluator for FakeEngine {
    fn analyze(
        &mut self,
        position: &Position,
        _depth: u32,
        breadth: usize,
    ) -> EvalOutcome<Vec<Candidate>> {
        if self.fail_after.is_some_and(|n| self.analyze_calls >= n) {
            return EvalOutcome::Unavailable;
        }
        if self.panic_at.as_deref() == Some(position.fen()) {
            panic!("engine state corrupted at {}", position.fen());
        }
        self.analyze_calls += 1;
        let Ok(moves) = position.legal_moves() else {
            return EvalOutcome::Unavailable;
        };
        EvalOutcome::Ok(
            moves
                .iter()
                .zip(CANDIDATE_SCORES)
                .take(breadth)
                .map(|(mv, score)| Candidate::new(uci_string(mv), MoverScore(score)))
                .collect(),
        )
    }

    fn evaluate(&mut self, _position: &Position, _depth: u32) -> EvalOutcome<MoverScore> {
        EvalOutcome::Ok(MoverScore(CHILD_EVAL))
    }
}

fn game(index: usize, ucis: &[&str]) -> GameRecord {
    let mut pos = Position::startpos();
    let mut moves = Vec::new();
    for uci in ucis {
        let mv = pos.parse_uci(uci).unwrap();
        pos = pos.play(&mv).unwrap();
        moves.push(mv);
    }
    GameRecord::new(index, Position::startpos(), moves, Some(1500), Some(1600))
}

fn fen_after(ucis: &[&str]) -> String {
    let mut pos = Position::startpos();
    for uci in ucis {
        pos = pos.play(&pos.parse_uci(uci).unwrap()).unwrap();
    }
    pos.fen().to_string()
}

fn first_generated(pos: &Position, n: usize) -> Vec<String> {
    pos.legal_moves().unwrap().iter().take(n).map(uci_string).collect()
}

#[test]
fn played_move_outside_candidates_uses_negated_fallback() {
    let start = Position::startpos();
    let top5 = first_generated(&start, 5);
    // 生成順で 5 番目より後ろの手を選ぶ
    let outside = start
        .legal_moves()
        .unwrap()
        .iter()
        .map(uci_string)
        .find(|m| !top5.contains(m))
        .unwrap();
    let inside = top5[0].clone();

    let g = game(0, &[outside.as_str()]);
    let labels = label_game(&g, &mut FakeEngine::default(), &MoveScorer::default());
    assert_eq!(labels.status, GameStatus::Completed);
    let r = &labels.records[0];
    assert_eq!(r.best_score, 50);
    assert_eq!(r.played_score, -CHILD_EVAL);
    assert_eq!(r.score_diff, 50 + CHILD_EVAL);
    assert_eq!(r.label, 1);
    assert_eq!(r.rating, 1500);

    let g = game(1, &[inside.as_str()]);
    let labels = label_game(&g, &mut FakeEngine::default(), &MoveScorer::default());
    let r = &labels.records[0];
    assert_eq!(r.played_score, 50);
    assert_eq!(r.score_diff, 0);
    assert_eq!(r.label, 0);
}

#[test]
fn records_follow_game_order_and_mover_rating() {
    let pgn = "[WhiteElo \"1450\"]\n[BlackElo \"1830\"]\n\n1. e4 e5 2. Nf3 Nc6 *\n";
    let g = GameStream::new(pgn.as_bytes(), 1).next().unwrap();
    let labels = label_game(&g, &mut FakeEngine::default(), &MoveScorer::default());
    assert_eq!(labels.records.len(), 4);
    let ratings: Vec<u32> = labels.records.iter().map(|r| r.rating).collect();
    assert_eq!(ratings, [1450, 1830, 1450, 1830]);
    assert_eq!(labels.records[0].position, Position::startpos().fen());
    assert!(labels.records.iter().all(|r| r.score_diff == r.best_score - r.played_score));
}

#[test]
fn unrated_game_yields_no_records() {
    let pgn = "[WhiteElo \"?\"]\n[BlackElo \"1500\"]\n\n1. e4 e5 *\n";
    let g = GameStream::new(pgn.as_bytes(), 1).next().unwrap();
    let mut engine = FakeEngine::default();
    let labels = label_game(&g, &mut engine, &MoveScorer::default());
    assert_eq!(labels.status, GameStatus::Unrated);
    assert!(labels.records.is_empty());
    assert_eq!(engine.analyze_calls, 0);
}

#[test]
fn failure_mid_game_keeps_partial_records() {
    let g = game(0, &["e2e4", "e7e5", "g1f3", "b8c6"]);
    let mut engine = FakeEngine {
        fail_after: Some(2),
        ..FakeEngine::default()
    };
    let labels = label_game(&g, &mut engine, &MoveScorer::default());
    assert!(matches!(labels.status, GameStatus::Aborted(_)));
    assert_eq!(labels.records.len(), 2);
}

#[test]
fn min_move_number_skips_opening() {
    let g = game(0, &["e2e4", "e7e5", "g1f3", "b8c6"]);
    let mut engine = FakeEngine::default();
    let scorer = MoveScorer::new(ScorerConfig {
        min_move_number: 2,
        ..ScorerConfig::default()
    });
    let labels = label_game(&g, &mut engine, &scorer);
    assert_eq!(labels.records.len(), 2);
    assert_eq!(labels.skipped_plies, 2);
    assert_eq!(engine.analyze_calls, 2);
}

/// 指定したワーカー番号だけ起動に失敗する
struct Factory {
    failing: Vec<usize>,
    panic_at: Option<String>,
    created: AtomicUsize,
}

impl Factory {
    fn new(failing: Vec<usize>) -> Self {
        Self {
            failing,
            panic_at: None,
            created: AtomicUsize::new(0),
        }
    }
}

impl SessionFactory for Factory {
    type Session = FakeEngine;

    fn create(&self, worker: usize) -> Result<FakeEngine> {
        if self.failing.contains(&worker) {
            bail!("engine binary not found");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEngine {
            panic_at: self.panic_at.clone(),
            ..FakeEngine::default()
        })
    }
}

fn games(n: usize) -> Vec<GameRecord> {
    (0..n).map(|i| game(i, &["e2e4", "e7e5", "d2d4"])).collect()
}

#[test]
fn pool_labels_every_game() {
    let pool = WorkerPool::new(3, MoveScorer::default());
    let factory = Factory::new(vec![]);
    let mut seen = 0;
    let report = pool.run(games(10), &factory, |_| seen += 1);

    assert_eq!(seen, 10);
    assert_eq!(report.completed, 10);
    assert_eq!(report.unavailable_workers, 0);
    assert_eq!(factory.created.load(Ordering::SeqCst), 3);

    let mut indices: Vec<usize> = report.games.iter().map(|g| g.game_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());

    let records = aggregate(report.games);
    assert_eq!(records.len(), 30);
}

#[test]
fn failed_worker_discards_without_blocking_others() {
    let pool = WorkerPool::new(3, MoveScorer::default());
    let factory = Factory::new(vec![1]);
    let report = pool.run(games(12), &factory, |_| {});

    assert_eq!(report.workers, 3);
    assert_eq!(report.unavailable_workers, 1);
    assert_eq!(report.completed + report.discarded, 12);
    assert_eq!(report.undispatched, 0);
    for g in &report.games {
        if g.worker == 1 {
            assert_eq!(g.status, GameStatus::Discarded);
            assert!(g.records.is_empty());
        } else {
            assert_eq!(g.records.len(), 3);
        }
    }
    assert_eq!(report.record_count(), report.completed * 3);
}

#[test]
fn panic_inside_a_game_aborts_only_that_game() {
    let mut batch = games(6);
    batch[2] = game(2, &["d2d4", "d7d5", "c2c4"]);
    let factory = Factory {
        panic_at: Some(fen_after(&["d2d4", "d7d5"])),
        ..Factory::new(vec![])
    };
    let report = WorkerPool::new(2, MoveScorer::default()).run(batch, &factory, |_| {});

    assert_eq!(report.games.len(), 6);
    assert_eq!(report.completed, 5);
    assert_eq!(report.aborted, 1);
    assert_eq!(report.unavailable_workers, 0);
    let broken = report.games.iter().find(|g| g.game_index == 2).unwrap();
    assert!(matches!(&broken.status, GameStatus::Aborted(r) if r.contains("panicked")));
    assert_eq!(broken.records.len(), 2);
    // 壊れたセッションは作り直される
    assert_eq!(factory.created.load(Ordering::SeqCst), 3);
}

#[test]
fn panic_in_last_game_does_not_hang_idle_workers() {
    let factory = Factory {
        panic_at: Some(Position::startpos().fen().to_string()),
        ..Factory::new(vec![])
    };
    let report = WorkerPool::new(2, MoveScorer::default()).run(games(1), &factory, |_| {});
    assert_eq!(report.aborted, 1);
    assert_eq!(report.record_count(), 0);
}

#[test]
fn pool_with_no_available_worker_finishes() {
    let pool = WorkerPool::new(2, MoveScorer::default());
    let factory = Factory::new(vec![0, 1]);
    let report = pool.run(games(4), &factory, |_| {});
    assert_eq!(report.discarded, 4);
    assert_eq!(report.unavailable_workers, 2);
    assert_eq!(report.record_count(), 0);
}

#[test]
fn shutdown_stops_dispatch() {
    let pool = WorkerPool::new(2, MoveScorer::default());
    assert_eq!(pool.workers(), 2);
    pool.shutdown_flag().store(true, Ordering::Relaxed);
    let report = pool.run(games(5), &Factory::new(vec![]), |_| {});
    assert_eq!(report.undispatched, 5);
    assert!(report.games.is_empty());
}
