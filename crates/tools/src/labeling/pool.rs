//! 並列ラベリング
//!
//! crossbeam-channel のランデブーチャネルで 1 局ずつワーカーへ渡す。
//! 各ワーカーは起動時に自分専用の評価器セッションを 1 つ確保し、終了時に 1 回だけ
//! 破棄する。セッションを確保できなかったワーカーも局を受け取り続け、
//! レコード 0 件で返す（他のワーカーを止めない）。
//! 処理中の panic はその局だけの中断として扱い、必ず結果を 1 件返す。

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Result;
use crossbeam_channel as chan;
use log::{debug, info, warn};
use rchess_core::{LabeledRecord, MoveScorer, PlyOutcome, SearchEvaluator, SkipReason};

use super::games::GameRecord;

/// 1 局の処理結果の種別
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameStatus {
    /// 最後まで処理した
    Completed,
    /// レーティングが無い・数値でないので処理しなかった
    Unrated,
    /// 途中で中断した（それまでのレコードは残す）
    Aborted(String),
    /// 評価器の無いワーカーが受け取って捨てた
    Discarded,
}

/// 1 局分のラベル（局内の順序を保つ）
#[derive(Clone, Debug)]
pub struct GameLabels {
    pub game_index: usize,
    pub worker: usize,
    pub records: Vec<LabeledRecord>,
    pub skipped_plies: usize,
    pub status: GameStatus,
}

impl GameLabels {
    fn pending(game_index: usize, worker: usize) -> Self {
        Self {
            game_index,
            worker,
            records: Vec::new(),
            skipped_plies: 0,
            status: GameStatus::Completed,
        }
    }
}

/// 1 局を先頭から最後まで採点する。
///
/// 評価器が使えなくなった時点でその局を中断する。
pub fn label_game<E: SearchEvaluator + ?Sized>(
    game: &GameRecord,
    evaluator: &mut E,
    scorer: &MoveScorer,
) -> GameLabels {
    let mut labels = GameLabels::pending(game.index, 0);
    label_into(game, evaluator, scorer, &mut labels);
    labels
}

/// 途中で panic してもそれまでのレコードが `labels` に残る。
fn label_into<E: SearchEvaluator + ?Sized>(
    game: &GameRecord,
    evaluator: &mut E,
    scorer: &MoveScorer,
    labels: &mut GameLabels,
) {
    if !game.is_rated() {
        labels.status = GameStatus::Unrated;
        return;
    }

    for ply in game.plies() {
        let ply = match ply {
            Ok(ply) => ply,
            Err(e) => {
                labels.status = GameStatus::Aborted(e.to_string());
                break;
            }
        };
        let Some(rating) = game.rating_for(ply.mover) else {
            labels.status = GameStatus::Unrated;
            break;
        };
        match scorer.score(&ply.position, &ply.played, rating, evaluator) {
            PlyOutcome::Labeled(record) => labels.records.push(record),
            PlyOutcome::Skipped(SkipReason::Unavailable) => {
                labels.status =
                    GameStatus::Aborted(format!("evaluator unavailable at ply {}", ply.number));
                break;
            }
            PlyOutcome::Skipped(reason) => {
                debug!("game {} ply {}: skipped ({reason:?})", game.index, ply.number);
                labels.skipped_plies += 1;
            }
        }
    }
}

/// ワーカーが評価器セッションを確保するための口。`usize` はワーカー番号。
pub trait SessionFactory: Sync {
    type Session: SearchEvaluator;

    fn create(&self, worker: usize) -> Result<Self::Session>;

    /// 各局の開始前に呼ばれる（UCI なら `ucinewgame`）。
    fn new_game(&self, _session: &mut Self::Session) -> Result<()> {
        Ok(())
    }
}

/// 実行結果の集計
#[derive(Debug, Default)]
pub struct PoolReport {
    pub games: Vec<GameLabels>,
    pub workers: usize,
    pub unavailable_workers: usize,
    pub completed: usize,
    pub aborted: usize,
    pub unrated: usize,
    pub discarded: usize,
    /// 中断によりワーカーへ渡さなかった局数
    pub undispatched: usize,
}

impl PoolReport {
    fn record(&mut self, labels: GameLabels) {
        match labels.status {
            GameStatus::Completed => self.completed += 1,
            GameStatus::Unrated => self.unrated += 1,
            GameStatus::Aborted(_) => self.aborted += 1,
            GameStatus::Discarded => self.discarded += 1,
        }
        self.games.push(labels);
    }

    pub fn record_count(&self) -> usize {
        self.games.iter().map(|g| g.records.len()).sum()
    }
}

impl fmt::Display for PoolReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "games: completed={} aborted={} unrated={} discarded={} undispatched={} | workers: {} ({} unavailable)",
            self.completed,
            self.aborted,
            self.unrated,
            self.discarded,
            self.undispatched,
            self.workers,
            self.unavailable_workers
        )
    }
}

/// 固定数のワーカーで棋譜を並列にラベリングする。
pub struct WorkerPool {
    workers: usize,
    scorer: MoveScorer,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(workers: usize, scorer: MoveScorer) -> Self {
        Self {
            workers: workers.max(1),
            scorer,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 立てると以降の配布を止める（処理中の局は最後まで進む）。
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 全局を処理して集計を返す。`on_result` は 1 局終わるごとに呼ばれる。
    ///
    /// 結果の並びは終わった順（局をまたいだ順序は保証しない）。
    pub fn run<F: SessionFactory>(
        &self,
        games: Vec<GameRecord>,
        factory: &F,
        mut on_result: impl FnMut(&GameLabels),
    ) -> PoolReport {
        let total = games.len();
        let mut report = PoolReport {
            workers: self.workers,
            ..PoolReport::default()
        };

        // チャネルの作成（ランデブー）
        let (ticket_tx, ticket_rx) = chan::bounded::<GameRecord>(0);
        let (result_tx, result_rx) = chan::bounded::<GameLabels>(0);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|worker| {
                    let rx = ticket_rx.clone();
                    let tx = result_tx.clone();
                    let scorer = &self.scorer;
                    scope.spawn(move || worker_main(worker, factory, scorer, rx, tx))
                })
                .collect();
            // メインスレッドは result_tx を持たないので drop
            drop(result_tx);
            drop(ticket_rx);

            let mut dispatched = 0usize;
            let mut received = 0usize;
            let mut tickets = games.into_iter();
            let mut next_ticket = tickets.next();

            // メインイベントループ
            let mut workers_gone = false;
            while received < total && !workers_gone {
                if self.shutdown.load(Ordering::Relaxed) {
                    info!("shutdown requested; stopping dispatch after {dispatched} games");
                    break;
                }
                match &next_ticket {
                    None => match result_rx.recv() {
                        Ok(labels) => {
                            received += 1;
                            on_result(&labels);
                            report.record(labels);
                        }
                        Err(_) => workers_gone = true,
                    },
                    Some(game) => {
                        chan::select! {
                            send(ticket_tx, game.clone()) -> res => {
                                if res.is_ok() {
                                    dispatched += 1;
                                    next_ticket = tickets.next();
                                } else {
                                    warn!("no workers left; stopping dispatch");
                                    workers_gone = true;
                                }
                            }
                            recv(result_rx) -> labels => {
                                if let Ok(labels) = labels {
                                    received += 1;
                                    on_result(&labels);
                                    report.record(labels);
                                }
                            }
                        }
                    }
                }
            }

            // ワーカーを停止し、処理中の局の結果を受け取る
            drop(ticket_tx);
            for labels in result_rx.iter() {
                received += 1;
                on_result(&labels);
                report.record(labels);
            }
            report.undispatched = total - dispatched;

            for h in handles {
                match h.join() {
                    Ok(true) => {}
                    Ok(false) => report.unavailable_workers += 1,
                    Err(_) => {
                        warn!("worker thread panicked");
                        report.unavailable_workers += 1;
                    }
                }
            }
            debug!("pool finished: dispatched={dispatched} received={received}");
        });

        report
    }
}

/// ワーカー本体。評価器を確保できたら `true` を返す。
fn worker_main<F: SessionFactory>(
    worker: usize,
    factory: &F,
    scorer: &MoveScorer,
    rx: chan::Receiver<GameRecord>,
    tx: chan::Sender<GameLabels>,
) -> bool {
    let mut session = open_session(factory, worker);
    let available = session.is_some();

    while let Ok(game) = rx.recv() {
        let mut labels = GameLabels::pending(game.index, worker);
        let panicked = match session.as_mut() {
            Some(session) => {
                let res = panic::catch_unwind(AssertUnwindSafe(|| {
                    if let Err(e) = factory.new_game(session) {
                        warn!("worker {worker}: new game failed: {e:#}");
                    }
                    label_into(&game, session, scorer, &mut labels);
                }));
                match res {
                    Ok(()) => false,
                    Err(payload) => {
                        labels.status = GameStatus::Aborted(format!(
                            "worker panicked: {}",
                            panic_message(&*payload)
                        ));
                        true
                    }
                }
            }
            None => {
                labels.status = GameStatus::Discarded;
                false
            }
        };
        if let GameStatus::Aborted(reason) = &labels.status {
            warn!(
                "worker {worker}: game {} aborted after {} records: {reason}",
                game.index,
                labels.records.len()
            );
        }
        if panicked {
            // 途中状態のセッションは使い回さず作り直す
            drop(session.take());
            session = open_session(factory, worker);
        }
        if tx.send(labels).is_err() {
            break;
        }
    }
    // 手元に残ったセッションをここで破棄する
    drop(session);
    available
}

fn open_session<F: SessionFactory>(factory: &F, worker: usize) -> Option<F::Session> {
    match panic::catch_unwind(AssertUnwindSafe(|| factory.create(worker))) {
        Ok(Ok(session)) => Some(session),
        Ok(Err(e)) => {
            warn!("worker {worker}: evaluator unavailable: {e:#}");
            None
        }
        Err(payload) => {
            warn!(
                "worker {worker}: evaluator start panicked: {}",
                panic_message(&*payload)
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
