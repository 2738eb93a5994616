use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{self as chan, Receiver, RecvTimeoutError};
use log::{debug, warn};
use rchess_core::{Candidate, EvalOutcome, MoverScore, Position, SearchEvaluator};
use serde::{Deserialize, Serialize};

use super::info::MultipvCollector;

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// `stop` 送信後に `bestmove` を待つ時間
pub const ENGINE_STOP_GRACE: Duration = Duration::from_secs(2);
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

/// エンジンプロセス起動時の設定。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub threads: usize,
    pub hash_mb: u32,
    /// 追加のUCIオプション (Name=Value 形式)
    pub options: Vec<String>,
    /// 1 回の `go` の上限（ミリ秒）。超えたら `stop` を送る。0 なら無制限。
    pub search_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            threads: 1,
            hash_mb: 64,
            options: Vec::new(),
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT.as_millis() as u64,
        }
    }
}

/// 1本のUCIエンジンに対する入出力をカプセル化する。
///
/// プロセスが落ちた・応答が崩れた後は `dead` になり、以降の問い合わせは
/// すべて `EvalOutcome::Unavailable` を返す。再起動はしない。
pub struct UciSession {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    opt_names: HashSet<String>,
    multipv: Option<usize>,
    search_timeout: Option<Duration>,
    collector: MultipvCollector,
    dead: bool,
    pub label: String,
}

impl UciSession {
    pub fn spawn(cfg: &EngineConfig, label: String) -> Result<Self> {
        let mut cmd = Command::new(&cfg.path);
        cmd.args(&cfg.args);
        // 端末からの SIGINT がエンジンに届かないよう別のプロセスグループで起動する。
        // 中断時も処理中の局はエンジンを使って最後まで進める。
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", cfg.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let (tx, rx) = chan::unbounded::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(l) = line else { break };
                if tx.send(l).is_err() {
                    break;
                }
            }
        });

        let mut session = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            opt_names: HashSet::new(),
            multipv: None,
            search_timeout: (cfg.search_timeout_ms > 0)
                .then(|| Duration::from_millis(cfg.search_timeout_ms)),
            collector: MultipvCollector::new(),
            dead: false,
            label,
        };
        session.initialize(cfg)?;
        Ok(session)
    }

    fn initialize(&mut self, cfg: &EngineConfig) -> Result<()> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.opt_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }
        self.set_option_if_available("Threads", &cfg.threads.to_string())?;
        self.set_option_if_available("Hash", &cfg.hash_mb.to_string())?;
        for opt in &cfg.options {
            match opt.split_once('=') {
                Some((name, value)) => self.set_option_if_available(name.trim(), value.trim())?,
                // "=" がない場合は button 型とみなし、値なしで送る
                None => self.write_line(&format!("setoption name {}", opt.trim()))?,
            }
        }
        self.sync_ready()?;
        debug!("{}: ready ({} options advertised)", self.label, self.opt_names.len());
        Ok(())
    }

    /// 対局の区切り。置換表などエンジン側の状態を捨てさせる。
    pub fn new_game(&mut self) -> Result<()> {
        if self.dead {
            return Err(anyhow!("{}: engine is not available", self.label));
        }
        let res = self.write_line("ucinewgame").and_then(|()| self.sync_ready());
        if res.is_err() {
            self.dead = true;
        }
        res
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    fn set_multipv(&mut self, breadth: usize) -> Result<()> {
        if self.multipv != Some(breadth) {
            self.set_option_if_available("MultiPV", &breadth.to_string())?;
            self.multipv = Some(breadth);
        }
        Ok(())
    }

    /// 固定深さで探索し、`info` 行を `collector` に集める。
    fn search(&mut self, position: &Position, depth: u32, breadth: usize) -> EvalOutcome<()> {
        if self.dead {
            return EvalOutcome::Unavailable;
        }
        self.collector.clear();
        let sent = self
            .set_multipv(breadth)
            .and_then(|()| self.write_line(&format!("position fen {}", position.fen())))
            .and_then(|()| self.write_line(&format!("go depth {depth}")));
        if let Err(e) = sent {
            warn!("{}: {e}", self.label);
            self.dead = true;
            return EvalOutcome::Unavailable;
        }

        let start = Instant::now();
        // 表せないほど長い上限は無制限と同じ
        let mut deadline = self.search_timeout.and_then(|t| start.checked_add(t));
        let mut stop_sent = false;
        loop {
            let received = match deadline {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(line) => {
                    if line.starts_with("info") {
                        self.collector.push_line(&line);
                    } else if line.starts_with("bestmove") {
                        if stop_sent {
                            return EvalOutcome::Timeout;
                        }
                        return EvalOutcome::Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if stop_sent {
                        // stop にも応答しない。以降の入出力は信用できない。
                        warn!("{}: no bestmove after stop, marking unavailable", self.label);
                        self.dead = true;
                        return EvalOutcome::Timeout;
                    }
                    warn!(
                        "{}: search timed out after {:?} ({})",
                        self.label,
                        start.elapsed(),
                        position.fen()
                    );
                    if self.write_line("stop").is_err() {
                        self.dead = true;
                        return EvalOutcome::Unavailable;
                    }
                    stop_sent = true;
                    deadline = Some(Instant::now() + ENGINE_STOP_GRACE);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("{}: engine exited unexpectedly", self.label);
                    self.dead = true;
                    return EvalOutcome::Unavailable;
                }
            }
        }
    }

    pub fn sync_ready(&mut self) -> Result<()> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line == "readyok" {
                break;
            }
        }
        Ok(())
    }

    pub fn recv_line(&self, timeout: Duration) -> Result<String> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => anyhow!("{}: engine read timeout", self.label),
            RecvTimeoutError::Disconnected => anyhow!("{}: engine exited", self.label),
        })
    }

    pub fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<()> {
        if self.opt_names.contains(name) {
            self.write_line(&format!("setoption name {name} value {value}"))?;
        } else {
            debug!("{}: option {name} not advertised, skipped", self.label);
        }
        Ok(())
    }

    pub fn write_line(&mut self, msg: &str) -> Result<()> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }
}

impl SearchEvaluator for UciSession {
    fn analyze(
        &mut self,
        position: &Position,
        depth: u32,
        breadth: usize,
    ) -> EvalOutcome<Vec<Candidate>> {
        self.search(position, depth, breadth).map(|()| self.collector.candidates(breadth))
    }

    fn evaluate(&mut self, position: &Position, depth: u32) -> EvalOutcome<MoverScore> {
        match self.search(position, depth, 1) {
            EvalOutcome::Ok(()) => match self.collector.primary_score() {
                Some(score) => EvalOutcome::Ok(score),
                None => EvalOutcome::Unavailable,
            },
            EvalOutcome::Timeout => EvalOutcome::Timeout,
            EvalOutcome::Unavailable => EvalOutcome::Unavailable,
        }
    }
}

impl Drop for UciSession {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `option name <NAME...> type ...` から名前を取り出す（空白を含む名前に対応）。
pub fn parse_option_name(line: &str) -> Option<String> {
    let parts: Vec<&str> = line
        .split_whitespace()
        .skip_while(|t| *t != "name")
        .skip(1)
        .take_while(|t| *t != "type")
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}
