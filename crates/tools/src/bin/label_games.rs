/// PGN 棋譜から悪手ラベル付きデータセットを作る。
///
/// ワーカーごとに UCI エンジンを 1 本ずつ起動し、1 局単位で並列に採点する。
///
/// # 使用例
///
/// ```shell
/// cargo run -p tools --release --bin label_games -- \
///   --input data/raw/games.pgn.gz --output data/processed/labels.csv \
///   --engine /usr/local/bin/stockfish --workers 8 --depth 10
/// ```
///
/// 設定ファイルを使う場合（コマンドライン指定が優先）:
/// ```shell
/// cargo run -p tools --release --bin label_games -- \
///   --config labeling.toml --input games.pgn --output labels.jsonl.gz
/// ```
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser as _;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rchess_core::MoveScorer;

use tools::common::io::open_reader;
use tools::labeling::{
    DatasetWriter, EngineConfig, GameRecord, GameStream, LabelingConfig, LabelingOverrides,
    SessionFactory, UciSession, WorkerPool, aggregate,
};

#[derive(clap::Parser, Debug)]
#[command(about = "label human blunders in PGN games with a pool of UCI engines")]
struct Cli {
    /// Input PGN file (.pgn or .pgn.gz, "-" for stdin)
    #[arg(long)]
    input: PathBuf,

    /// Output dataset (.csv or .jsonl, optionally .gz; "-" for stdout CSV)
    #[arg(long)]
    output: PathBuf,

    /// TOML config file ([engine] and [labeling] sections)
    #[arg(long)]
    config: Option<PathBuf>,

    /// UCI engine binary
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Extra argument passed to the engine binary (can be repeated)
    #[arg(long = "engine-arg", num_args = 1, allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Threads per engine
    #[arg(long)]
    threads: Option<usize>,

    /// Hash size (MiB) per engine
    #[arg(long)]
    hash_mb: Option<u32>,

    /// Additional UCI options (format: "Name=Value", can be repeated)
    #[arg(long = "uci-option", num_args = 1)]
    uci_options: Vec<String>,

    /// Per-search timeout in milliseconds
    #[arg(long)]
    search_timeout_ms: Option<u64>,

    /// MultiPV search depth
    #[arg(long)]
    depth: Option<u32>,

    /// Number of candidate moves (MultiPV)
    #[arg(long)]
    breadth: Option<usize>,

    /// Depth for evaluating a played move outside the candidates
    #[arg(long)]
    fallback_depth: Option<u32>,

    /// Skip positions before this move number
    #[arg(long)]
    min_move_number: Option<u32>,

    /// Maximum number of games to read
    #[arg(long)]
    max_games: Option<usize>,

    /// Number of workers (one engine each, default: available parallelism)
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    fn overrides(&self) -> LabelingOverrides {
        LabelingOverrides {
            engine: self.engine.clone(),
            engine_args: self.engine_args.clone(),
            threads: self.threads,
            hash_mb: self.hash_mb,
            options: self.uci_options.clone(),
            search_timeout_ms: self.search_timeout_ms,
            depth: self.depth,
            breadth: self.breadth,
            fallback_depth: self.fallback_depth,
            min_move_number: self.min_move_number,
            max_games: self.max_games,
            workers: self.workers,
        }
    }
}

/// ワーカーごとに UCI エンジンを 1 本起動する。
struct UciFactory {
    engine: EngineConfig,
}

impl SessionFactory for UciFactory {
    type Session = UciSession;

    fn create(&self, worker: usize) -> Result<UciSession> {
        UciSession::spawn(&self.engine, format!("w{worker}"))
    }

    fn new_game(&self, session: &mut UciSession) -> Result<()> {
        session.new_game()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => LabelingConfig::load(path)?,
        None => LabelingConfig::default(),
    };
    let config = base.merge(cli.overrides());
    if config.labeling.breadth == 0 {
        bail!("breadth must be at least 1");
    }

    // 棋譜を先にすべて読み込む（ワーカーへはメモリ上のリストから配る）
    let reader =
        open_reader(&cli.input).with_context(|| format!("failed to open {}", cli.input.display()))?;
    let games: Vec<GameRecord> = GameStream::new(reader, config.labeling.max_games).collect();
    let rated = games.iter().filter(|g| g.is_rated()).count();
    let pool = WorkerPool::new(config.worker_count(), MoveScorer::new(config.scorer()));
    info!(
        "loaded {} games ({} rated) from {}; labeling with {} workers, depth {}, breadth {}",
        games.len(),
        rated,
        cli.input.display(),
        pool.workers(),
        config.labeling.depth,
        config.labeling.breadth
    );

    // Ctrl-C ハンドラ
    {
        let shutdown = pool.shutdown_flag();
        ctrlc::set_handler(move || {
            eprintln!("\nShutting down gracefully (in-flight games will finish)...");
            shutdown.store(true, Ordering::Relaxed);
        })
        .ok();
    }

    let progress = ProgressBar::new(games.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} games ({per_sec}) {msg}")
            .context("invalid progress template")?,
    );

    let start = Instant::now();
    let factory = UciFactory {
        engine: config.engine.clone(),
    };
    let mut labeled = 0usize;
    let report = pool.run(games, &factory, |labels| {
        labeled += labels.records.len();
        progress.set_message(format!("{labeled} positions"));
        progress.inc(1);
    });
    progress.finish_and_clear();

    if report.unavailable_workers == report.workers {
        warn!("no evaluator session could be started; check --engine");
    }

    let summary = report.to_string();
    let records = aggregate(report.games);

    let mut writer = DatasetWriter::create(&cli.output)?;
    writer.write_all(&records)?;
    let written = writer.finish()?;

    let blunders = records.iter().filter(|r| r.label == 1).count();
    info!("{summary}");
    info!(
        "wrote {} positions ({} blunders) to {} in {:.1}s",
        written,
        blunders,
        cli.output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
