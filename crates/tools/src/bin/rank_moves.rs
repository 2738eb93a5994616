/// 学習済みモデルで局面の合法手を「相手が悪手を指しやすい順」に並べる。
///
/// 1 回の起動で 1 局面を処理し、結果を JSON で標準出力に書く。
/// `--single` を付けると候補手を並べず、その局面の誤り確率だけを返す。
///
/// ```shell
/// cargo run -p tools --release --bin rank_moves -- \
///   --model models/linear.json --rating 1500 \
///   --fen "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
/// ```
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as _;
use log::info;
use rchess_core::{LinearModel, ModelEvaluator, Position, STARTPOS_FEN, predict, rank_moves};
use serde::Serialize;

#[derive(clap::Parser, Debug)]
#[command(about = "rank legal moves by predicted opponent error probability")]
struct Cli {
    /// Trained model (JSON)
    #[arg(long)]
    model: PathBuf,

    /// Position to rank (FEN)
    #[arg(long, default_value = STARTPOS_FEN)]
    fen: String,

    /// Rating of the player to move next
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=3000))]
    rating: u32,

    /// Only print the top N moves
    #[arg(long)]
    top: Option<usize>,

    /// Only predict the error probability of the position itself
    #[arg(long, conflicts_with = "top")]
    single: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let position = Position::from_fen(&cli.fen)?;
    let model = LinearModel::load(&cli.model)?;
    let mut evaluator = ModelEvaluator::new(model);

    if cli.single {
        let prediction = predict(&position, cli.rating, &mut evaluator)?;
        info!(
            "error probability {:.4} (risky: {})",
            prediction.probability, prediction.is_risky
        );
        return print_json(&prediction, cli.pretty);
    }

    let mut ranking = rank_moves(&position, cli.rating, &mut evaluator)?;
    info!(
        "{} legal moves, baseline {:.4}",
        ranking.moves.len(),
        ranking.baseline_probability
    );
    if let Some(n) = cli.top {
        ranking.moves.truncate(n);
    }
    print_json(&ranking, cli.pretty)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out).context("failed to write result")?;
    Ok(())
}
