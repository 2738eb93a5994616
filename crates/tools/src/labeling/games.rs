//! PGN 棋譜ストリーム
//!
//! 入力を 1 局ずつ読み、指し手を開始局面から合法性検査しながら並べた
//! `GameRecord` を返す。読み込み上限（`max_games`）に達するか、入力の終端・
//! 壊れたレコードに当たった時点で止まる。

use std::io::Read;

use log::warn;
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use rchess_core::{Color, Move, Position, PositionError};

pub const DEFAULT_MAX_GAMES: usize = 10_000;

/// 1 局分の棋譜（不変、1 ワーカーが 1 回だけ消費する）
#[derive(Clone, Debug)]
pub struct GameRecord {
    /// 入力中の通し番号（0 始まり）
    pub index: usize,
    pub white_rating: Option<u32>,
    pub black_rating: Option<u32>,
    start: Position,
    moves: Vec<Move>,
}

/// 1 ply 分（着手前局面・指された手・手番側）
#[derive(Clone, Debug)]
pub struct Ply {
    /// 0 始まりの ply 番号
    pub number: usize,
    pub position: Position,
    pub played: Move,
    pub mover: Color,
}

impl GameRecord {
    pub fn new(
        index: usize,
        start: Position,
        moves: Vec<Move>,
        white_rating: Option<u32>,
        black_rating: Option<u32>,
    ) -> Self {
        Self {
            index,
            white_rating,
            black_rating,
            start,
            moves,
        }
    }

    pub fn start(&self) -> &Position {
        &self.start
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn rating_for(&self, color: Color) -> Option<u32> {
        match color {
            Color::White => self.white_rating,
            Color::Black => self.black_rating,
        }
    }

    /// 両者のレーティングが数値で揃っているか
    pub fn is_rated(&self) -> bool {
        self.white_rating.is_some() && self.black_rating.is_some()
    }

    /// 開始局面から 1 手ずつ進めながら各 ply を返す。
    ///
    /// 着手に失敗した時点で `Err` を 1 回返して終わる。
    pub fn plies(&self) -> Plies<'_> {
        Plies {
            current: Some(self.start.clone()),
            moves: self.moves.iter().enumerate(),
        }
    }
}

pub struct Plies<'a> {
    current: Option<Position>,
    moves: std::iter::Enumerate<std::slice::Iter<'a, Move>>,
}

impl Iterator for Plies<'_> {
    type Item = Result<Ply, PositionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.current.take()?;
        let (number, mv) = self.moves.next()?;
        match position.play(mv) {
            Ok(child) => {
                self.current = Some(child);
                Some(Ok(Ply {
                    number,
                    mover: position.turn(),
                    position,
                    played: mv.clone(),
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// `WhiteElo` / `BlackElo` の値。`?` や数値以外は `None`。
fn parse_rating(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}

/// 1 局分を組み立てる visitor
#[derive(Default)]
struct GameBuilder {
    white_rating: Option<u32>,
    black_rating: Option<u32>,
    fen: Option<String>,
    start: Option<Position>,
    position: Option<Position>,
    moves: Vec<Move>,
    /// 開始局面が壊れている
    malformed: Option<String>,
    /// 不正な指し手以降を捨てた
    truncated: Option<String>,
}

enum BuiltGame {
    Game {
        start: Position,
        moves: Vec<Move>,
        white_rating: Option<u32>,
        black_rating: Option<u32>,
        truncated: Option<String>,
    },
    Malformed(String),
}

impl Visitor for GameBuilder {
    type Result = BuiltGame;

    fn begin_game(&mut self) {
        *self = GameBuilder::default();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        let value = value.decode_utf8_lossy();
        match key {
            b"WhiteElo" => self.white_rating = parse_rating(&value),
            b"BlackElo" => self.black_rating = parse_rating(&value),
            b"FEN" => self.fen = Some(value.into_owned()),
            _ => {}
        }
    }

    fn end_headers(&mut self) -> Skip {
        let start = match self.fen.as_deref() {
            Some(fen) => Position::from_fen(fen),
            None => Ok(Position::startpos()),
        };
        match start {
            Ok(pos) => {
                self.start = Some(pos.clone());
                self.position = Some(pos);
                Skip(false)
            }
            Err(e) => {
                self.malformed = Some(e.to_string());
                Skip(true)
            }
        }
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.truncated.is_some() {
            return;
        }
        let Some(pos) = self.position.as_ref() else {
            return;
        };
        let next = pos.resolve_san(&san_plus.san).and_then(|mv| Ok((pos.play(&mv)?, mv)));
        match next {
            Ok((child, mv)) => {
                self.moves.push(mv);
                self.position = Some(child);
            }
            Err(e) => self.truncated = Some(e.to_string()),
        }
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        let builder = std::mem::take(self);
        if let Some(reason) = builder.malformed {
            return BuiltGame::Malformed(reason);
        }
        let Some(start) = builder.start else {
            return BuiltGame::Malformed("missing start position".to_string());
        };
        BuiltGame::Game {
            start,
            moves: builder.moves,
            white_rating: builder.white_rating,
            black_rating: builder.black_rating,
            truncated: builder.truncated,
        }
    }
}

/// PGN 入力から `GameRecord` を順に取り出すイテレータ
pub struct GameStream<R: Read> {
    reader: BufferedReader<R>,
    builder: GameBuilder,
    max_games: usize,
    read: usize,
    finished: bool,
}

impl<R: Read> GameStream<R> {
    pub fn new(reader: R, max_games: usize) -> Self {
        Self {
            reader: BufferedReader::new(reader),
            builder: GameBuilder::default(),
            max_games,
            read: 0,
            finished: false,
        }
    }

    /// これまでに読んだ局数
    pub fn games_read(&self) -> usize {
        self.read
    }
}

impl<R: Read> Iterator for GameStream<R> {
    type Item = GameRecord;

    fn next(&mut self) -> Option<GameRecord> {
        if self.finished || self.read >= self.max_games {
            return None;
        }
        let built = match self.reader.read_game(&mut self.builder) {
            Ok(Some(built)) => built,
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(e) => {
                warn!("stopping game stream after {} games: {e}", self.read);
                self.finished = true;
                return None;
            }
        };
        match built {
            BuiltGame::Game {
                start,
                moves,
                white_rating,
                black_rating,
                truncated,
            } => {
                let index = self.read;
                self.read += 1;
                if let Some(reason) = truncated {
                    warn!("game {index}: truncated after {} moves ({reason})", moves.len());
                }
                Some(GameRecord::new(index, start, moves, white_rating, black_rating))
            }
            BuiltGame::Malformed(reason) => {
                warn!("stopping game stream at malformed game {}: {reason}", self.read);
                self.finished = true;
                None
            }
        }
    }
}
