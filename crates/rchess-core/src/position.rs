//! 局面（Position）
//!
//! FEN 文字列 1 本を局面の正規表現とし、合法手生成・着手は shakmaty に委ねる。
//! 手番反転のように合法性が崩れうる変換後の局面も保持できるよう、
//! 盤面スナップショット（`Setup`）と指せる局面（`Chess`）を分けて持つ。

use std::fmt;

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position as _, Setup};

pub use shakmaty::Color;

/// 平手初期局面
pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// 局面に関するエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("malformed FEN '{fen}': {reason}")]
    MalformedFen { fen: String, reason: String },
    #[error("illegal position '{fen}': {reason}")]
    IllegalPosition { fen: String, reason: String },
    #[error("FEN '{0}' has no side-to-move field")]
    MissingSideToMove(String),
    #[error("FEN '{fen}' has invalid side-to-move field '{field}'")]
    InvalidSideToMove { fen: String, field: String },
    #[error("position '{0}' is not playable")]
    Unplayable(String),
    #[error("illegal move '{mv}' in position '{fen}'")]
    IllegalMove { fen: String, mv: String },
}

/// 局面
///
/// `fen` は常に `setup` と一致する。`chess` は合法局面のときだけ `Some`。
#[derive(Clone, Debug)]
pub struct Position {
    fen: String,
    setup: Setup,
    chess: Option<Chess>,
}

impl Position {
    /// 平手初期局面
    pub fn startpos() -> Self {
        Self::from_chess(Chess::default())
    }

    /// 合法局面として FEN を読み込む。
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let fen = fen.trim();
        let parsed = parse_fen(fen)?;
        let chess: Chess = parsed.into_position(CastlingMode::Standard).map_err(|e| {
            PositionError::IllegalPosition {
                fen: fen.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::from_chess(chess))
    }

    /// 合法性を問わずに FEN を読み込む。
    ///
    /// 文字列は入力のまま保持する。合法局面でなければ着手・合法手生成はできない。
    pub fn from_fen_unchecked(fen: &str) -> Result<Self, PositionError> {
        let fen = fen.trim();
        let parsed = parse_fen(fen)?;
        let setup = parsed.as_setup().clone();
        let chess = parsed.into_position::<Chess>(CastlingMode::Standard).ok();
        Ok(Self {
            fen: fen.to_string(),
            setup,
            chess,
        })
    }

    pub(crate) fn from_chess(chess: Chess) -> Self {
        let fen = Fen::from_position(chess.clone(), EnPassantMode::Legal);
        Self {
            setup: fen.as_setup().clone(),
            fen: fen.to_string(),
            chess: Some(chess),
        }
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn turn(&self) -> Color {
        self.setup.turn
    }

    /// FEN の手数フィールド（1 始まり）
    pub fn fullmove_number(&self) -> u32 {
        self.setup.fullmoves.get()
    }

    pub fn is_playable(&self) -> bool {
        self.chess.is_some()
    }

    fn playable(&self) -> Result<&Chess, PositionError> {
        self.chess.as_ref().ok_or_else(|| PositionError::Unplayable(self.fen.clone()))
    }

    /// 合法手を生成順に返す。
    pub fn legal_moves(&self) -> Result<Vec<Move>, PositionError> {
        Ok(self.playable()?.legal_moves().into_iter().collect())
    }

    /// 指し手を適用した子局面を返す。`self` は変更しない。
    pub fn play(&self, mv: &Move) -> Result<Position, PositionError> {
        let chess = self.playable()?;
        if !chess.is_legal(mv) {
            return Err(PositionError::IllegalMove {
                fen: self.fen.clone(),
                mv: uci_string(mv),
            });
        }
        let mut next = chess.clone();
        next.play_unchecked(mv.clone());
        Ok(Self::from_chess(next))
    }

    /// UCI 表記（`e2e4`, `e7e8q`, `e1g1`）を合法手に変換する。
    pub fn parse_uci(&self, uci: &str) -> Result<Move, PositionError> {
        let chess = self.playable()?;
        let illegal = || PositionError::IllegalMove {
            fen: self.fen.clone(),
            mv: uci.to_string(),
        };
        let parsed: UciMove = uci.parse().map_err(|_| illegal())?;
        parsed.to_move(chess).map_err(|_| illegal())
    }

    /// SAN（`Nf3`, `exd5`, `O-O`, `e8=Q+`）を合法手に変換する。
    pub fn resolve_san(&self, san: &San) -> Result<Move, PositionError> {
        let chess = self.playable()?;
        san.to_move(chess).map_err(|_| PositionError::IllegalMove {
            fen: self.fen.clone(),
            mv: san.to_string(),
        })
    }

    pub fn parse_san(&self, san: &str) -> Result<Move, PositionError> {
        let parsed: San = san.parse().map_err(|_| PositionError::IllegalMove {
            fen: self.fen.clone(),
            mv: san.to_string(),
        })?;
        self.resolve_san(&parsed)
    }

    /// 手番だけを反転した局面。指し手は適用しない。
    pub fn toggled_side_to_move(&self) -> Result<Position, PositionError> {
        Self::from_fen_unchecked(&toggle_side_to_move(&self.fen)?)
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for Position {}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

/// FEN の手番フィールドだけを反転する。
///
/// 他のフィールドには触れない。手番フィールドが欠けている・不正な場合はエラー。
pub fn toggle_side_to_move(fen: &str) -> Result<String, PositionError> {
    let mut fields: Vec<&str> = fen.split_whitespace().collect();
    let Some(&turn) = fields.get(1) else {
        return Err(PositionError::MissingSideToMove(fen.to_string()));
    };
    fields[1] = match turn {
        "w" => "b",
        "b" => "w",
        other => {
            return Err(PositionError::InvalidSideToMove {
                fen: fen.to_string(),
                field: other.to_string(),
            });
        }
    };
    Ok(fields.join(" "))
}

/// 標準チェスの UCI 表記（キャスリングは `e1g1` 形式）
pub fn uci_string(mv: &Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

fn parse_fen(fen: &str) -> Result<Fen, PositionError> {
    fen.parse::<Fen>().map_err(|e| PositionError::MalformedFen {
        fen: fen.to_string(),
        reason: e.to_string(),
    })
}
