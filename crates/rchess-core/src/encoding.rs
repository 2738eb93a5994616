//! 盤面エンコーディング
//!
//! 予測モデルへの入力形式。学習側と推論側で同一でなければならず、
//! 並びがずれても例外にはならず黙って誤分類するため、順序はここで固定する。
//!
//! - plane: 歩・ナイト・ビショップ・ルーク・クイーン・キング（白 0-5、黒 6-11）
//! - 軸: `[plane][rank][file]`、rank/file は a1 = (0, 0)
//! - 値: その駒が居るマスだけ 1.0

use shakmaty::{Piece, Role};

use crate::position::{Color, Position};

/// 駒種 6 × 色 2
pub const PLANES: usize = 12;
/// 1 plane あたりのマス数
pub const SQUARES: usize = 64;
/// 特徴量の総数
pub const INPUT_SIZE: usize = PLANES * SQUARES;

/// レーティング正規化定数
pub const RATING_SCALE: f32 = 3000.0;

/// `[plane][rank][file]`
pub type BoardPlanes = [[[f32; 8]; 8]; PLANES];

/// 駒に対応する plane 番号
#[inline]
pub fn plane_index(piece: Piece) -> usize {
    let role = match piece.role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    };
    match piece.color {
        Color::White => role,
        Color::Black => role + 6,
    }
}

/// 局面を 12 plane の指示グリッドに変換する。
///
/// 盤上の駒配置だけを見る。手番・キャスリング権・アンパッサンは含まない。
pub fn encode_planes(position: &Position) -> BoardPlanes {
    let mut planes = [[[0.0f32; 8]; 8]; PLANES];
    for (square, piece) in position.setup().board.iter() {
        let idx = square as usize;
        let (rank, file) = (idx / 8, idx % 8);
        planes[plane_index(piece)][rank][file] = 1.0;
    }
    planes
}

/// `[plane][rank][file]` の順に平坦化する。
pub fn flatten(planes: &BoardPlanes) -> Vec<f32> {
    planes.iter().flatten().flatten().copied().collect()
}

/// 平坦化後の添字
#[inline]
pub const fn flat_index(plane: usize, rank: usize, file: usize) -> usize {
    plane * SQUARES + rank * 8 + file
}

/// レーティングを予測モデル入力用に正規化する。
#[inline]
pub fn normalize_rating(rating: u32) -> f32 {
    rating as f32 / RATING_SCALE
}
