use std::collections::BTreeMap;

use rchess_core::{Candidate, MoverScore, UciScore};

/// UCI `info` 行から採点に使う項目だけを取り出したもの
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoLine {
    /// 1 始まり。`multipv` が無い行は 1。
    pub multipv: usize,
    pub depth: Option<u32>,
    pub score: Option<UciScore>,
    /// `lowerbound` / `upperbound` 付きの暫定値
    pub bound: bool,
    /// PV の先頭手
    pub first_move: Option<String>,
}

/// `info` 行を解析する。`info string` や `currmove` だけの行は `None`。
pub fn parse_info_line(line: &str) -> Option<InfoLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first().copied() != Some("info") {
        return None;
    }
    let mut info = InfoLine {
        multipv: 1,
        ..InfoLine::default()
    };
    let mut i = 1;
    while i < tokens.len() {
        match tokens[i] {
            "string" => return None,
            "multipv" => {
                if let Some(v) = tokens.get(i + 1).and_then(|t| t.parse::<usize>().ok()) {
                    info.multipv = v;
                    i += 1;
                }
            }
            "depth" => {
                info.depth = tokens.get(i + 1).and_then(|t| t.parse::<u32>().ok());
                i += 1;
            }
            "score" => {
                if i + 2 < tokens.len() {
                    let value = tokens[i + 2].parse::<i32>().ok();
                    info.score = match (tokens[i + 1], value) {
                        ("cp", Some(v)) => Some(UciScore::Cp(v)),
                        ("mate", Some(v)) => Some(UciScore::Mate(v)),
                        _ => None,
                    };
                    i += 2;
                }
            }
            "lowerbound" | "upperbound" => info.bound = true,
            "pv" => {
                info.first_move = tokens.get(i + 1).map(|t| t.to_string());
                break;
            }
            _ => {}
        }
        i += 1;
    }
    if info.score.is_none() && info.first_move.is_none() {
        return None;
    }
    Some(info)
}

/// MultiPV 探索中の `info` 行を集め、`multipv` 番号ごとに最新の確定値を保持する。
#[derive(Debug, Default)]
pub struct MultipvCollector {
    lines: BTreeMap<usize, (u32, Candidate)>,
    /// `multipv 1` の評価値。PV が無い行（詰み・ステイルメイト局面の `score mate 0` など）も含む。
    primary_score: Option<(u32, UciScore)>,
}

impl MultipvCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.primary_score = None;
    }

    /// 1 行取り込む。採点に使えない行は無視する。
    pub fn push_line(&mut self, line: &str) {
        let Some(info) = parse_info_line(line) else {
            return;
        };
        if info.bound {
            return;
        }
        let Some(score) = info.score else {
            return;
        };
        let depth = info.depth.unwrap_or(0);
        if info.multipv == 1 && !self.primary_score.is_some_and(|(seen, _)| seen > depth) {
            self.primary_score = Some((depth, score));
        }
        let Some(mv) = info.first_move else {
            return;
        };
        // 浅い深さの遅延行で上書きしない
        if self.lines.get(&info.multipv).is_some_and(|(seen, _)| *seen > depth) {
            return;
        }
        self.lines.insert(info.multipv, (depth, Candidate::new(mv, MoverScore::from_engine(score))));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `multipv` 番号順（エンジンの順位そのまま）に最大 `breadth` 本を返す。
    pub fn candidates(&self, breadth: usize) -> Vec<Candidate> {
        self.lines.values().take(breadth).map(|(_, c)| c.clone()).collect()
    }

    /// `multipv 1` の候補手
    pub fn primary(&self) -> Option<&Candidate> {
        self.lines.get(&1).map(|(_, c)| c)
    }

    /// 局面の手番側から見た最善評価値
    pub fn primary_score(&self) -> Option<MoverScore> {
        self.primary_score.map(|(_, s)| MoverScore::from_engine(s))
    }
}
