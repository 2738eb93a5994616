use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rchess_core::ScorerConfig;
use rchess_core::scorer::{DEFAULT_BREADTH, DEFAULT_DEPTH, DEFAULT_FALLBACK_DEPTH};
use serde::{Deserialize, Serialize};

use super::engine::EngineConfig;
use super::games::DEFAULT_MAX_GAMES;

/// ラベリング設定の `[labeling]` セクション
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingSection {
    pub depth: u32,
    pub breadth: usize,
    pub fallback_depth: u32,
    pub min_move_number: u32,
    pub max_games: usize,
    /// 0 なら利用可能な並列度
    pub workers: usize,
}

impl Default for LabelingSection {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            breadth: DEFAULT_BREADTH,
            fallback_depth: DEFAULT_FALLBACK_DEPTH,
            min_move_number: 1,
            max_games: DEFAULT_MAX_GAMES,
            workers: 0,
        }
    }
}

/// `--config` で読む TOML
///
/// ```toml
/// [engine]
/// path = "/usr/local/bin/stockfish"
/// threads = 1
/// hash_mb = 64
/// options = ["UCI_ShowWDL=false"]
/// search_timeout_ms = 30000
///
/// [labeling]
/// depth = 10
/// breadth = 5
/// workers = 8
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    pub engine: EngineConfig,
    pub labeling: LabelingSection,
}

/// コマンドラインで指定された値（指定されたものだけ上書きする）
#[derive(Clone, Debug, Default)]
pub struct LabelingOverrides {
    pub engine: Option<PathBuf>,
    pub engine_args: Vec<String>,
    pub threads: Option<usize>,
    pub hash_mb: Option<u32>,
    pub options: Vec<String>,
    pub search_timeout_ms: Option<u64>,
    pub depth: Option<u32>,
    pub breadth: Option<usize>,
    pub fallback_depth: Option<u32>,
    pub min_move_number: Option<u32>,
    pub max_games: Option<usize>,
    pub workers: Option<usize>,
}

impl LabelingConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// コマンドライン > 設定ファイル > 既定値 の順で合成する。
    pub fn merge(mut self, o: LabelingOverrides) -> Self {
        let engine = &mut self.engine;
        if let Some(path) = o.engine {
            engine.path = path;
        }
        if !o.engine_args.is_empty() {
            engine.args = o.engine_args;
        }
        if let Some(v) = o.threads {
            engine.threads = v;
        }
        if let Some(v) = o.hash_mb {
            engine.hash_mb = v;
        }
        // 追加オプションは設定ファイルの後ろに足す（同名は後勝ち）
        engine.options.extend(o.options);
        if let Some(v) = o.search_timeout_ms {
            engine.search_timeout_ms = v;
        }

        let labeling = &mut self.labeling;
        if let Some(v) = o.depth {
            labeling.depth = v;
        }
        if let Some(v) = o.breadth {
            labeling.breadth = v;
        }
        if let Some(v) = o.fallback_depth {
            labeling.fallback_depth = v;
        }
        if let Some(v) = o.min_move_number {
            labeling.min_move_number = v;
        }
        if let Some(v) = o.max_games {
            labeling.max_games = v;
        }
        if let Some(v) = o.workers {
            labeling.workers = v;
        }
        self
    }

    pub fn scorer(&self) -> ScorerConfig {
        ScorerConfig {
            depth: self.labeling.depth,
            breadth: self.labeling.breadth,
            fallback_depth: self.labeling.fallback_depth,
            min_move_number: self.labeling.min_move_number,
        }
    }

    /// 実際に起動するワーカー数
    pub fn worker_count(&self) -> usize {
        match self.labeling.workers {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        }
    }
}
