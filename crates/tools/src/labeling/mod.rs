pub mod config;
pub mod dataset;
pub mod engine;
pub mod games;
pub mod info;
pub mod pool;

pub use config::{LabelingConfig, LabelingOverrides};
pub use dataset::{DatasetWriter, aggregate};
pub use engine::{EngineConfig, UciSession};
pub use games::{GameRecord, GameStream, Ply};
pub use info::{InfoLine, MultipvCollector, parse_info_line};
pub use pool::{GameLabels, GameStatus, PoolReport, SessionFactory, WorkerPool, label_game};
