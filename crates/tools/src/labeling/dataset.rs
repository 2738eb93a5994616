use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use rchess_core::LabeledRecord;

use super::pool::GameLabels;
use crate::common::io::{Writer, inner_extension, open_writer};

/// 局ごとのラベル列を 1 本に連結する（局内の順序は保つ）。
pub fn aggregate<I>(games: I) -> Vec<LabeledRecord>
where
    I: IntoIterator<Item = GameLabels>,
{
    games.into_iter().flat_map(|g| g.records).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Jsonl,
}

impl DatasetFormat {
    /// 拡張子から判定する（`.gz` は外して見る）。`-` は CSV。
    pub fn from_path(path: &Path) -> Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(DatasetFormat::Csv);
        }
        match inner_extension(path).as_deref() {
            Some("csv") => Ok(DatasetFormat::Csv),
            Some("jsonl") | Some("ndjson") => Ok(DatasetFormat::Jsonl),
            other => bail!(
                "unsupported dataset extension {:?} for {} (use .csv or .jsonl, optionally .gz)",
                other.unwrap_or(""),
                path.display()
            ),
        }
    }
}

enum Sink {
    Csv(csv::Writer<Writer>),
    Jsonl(Writer),
}

/// ラベル付きレコードの書き出し。列名と順序は固定。
pub struct DatasetWriter {
    sink: Sink,
    written: usize,
}

impl DatasetWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = DatasetFormat::from_path(path)?;
        let out =
            open_writer(path).with_context(|| format!("failed to create {}", path.display()))?;
        let sink = match format {
            DatasetFormat::Csv => Sink::Csv(csv::Writer::from_writer(out)),
            DatasetFormat::Jsonl => Sink::Jsonl(out),
        };
        Ok(Self { sink, written: 0 })
    }

    pub fn write(&mut self, record: &LabeledRecord) -> Result<()> {
        match &mut self.sink {
            Sink::Csv(w) => w.serialize(record)?,
            Sink::Jsonl(w) => {
                serde_json::to_writer(&mut *w, record)?;
                std::io::Write::write_all(w, b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn write_all<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a LabeledRecord>,
    {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// 書き出しを確定する。gzip の終端もここで書く。
    pub fn finish(self) -> Result<usize> {
        let out = match self.sink {
            Sink::Csv(w) => w
                .into_inner()
                .map_err(|e| anyhow!("failed to flush dataset: {}", e.error()))?,
            Sink::Jsonl(w) => w,
        };
        out.close().context("failed to finalize dataset")?;
        Ok(self.written)
    }
}
