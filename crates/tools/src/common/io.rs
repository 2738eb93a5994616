//! ファイルI/Oユーティリティ（gzip対応、`-` は標準入出力）

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// `.gz` を除いた拡張子（小文字）。`games.pgn.gz` → `pgn`
pub fn inner_extension(path: &Path) -> Option<String> {
    let inner: PathBuf = if is_gzip(path) {
        path.with_extension("")
    } else {
        path.to_path_buf()
    };
    inner.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let p = path.as_ref();
    if is_stdio(p) {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    if is_gzip(p) {
        // 連結された gzip メンバー（分割ダウンロードした PGN を cat したもの）も読む
        let dec = MultiGzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Stdout(BufWriter<io::Stdout>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Stdout(s) => s.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Stdout(s) => s.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush underlying file/stdout.
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(mut f) => {
                f.flush()?;
                f.into_inner().map_err(|e| e.into_error())?.sync_all()
            }
            Writer::Stdout(mut s) => s.flush(),
            Writer::Gz(e) => {
                let mut inner = e.finish()?;
                inner.flush()
            }
        }
    }
}

/// 出力先を開く。親ディレクトリが無ければ作る。
pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    if is_stdio(p) {
        return Ok(Writer::Stdout(BufWriter::new(io::stdout())));
    }
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let f = BufWriter::new(File::create(p)?);
    if is_gzip(p) {
        return Ok(Writer::Gz(GzEncoder::new(f, Compression::default())));
    }
    Ok(Writer::Plain(f))
}
