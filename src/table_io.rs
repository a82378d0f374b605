//! Suffix-aware buffered readers and writers.
//!
//! Shared by the tabular boundaries (raw BLAST table, ANI summary artifact)
//! and the FASTA writer. A `.gz` suffix selects transparent gzip on both
//! sides; everything else is plain buffered I/O.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz")
        .unwrap_or(false)
}

/// Open a file for reading, decoding gzip when the path ends in `.gz`.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Buffered output sink, gzip-compressed when the path ends in `.gz`.
///
/// `finish` must be called to flush buffers and write the gzip trailer;
/// dropping an unfinished gzip sink truncates the stream.
pub enum Sink {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl Sink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        if is_gzip(path) {
            Ok(Sink::Gzip(BufWriter::new(GzEncoder::new(
                file,
                Compression::default(),
            ))))
        } else {
            Ok(Sink::Plain(BufWriter::new(file)))
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            Sink::Plain(mut writer) => writer.flush()?,
            Sink::Gzip(writer) => {
                writer
                    .into_inner()
                    .map_err(io::IntoInnerError::into_error)?
                    .finish()?;
            }
        }
        Ok(())
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(writer) => writer.write(buf),
            Sink::Gzip(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(writer) => writer.flush(),
            Sink::Gzip(writer) => writer.flush(),
        }
    }
}
