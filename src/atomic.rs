// Crash-safe file replacement.
//
// `AtomicRewrite::begin` opens a hidden sibling temp file next to the target.
// Lines are written (and re-compressed when the target is .gz/.zst), then
// `finish` flushes and fsyncs it into a `StagedFile`. Only `commit` touches
// the target, with a single rename followed by an fsync of the directory.
// Dropping either value at any point removes the temp file and leaves the
// target exactly as it was.

use anyhow::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

use crate::io::Compression;

enum Encoder {
    Plain(BufWriter<NamedTempFile>),
    Gzip(GzEncoder<BufWriter<NamedTempFile>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<NamedTempFile>>),
}

impl Write for Encoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Gzip(w) => w.write(buf),
            Encoder::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Gzip(w) => w.flush(),
            Encoder::Zstd(w) => w.flush(),
        }
    }
}

pub struct AtomicRewrite {
    target: PathBuf,
    encoder: Encoder,
}

impl AtomicRewrite {
    pub fn begin(target: &Path) -> Result<Self, Error> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let name = target
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("rewrite");
        let temp = Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(dir)?;
        let writer = BufWriter::new(temp);

        let encoder = match Compression::from_path(target) {
            Compression::None => Encoder::Plain(writer),
            Compression::Gzip => Encoder::Gzip(GzEncoder::new(writer, GzLevel::default())),
            Compression::Zstd => Encoder::Zstd(zstd::stream::write::Encoder::new(writer, 0)?),
        };

        Ok(AtomicRewrite {
            target: target.to_path_buf(),
            encoder,
        })
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.encoder.write_all(line.as_bytes())?;
        self.encoder.write_all(b"\n")
    }

    /// Finish the codec, flush and fsync. The target is still untouched.
    pub fn finish(self) -> Result<StagedFile, Error> {
        let buffered = match self.encoder {
            Encoder::Plain(w) => w,
            Encoder::Gzip(w) => w.finish()?,
            Encoder::Zstd(w) => w.finish()?,
        };
        let temp = buffered.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        Ok(StagedFile {
            target: self.target,
            temp,
        })
    }
}

/// A fully written, durable replacement waiting to be swapped in.
pub struct StagedFile {
    target: PathBuf,
    temp: NamedTempFile,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn commit(self) -> Result<(), Error> {
        if let Ok(meta) = fs::metadata(&self.target) {
            fs::set_permissions(self.temp.path(), meta.permissions())?;
        }
        let target = self.target;
        self.temp.persist(&target).map_err(|e| e.error)?;
        sync_parent_dir(&target)?;
        Ok(())
    }

    pub fn discard(self) -> Result<(), Error> {
        self.temp.close()?;
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
