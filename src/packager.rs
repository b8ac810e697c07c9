//! Packs a finished batch directory into one downloadable zip archive.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{Error, Result};

/// A packaged batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub source_directory: PathBuf,
    pub archive_path: PathBuf,
}

impl Archive {
    /// File name clients download, e.g. `Book.zip`.
    pub fn file_name(&self) -> String {
        self.archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Writes archives into a public download directory.
#[derive(Debug, Clone)]
pub struct Packager {
    output_dir: PathBuf,
}

impl Packager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.zip", archive_name))
    }

    /// Compress everything under `source_directory` into
    /// `{output_dir}/{archive_name}.zip`. The archive appears atomically;
    /// on failure no archive is left behind and the source is untouched.
    pub fn package(&self, source_directory: &Path, archive_name: &str) -> Result<Archive> {
        if !source_directory.is_dir() {
            return Err(Error::PackageError(format!(
                "{} is not a directory",
                source_directory.display()
            )));
        }
        fs::create_dir_all(&self.output_dir)?;

        let archive_path = self.archive_path(archive_name);
        let tmp_path = self.output_dir.join(format!(".{}.zip.part", archive_name));

        let written = write_zip(source_directory, &tmp_path).and_then(|count| {
            fs::rename(&tmp_path, &archive_path)?;
            Ok(count)
        });
        let count = match written {
            Ok(count) => count,
            Err(Error::PackageError(msg)) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(Error::PackageError(msg));
            }
            Err(other) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(Error::PackageError(other.to_string()));
            }
        };

        info!("PACKAGED {} files into {}", count, archive_path.display());
        Ok(Archive {
            source_directory: source_directory.to_path_buf(),
            archive_path,
        })
    }

    /// `package` on tokio's blocking pool.
    pub async fn package_async(&self, source_directory: PathBuf, archive_name: String) -> Result<Archive> {
        let packager = self.clone();
        tokio::task::spawn_blocking(move || packager.package(&source_directory, &archive_name))
            .await
            .map_err(|e| Error::PackageError(format!("Packaging task panicked: {}", e)))?
    }
}

fn write_zip(source: &Path, target: &Path) -> Result<usize> {
    let file = File::create(target)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)?.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            let name = entry_name(source, &path)?;
            if entry.file_type()?.is_dir() {
                zip.add_directory(format!("{}/", name), options)?;
                pending.push(path);
            } else {
                zip.start_file(name, options)?;
                let mut input = File::open(&path)?;
                io::copy(&mut input, &mut zip)?;
                count += 1;
            }
        }
    }

    zip.finish()?;
    Ok(count)
}

/// Archive entry name: path relative to the source, `/`-separated.
fn entry_name(source: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(source)
        .map_err(|e| Error::PackageError(e.to_string()))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_use_forward_slashes() {
        let source = Path::new("/tmp/batch");
        let name = entry_name(source, &source.join("chapter").join("Intro.pdf")).unwrap();
        assert_eq!(name, "chapter/Intro.pdf");
    }

    #[test]
    fn archive_path_uses_zip_suffix() {
        let packager = Packager::new("public/ZIP");
        let archive = Archive {
            source_directory: PathBuf::from("PDF/libretexts/Book"),
            archive_path: packager.archive_path("Book"),
        };
        assert_eq!(archive.archive_path, PathBuf::from("public/ZIP/Book.zip"));
        assert_eq!(archive.file_name(), "Book.zip");
    }

    #[test]
    fn missing_source_is_a_package_error() {
        let out = tempfile::tempdir().unwrap();
        let packager = Packager::new(out.path());
        let err = packager.package(&out.path().join("nope"), "Book").unwrap_err();
        assert!(matches!(err, Error::PackageError(_)));
        assert!(!packager.archive_path("Book").exists());
    }
}
