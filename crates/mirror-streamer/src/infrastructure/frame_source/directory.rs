//! Replays encoded images from a directory, in file-name order, forever.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::application::stream_window::{FrameSource, SourceError};

/// File extensions treated as frames (compared case-insensitively).
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Cycles through the image files in one directory.
///
/// The file list is taken once in [`DirectoryFrameSource::open`]; files are
/// re-read on every frame so edits show up while streaming.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectoryFrameSource {
    /// Lists the image files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the directory cannot be read and
    /// [`SourceError::Empty`] if it holds no images.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir).map_err(|source| SourceError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Empty(dir));
        }
        debug!("{} frames found in {}", files.len(), dir.display());
        Ok(Self {
            dir,
            files,
            next: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        std::fs::read(path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })
    }
}
