//! Byte sources for tilesets, templates and maps.
//!
//! Every load entry point accepts a [`Source`]. Whatever its shape, a source is
//! turned into one [`SourceStream`] and read in a single pass, so the parsing
//! code never cares where the bytes came from.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use bevy::log::debug;

use crate::config::LoaderConfig;
use crate::error::{LoadError, LoadResult};
use crate::key::ResourceKey;

/// Pull callback: fill the buffer and return how many bytes were written.
///
/// `Ok(0)` ends the stream. Returning early, or an error, is how a caller
/// cancels a load that would otherwise block.
pub type PullFn<'a> = Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + 'a>;

/// Where the bytes of a resource come from.
pub enum Source<'a> {
    /// A file on disk, resolved against [`LoaderConfig::base_dir`] when relative.
    Path(PathBuf),
    /// An in-memory buffer.
    Buffer(Cow<'a, [u8]>),
    /// An open handle. It is borrowed: the load call never closes it.
    Handle(&'a mut dyn Read),
    /// A caller-supplied pull callback; its context is whatever it captures.
    Callback(PullFn<'a>),
}

impl<'a> Source<'a> {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn buffer(bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Self::Buffer(bytes.into())
    }

    pub fn handle(handle: &'a mut dyn Read) -> Self {
        Self::Handle(handle)
    }

    pub fn callback(pull: impl FnMut(&mut [u8]) -> io::Result<usize> + 'a) -> Self {
        Self::Callback(Box::new(pull))
    }

    /// The filesystem path of a [`Source::Path`].
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Buffer(_) | Self::Handle(_) | Self::Callback(_) => None,
        }
    }

    /// Open the source as a reader.
    pub fn into_stream(self, config: &LoaderConfig) -> io::Result<SourceStream<'a>> {
        Ok(match self {
            Self::Path(path) => SourceStream::File(BufReader::new(File::open(config.resolve(&path))?)),
            Self::Buffer(bytes) => SourceStream::Buffer(Cursor::new(bytes)),
            Self::Handle(handle) => SourceStream::Handle(handle),
            Self::Callback(pull) => SourceStream::Callback(pull),
        })
    }

    /// Drain the source, enforcing [`LoaderConfig::max_source_len`].
    pub(crate) fn read_all(self, key: &ResourceKey, config: &LoaderConfig) -> LoadResult<Vec<u8>> {
        let unavailable = |source: io::Error| LoadError::SourceUnavailable {
            key: key.clone(),
            source,
        };

        let stream = self.into_stream(config).map_err(unavailable)?;
        let mut bytes = Vec::new();
        match config.max_source_len {
            Some(limit) => {
                // One byte past the limit is enough to tell an exact fit from an overflow.
                stream
                    .take(limit.saturating_add(1))
                    .read_to_end(&mut bytes)
                    .map_err(unavailable)?;
                if bytes.len() as u64 > limit {
                    return Err(LoadError::SourceTooLarge {
                        key: key.clone(),
                        limit,
                    });
                }
            }
            None => {
                let mut stream = stream;
                stream.read_to_end(&mut bytes).map_err(unavailable)?;
            }
        }

        if bytes.is_empty() {
            return Err(LoadError::EmptySource(key.clone()));
        }

        debug!("Read {} bytes for `{}`", bytes.len(), key);
        Ok(bytes)
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Handle(_) => f.write_str("Handle(..)"),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self::Buffer(Cow::Borrowed(value))
    }
}

impl From<Vec<u8>> for Source<'_> {
    fn from(value: Vec<u8>) -> Self {
        Self::Buffer(Cow::Owned(value))
    }
}

/// A string is taken as a file path, never as document contents.
impl From<&str> for Source<'_> {
    fn from(value: &str) -> Self {
        Self::Path(PathBuf::from(value))
    }
}

impl From<String> for Source<'_> {
    fn from(value: String) -> Self {
        Self::Path(PathBuf::from(value))
    }
}

impl From<PathBuf> for Source<'_> {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for Source<'_> {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

/// The single reader every [`Source`] shape is adapted into.
pub enum SourceStream<'a> {
    File(BufReader<File>),
    /// A file read on the parser's behalf, capped at [`LoaderConfig::max_source_len`].
    BoundedFile(BoundedRead<BufReader<File>>),
    Buffer(Cursor<Cow<'a, [u8]>>),
    Handle(&'a mut dyn Read),
    Callback(PullFn<'a>),
}

impl Read for SourceStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(file) => file.read(buf),
            Self::BoundedFile(file) => file.read(buf),
            Self::Buffer(cursor) => cursor.read(buf),
            Self::Handle(handle) => handle.read(buf),
            Self::Callback(pull) => {
                let read = pull(buf)?;
                if read > buf.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "read callback reported {} bytes for a {} byte buffer",
                            read,
                            buf.len()
                        ),
                    ));
                }
                Ok(read)
            }
        }
    }
}

/// Reader that fails once more than `limit` bytes came through.
///
/// Unlike [`Read::take`], hitting the limit is an error rather than an early
/// end of stream, so a truncated document is never handed to the parser.
pub struct BoundedRead<R> {
    inner: R,
    remaining: u64,
    limit: u64,
}

impl<R> BoundedRead<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
            limit,
        }
    }
}

impl<R: Read> Read for BoundedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)? as u64;
        if read > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("source exceeds the limit of {} bytes", self.limit),
            ));
        }
        self.remaining -= read;
        Ok(read as usize)
    }
}

/// [`tiled::ResourceReader`] used for every parse.
///
/// Paths registered with [`SourceResolver::serve`] are answered from memory,
/// once each. Any other path the parser asks for, such as a tileset referenced
/// by a map, is opened from the filesystem.
pub(crate) struct SourceResolver<'c> {
    config: &'c LoaderConfig,
    served: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl<'c> SourceResolver<'c> {
    pub fn new(config: &'c LoaderConfig) -> Self {
        Self {
            config,
            served: Vec::new(),
        }
    }

    pub fn serve(mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        self.served.push((path.into(), Some(bytes)));
        self
    }

    fn take_served(&mut self, path: &Path) -> Option<Vec<u8>> {
        self.served
            .iter_mut()
            .find(|(served, bytes)| served.as_path() == path && bytes.is_some())
            .and_then(|(_, bytes)| bytes.take())
    }
}

impl tiled::ResourceReader for SourceResolver<'_> {
    type Resource = SourceStream<'static>;
    type Error = io::Error;

    fn read_from(&mut self, path: &Path) -> Result<Self::Resource, Self::Error> {
        if let Some(bytes) = self.take_served(path) {
            return Ok(SourceStream::Buffer(Cursor::new(Cow::Owned(bytes))));
        }

        let resolved = self.config.resolve(path);
        debug!("Reading `{}` from the filesystem", resolved.display());
        let file = File::open(&resolved)?;
        let Some(limit) = self.config.max_source_len else {
            return Ok(SourceStream::File(BufReader::new(file)));
        };

        // Oversized files are refused before parsing; the bounded reader
        // covers files that grow while being read.
        let len = file.metadata()?.len();
        if len > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "`{}` is {} bytes, over the limit of {} bytes",
                    resolved.display(),
                    len,
                    limit
                ),
            ));
        }
        Ok(SourceStream::BoundedFile(BoundedRead::new(BufReader::new(file), limit)))
    }
}
