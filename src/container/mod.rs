// --- File: src/container/mod.rs ---

//! # Container Access
//!
//! Read-only view over a hierarchical weight container: a tree of named
//! groups and numeric datasets, each carrying attributes.
//!
//! The converter only talks to the traits defined here, so any storage that
//! can answer "which attributes, which members, read this dataset" can be
//! converted.
//!
//! ## Backends
//!
//! - [`MemoryGroup`]: in-memory tree, serializable as a JSON snapshot.
//! - `Hdf5File`: HDF5 files written by Keras (feature `hdf5`).
//!
//! ## Example
//!
//! ```ignore
//! use h5weights::container::{Container, ContainerSource, MemoryGroup};
//!
//! let container = ContainerSource::<MemoryGroup>::path("model.json").open_or_adopt()?;
//! let root = container.root()?;
//! ```

pub mod memory;
pub mod tensor;

#[cfg(feature = "hdf5")]
pub mod hdf5_file;

pub use memory::{MemoryGroup, MemoryNode};
pub use tensor::{ArrayValues, DType, Tensor};

#[cfg(feature = "hdf5")]
pub use hdf5_file::Hdf5File;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading from a container backend.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Name is not valid UTF-8: {0}")]
    InvalidName(#[from] std::string::FromUtf8Error),

    #[error("Unsupported data type: {0}")]
    UnsupportedDtype(String),

    #[error("Shape {shape:?} does not match {len} elements")]
    ShapeMismatch { shape: Vec<usize>, len: usize },

    #[error("Container backend error: {0}")]
    Backend(String),
}

pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// A piece of text as it is stored in the container.
///
/// Producers write names either as UTF-8 strings or as raw byte strings;
/// both are turned into text by [`RawText::to_text`] before they reach any output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawText {
    Utf8(String),
    Bytes(Vec<u8>),
}

impl RawText {
    /// Decodes the stored value into text.
    pub fn to_text(&self) -> ContainerResult<String> {
        match self {
            RawText::Utf8(s) => Ok(s.clone()),
            RawText::Bytes(bytes) => {
                // Fixed-length strings are padded with NULs.
                let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                Ok(String::from_utf8(bytes[..end].to_vec())?)
            }
        }
    }
}

impl From<&str> for RawText {
    fn from(s: &str) -> Self {
        RawText::Utf8(s.to_string())
    }
}

impl From<String> for RawText {
    fn from(s: String) -> Self {
        RawText::Utf8(s)
    }
}

impl From<Vec<u8>> for RawText {
    fn from(bytes: Vec<u8>) -> Self {
        RawText::Bytes(bytes)
    }
}

/// Value of an attribute attached to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// A single string.
    Scalar(RawText),
    /// An ordered sequence of strings, e.g. `layer_names`.
    List(Vec<RawText>),
    /// Anything that is not text; only its description is kept.
    NonText(String),
}

impl AttrValue {
    /// Decodes a scalar attribute into text.
    ///
    /// Returns `None` when the attribute is not a single string.
    pub fn to_text(&self) -> ContainerResult<Option<String>> {
        match self {
            AttrValue::Scalar(raw) => raw.to_text().map(Some),
            AttrValue::List(items) if items.len() == 1 => items[0].to_text().map(Some),
            _ => Ok(None),
        }
    }

    /// Decodes a list attribute into ordered text values.
    ///
    /// A scalar is treated as a one-element list. Returns `None` for non-text values.
    pub fn to_text_list(&self) -> ContainerResult<Option<Vec<String>>> {
        match self {
            AttrValue::Scalar(raw) => Ok(Some(vec![raw.to_text()?])),
            AttrValue::List(items) => items
                .iter()
                .map(RawText::to_text)
                .collect::<ContainerResult<Vec<_>>>()
                .map(Some),
            AttrValue::NonText(_) => Ok(None),
        }
    }
}

/// Structural kind of a group member, resolved once when the member is looked up.
#[derive(Debug)]
pub enum NodeKind<G, D> {
    Group(G),
    Leaf(D),
    /// Neither group nor dataset (named datatype, dangling link, ...).
    Other(String),
}

/// Read access to a dataset.
pub trait Dataset {
    /// Reads the whole dataset into memory.
    fn read(&self) -> ContainerResult<Tensor>;
}

/// Read access to a group.
pub trait Group: Sized {
    type Dataset: Dataset;

    /// Name of the group, used in diagnostics.
    fn name(&self) -> String;

    /// Looks up an attribute by name. `Ok(None)` means it is absent.
    fn attr(&self, name: &str) -> ContainerResult<Option<AttrValue>>;

    /// Member names in the container's natural order.
    fn member_names(&self) -> ContainerResult<Vec<String>>;

    /// Looks up a member by name. `Ok(None)` means it is absent.
    fn member(&self, name: &str) -> ContainerResult<Option<NodeKind<Self, Self::Dataset>>>;

    /// Looks up a member that must be a group.
    fn group(&self, name: &str) -> ContainerResult<Option<Self>> {
        Ok(match self.member(name)? {
            Some(NodeKind::Group(group)) => Some(group),
            _ => None,
        })
    }
}

/// An openable container whose root is a [`Group`].
pub trait Container: Sized {
    type Root<'a>: Group
    where
        Self: 'a;

    /// Opens the container at `path` read-only.
    fn open(path: &Path) -> ContainerResult<Self>;

    /// Root group of the container.
    fn root(&self) -> ContainerResult<Self::Root<'_>>;
}

/// Either an already opened container or a path to open.
#[derive(Debug)]
pub enum ContainerSource<C> {
    Open(C),
    Path(PathBuf),
}

impl<C: Container> ContainerSource<C> {
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        ContainerSource::Path(path.as_ref().to_path_buf())
    }

    /// Returns the adopted handle, or opens the path read-only.
    ///
    /// The caller owns the returned handle; dropping it releases the file.
    pub fn open_or_adopt(self) -> ContainerResult<C> {
        match self {
            ContainerSource::Open(container) => Ok(container),
            ContainerSource::Path(path) => {
                log::info!("Opening container {}", path.display());
                C::open(&path)
            }
        }
    }
}
