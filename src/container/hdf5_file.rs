// --- File: src/container/hdf5_file.rs ---

//! HDF5 backend, reading files written by Keras through h5py.
//!
//! Files are opened read-only. Text attributes may be stored as fixed-length
//! byte strings (older h5py) or variable-length strings (newer h5py); both
//! end up as [`RawText`] and are decoded by the converter. All reads go
//! through the `hdf5` crate's typed readers, which hold its library lock.

use super::{
    ArrayValues, AttrValue, Container, ContainerError, ContainerResult, DType, Dataset, Group,
    NodeKind, RawText, Tensor,
};
use hdf5::types::{
    FixedAscii, FixedUnicode, FloatSize, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode,
};
use hdf5::LocationType;
use std::path::Path;

impl From<hdf5::Error> for ContainerError {
    fn from(err: hdf5::Error) -> Self {
        ContainerError::Backend(err.to_string())
    }
}

/// An HDF5 file opened read-only.
#[derive(Debug, Clone)]
pub struct Hdf5File {
    file: hdf5::File,
}

impl Hdf5File {
    /// Adopts a file handle that is already open.
    pub fn from_handle(file: hdf5::File) -> Self {
        Self { file }
    }
}

impl Container for Hdf5File {
    type Root<'a> = hdf5::Group;

    fn open(path: &Path) -> ContainerResult<Self> {
        Ok(Self { file: hdf5::File::open(path)? })
    }

    fn root(&self) -> ContainerResult<Self::Root<'_>> {
        Ok(self.file.group("/")?)
    }
}

impl Dataset for hdf5::Dataset {
    fn read(&self) -> ContainerResult<Tensor> {
        let descriptor = self.dtype()?.to_descriptor()?;
        let (dtype, values) = match descriptor {
            TypeDescriptor::Float(FloatSize::U4) => (
                DType::Float32,
                ArrayValues::Float(self.read_dyn::<f32>()?.mapv(f64::from)),
            ),
            TypeDescriptor::Float(FloatSize::U8) => {
                (DType::Float64, ArrayValues::Float(self.read_dyn::<f64>()?))
            }
            TypeDescriptor::Integer(IntSize::U1) => (
                DType::Int8,
                ArrayValues::Int(self.read_dyn::<i8>()?.mapv(i64::from)),
            ),
            TypeDescriptor::Integer(IntSize::U2) => (
                DType::Int16,
                ArrayValues::Int(self.read_dyn::<i16>()?.mapv(i64::from)),
            ),
            TypeDescriptor::Integer(IntSize::U4) => (
                DType::Int32,
                ArrayValues::Int(self.read_dyn::<i32>()?.mapv(i64::from)),
            ),
            TypeDescriptor::Integer(IntSize::U8) => {
                (DType::Int64, ArrayValues::Int(self.read_dyn::<i64>()?))
            }
            TypeDescriptor::Unsigned(IntSize::U1) => (
                DType::UInt8,
                ArrayValues::UInt(self.read_dyn::<u8>()?.mapv(u64::from)),
            ),
            TypeDescriptor::Unsigned(IntSize::U2) => (
                DType::UInt16,
                ArrayValues::UInt(self.read_dyn::<u16>()?.mapv(u64::from)),
            ),
            TypeDescriptor::Unsigned(IntSize::U4) => (
                DType::UInt32,
                ArrayValues::UInt(self.read_dyn::<u32>()?.mapv(u64::from)),
            ),
            TypeDescriptor::Unsigned(IntSize::U8) => {
                (DType::UInt64, ArrayValues::UInt(self.read_dyn::<u64>()?))
            }
            other => {
                return Err(ContainerError::UnsupportedDtype(format!(
                    "{:?} in dataset {}",
                    other,
                    hdf5::Location::name(self)
                )))
            }
        };
        Tensor::new(dtype, values)
    }
}

impl Group for hdf5::Group {
    type Dataset = hdf5::Dataset;

    fn name(&self) -> String {
        hdf5::Location::name(self)
    }

    fn attr(&self, name: &str) -> ContainerResult<Option<AttrValue>> {
        if !hdf5::Location::attr_names(self)?.iter().any(|n| n == name) {
            return Ok(None);
        }
        let attr = hdf5::Location::attr(self, name)?;
        read_attr(&attr).map(Some)
    }

    fn member_names(&self) -> ContainerResult<Vec<String>> {
        Ok(hdf5::Group::member_names(self)?)
    }

    fn member(&self, name: &str) -> ContainerResult<Option<NodeKind<Self, Self::Dataset>>> {
        if !hdf5::Group::link_exists(self, name) {
            return Ok(None);
        }
        let kind = match hdf5::Location::loc_type_by_name(self, name) {
            Ok(LocationType::Group) => NodeKind::Group(hdf5::Group::group(self, name)?),
            Ok(LocationType::Dataset) => NodeKind::Leaf(hdf5::Group::dataset(self, name)?),
            Ok(other) => NodeKind::Other(format!("{:?}", other)),
            // Dangling soft or external links cannot be resolved.
            Err(err) => NodeKind::Other(format!("unresolvable link ({})", err)),
        };
        Ok(Some(kind))
    }
}

/// Reads fixed-length strings into the smallest buffer type that holds `size` bytes.
///
/// The library pads each value out to the buffer width, so only the capacity
/// has to be chosen at compile time.
macro_rules! read_fixed_strings {
    ($read:ident, $attr:expr, $size:expr) => {
        match $size {
            n if n <= 64 => $read::<64>($attr)?,
            n if n <= 256 => $read::<256>($attr)?,
            n if n <= 1024 => $read::<1024>($attr)?,
            n if n <= 4096 => $read::<4096>($attr)?,
            n if n <= 16384 => $read::<16384>($attr)?,
            n if n <= 65536 => $read::<65536>($attr)?,
            n if n <= 262144 => $read::<262144>($attr)?,
            n if n <= MAX_FIXED_STRING => $read::<MAX_FIXED_STRING>($attr)?,
            n => {
                return Err(ContainerError::UnsupportedDtype(format!(
                    "fixed-length string of {} bytes in attribute {}",
                    n,
                    hdf5::Location::name($attr)
                )))
            }
        }
    };
}

fn read_attr(attr: &hdf5::Attribute) -> ContainerResult<AttrValue> {
    // h5py stores an empty name list as a zero-length float array.
    if attr.ndim() > 0 && attr.size() == 0 {
        return Ok(AttrValue::List(Vec::new()));
    }
    let texts = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => attr
            .read_raw::<VarLenUnicode>()?
            .iter()
            .map(|s| RawText::Utf8(s.as_str().to_string()))
            .collect::<Vec<_>>(),
        TypeDescriptor::VarLenAscii => attr
            .read_raw::<VarLenAscii>()?
            .iter()
            .map(|s| RawText::Utf8(s.as_str().to_string()))
            .collect(),
        TypeDescriptor::FixedAscii(size) => read_fixed_strings!(fixed_ascii, attr, size),
        TypeDescriptor::FixedUnicode(size) => read_fixed_strings!(fixed_unicode, attr, size),
        other => return Ok(AttrValue::NonText(format!("{:?}", other))),
    };

    if attr.ndim() == 0 {
        let first = texts.into_iter().next().unwrap_or(RawText::Utf8(String::new()));
        Ok(AttrValue::Scalar(first))
    } else {
        Ok(AttrValue::List(texts))
    }
}

/// Largest fixed-length string attribute accepted; serialized topologies can be large.
const MAX_FIXED_STRING: usize = 1024 * 1024;

fn fixed_ascii<const N: usize>(attr: &hdf5::Attribute) -> ContainerResult<Vec<RawText>> {
    Ok(attr
        .read_raw::<FixedAscii<N>>()?
        .iter()
        .map(|s| RawText::Bytes(s.as_bytes().to_vec()))
        .collect())
}

fn fixed_unicode<const N: usize>(attr: &hdf5::Attribute) -> ContainerResult<Vec<RawText>> {
    Ok(attr
        .read_raw::<FixedUnicode<N>>()?
        .iter()
        .map(|s| RawText::Bytes(s.as_bytes().to_vec()))
        .collect())
}
