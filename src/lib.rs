// --- File: src/lib.rs ---

//! # h5weights: weight containers to JSON
//!
//! **h5weights** converts Keras-style weight containers (a tree of groups and
//! numeric datasets, normally stored in HDF5) into JSON trees that
//! JavaScript runtimes can load directly.
//!
//! ## Usage Example
//!
//! ```no_run
//! use h5weights::container::{ContainerSource, MemoryGroup};
//! use h5weights::converter::ContainerConverter;
//!
//! // 1. Configure the converter (6 decimal places by default)
//! let converter = ContainerConverter::with_decimal_places(6).unwrap();
//!
//! // 2. Convert a container snapshot written earlier
//! let output = converter
//!     .convert_weights(ContainerSource::<MemoryGroup>::path("weights.json"))
//!     .unwrap();
//!
//! // 3. Serialize for the JS side
//! println!("{}", output.to_json_string().unwrap());
//! ```
//!
//! With the `hdf5` feature, `h5weights::container::Hdf5File` reads `.h5`
//! files produced by `Model.save_weights()` and `save_model()`.

pub mod container;
pub mod converter;

pub use container::{Container, ContainerSource, Group, MemoryGroup, Tensor};
pub use converter::{ContainerConverter, ConvertError, ConverterConfig, MergedOutput, WeightsOutput};
