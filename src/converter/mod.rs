// --- File: src/converter/mod.rs ---

//! # Container Converter
//!
//! Walks a weight container and produces a JSON-ready tree.
//!
//! Two modes are offered:
//!
//! - **Weights only** ([`ContainerConverter::weights_to_json`]): what
//!   `Model.save_weights()` writes. Layers are listed in the root
//!   `layer_names` attribute, each layer group lists its datasets in
//!   `weight_names`.
//! - **Merged** ([`ContainerConverter::merged_to_json`]): what `save_model()`
//!   writes. Adds the model topology, the training config when present, and
//!   the optimizer state.
//!
//! Every conversion goes through the same phases:
//!
//! ```text
//! container -> check_version -> VersionChecked -> populated output
//! ```
//!
//! A [`VersionChecked`] value can only be obtained from a successful version
//! check, so no output is ever built for an unsupported container. Any error
//! aborts the call and nothing partial is returned.
//!
//! ## Example
//!
//! ```ignore
//! use h5weights::container::ContainerSource;
//! use h5weights::converter::ContainerConverter;
//!
//! let converter = ContainerConverter::with_decimal_places(4)?;
//! let output = converter.convert_weights(ContainerSource::<Hdf5File>::path("weights.h5"))?;
//! std::fs::write("weights.json", output.to_json_string()?)?;
//! ```

pub mod record;
pub mod rounding;

pub use record::{ConversionRecord, LayerRecords, MergedOutput, RecordMap, WeightsOutput};

use crate::container::{Container, ContainerError, ContainerSource, Dataset, Group, NodeKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of decimal places kept in emitted values.
pub const DEFAULT_DECIMAL_PLACES: i32 = 6;

/// Root attribute Keras writes its version into.
pub const DEFAULT_VERSION_ATTRIBUTE: &str = "keras_version";

/// The only supported major version.
pub const SUPPORTED_MAJOR_VERSION: &str = "2";

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid configuration: decimal_places must be non-negative, got {0}")]
    InvalidConfiguration(i32),

    #[error("Unsupported format version '{0}': expected major version 2")]
    UnsupportedVersion(String),

    #[error("Attribute '{attribute}' is missing on '{node}'")]
    MissingAttribute { node: String, attribute: String },

    #[error("Attribute '{attribute}' on '{node}' is not text")]
    AttributeType { node: String, attribute: String },

    #[error("Member '{member}' is missing from group '{group}'")]
    MissingMember { group: String, member: String },

    #[error("Member '{member}' of group '{group}' is not a dataset")]
    NotADataset { group: String, member: String },

    #[error("Unexpected entry '{member}' in optimizer state '{group}': {kind}")]
    UnknownStructuralKind {
        group: String,
        member: String,
        kind: String,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

type Result<T> = std::result::Result<T, ConvertError>;

/// Converter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Decimal places kept in floating point values. Must be non-negative.
    pub decimal_places: i32,
    /// Root attribute holding the dotted version string.
    pub version_attribute: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            decimal_places: DEFAULT_DECIMAL_PLACES,
            version_attribute: DEFAULT_VERSION_ATTRIBUTE.to_string(),
        }
    }
}

impl ConverterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decimal_places(mut self, decimal_places: i32) -> Self {
        self.decimal_places = decimal_places;
        self
    }

    pub fn with_version_attribute(mut self, name: &str) -> Self {
        self.version_attribute = name.to_string();
        self
    }
}

/// Proof that a container passed the version check, carrying the fields
/// every output starts with.
#[derive(Debug)]
pub struct VersionChecked<'g, G> {
    root: &'g G,
    format_version: String,
    backend: String,
}

impl<'g, G> VersionChecked<'g, G> {
    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

/// Converts weight containers into JSON-ready trees.
#[derive(Debug, Clone)]
pub struct ContainerConverter {
    decimal_places: u32,
    version_attribute: String,
}

impl Default for ContainerConverter {
    fn default() -> Self {
        Self {
            decimal_places: DEFAULT_DECIMAL_PLACES as u32,
            version_attribute: DEFAULT_VERSION_ATTRIBUTE.to_string(),
        }
    }
}

impl ContainerConverter {
    /// Creates a converter, rejecting a negative number of decimal places.
    pub fn new(config: ConverterConfig) -> Result<Self> {
        let decimal_places = u32::try_from(config.decimal_places)
            .map_err(|_| ConvertError::InvalidConfiguration(config.decimal_places))?;
        Ok(Self {
            decimal_places,
            version_attribute: config.version_attribute,
        })
    }

    /// Shortcut for a default config with `decimal_places` changed.
    pub fn with_decimal_places(decimal_places: i32) -> Result<Self> {
        Self::new(ConverterConfig::new().with_decimal_places(decimal_places))
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    /// Fails unless the container's version attribute has major component `"2"`.
    pub fn check_version<G: Group>(&self, root: &G) -> Result<()> {
        let version = required_text(root, &self.version_attribute)?;
        ensure_supported(&version)
    }

    /// Runs the version check and reads the fields shared by both output formats.
    pub fn verify<'g, G: Group>(&self, root: &'g G) -> Result<VersionChecked<'g, G>> {
        let format_version = required_text(root, &self.version_attribute)?;
        ensure_supported(&format_version)?;
        let backend = required_text(root, "backend")?;
        Ok(VersionChecked {
            root,
            format_version,
            backend,
        })
    }

    /// Converts the datasets named in `names`, in that order.
    ///
    /// Returns `Ok(None)` when `names` is empty: the layer simply has no weights.
    pub fn group_to_records<G: Group>(
        &self,
        group: &G,
        names: &[String],
    ) -> Result<LayerRecords> {
        if names.is_empty() {
            return Ok(None);
        }
        names
            .iter()
            .map(|name| -> Result<ConversionRecord> {
                match group.member(name)? {
                    Some(NodeKind::Leaf(dataset)) => self.dataset_record(name.clone(), &dataset),
                    Some(_) => Err(ConvertError::NotADataset {
                        group: group.name(),
                        member: name.clone(),
                    }),
                    None => Err(ConvertError::MissingMember {
                        group: group.name(),
                        member: name.clone(),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Converts the output of `Model.save_weights()`.
    pub fn weights_to_json<G: Group>(&self, root: &G) -> Result<WeightsOutput> {
        let checked = self.verify(root)?;
        log::info!(
            "Converting weights (format {}, backend {})",
            checked.format_version,
            checked.backend
        );

        let layer_names = required_text_list(checked.root, "layer_names")?;
        let mut weights = RecordMap::new();
        for layer_name in layer_names {
            let layer = required_group(checked.root, &layer_name)?;
            let records = self.layer_records(&layer)?;
            log::debug!("Layer '{}': {} weights", layer_name, count(&records));
            weights.insert(layer_name, records);
        }
        log::info!("Converted {} layers", weights.len());

        Ok(WeightsOutput {
            format_version: checked.format_version,
            backend: checked.backend,
            weights,
        })
    }

    /// Converts the output of `save_model()`: topology, weights and training state.
    pub fn merged_to_json<G: Group>(&self, root: &G) -> Result<MergedOutput> {
        let checked = self.verify(root)?;
        log::info!(
            "Converting saved model (format {}, backend {})",
            checked.format_version,
            checked.backend
        );

        let model_config = required_text(checked.root, "model_config")?;
        let training_config = optional_text(checked.root, "training_config")?;

        let model_weights_group = required_group(checked.root, "model_weights")?;
        let mut model_weights = RecordMap::new();
        for layer_name in model_weights_group.member_names()? {
            let layer = required_group(&model_weights_group, &layer_name)?;
            let records = self.layer_records(&layer)?;
            log::debug!("Layer '{}': {} weights", layer_name, count(&records));
            model_weights.insert(layer_name, records);
        }

        let mut optimizer_weights = RecordMap::new();
        if let Some(optimizer_group) = checked.root.group("optimizer_weights")? {
            for state_name in optimizer_group.member_names()? {
                let state = required_group(&optimizer_group, &state_name)?;
                if let Some(records) = self.optimizer_state_records(&state)? {
                    optimizer_weights.insert(state_name, records);
                }
            }
        }
        log::info!(
            "Converted {} layers and {} optimizer states",
            model_weights.len(),
            optimizer_weights.len()
        );

        Ok(MergedOutput {
            format_version: checked.format_version,
            backend: checked.backend,
            model_config,
            training_config,
            model_weights,
            optimizer_weights,
        })
    }

    /// Opens (or adopts) a container and runs the weights-only conversion.
    pub fn convert_weights<C: Container>(&self, source: ContainerSource<C>) -> Result<WeightsOutput> {
        let container = source.open_or_adopt()?;
        let root = container.root()?;
        self.weights_to_json(&root)
    }

    /// Opens (or adopts) a container and runs the merged conversion.
    pub fn convert_merged<C: Container>(&self, source: ContainerSource<C>) -> Result<MergedOutput> {
        let container = source.open_or_adopt()?;
        let root = container.root()?;
        self.merged_to_json(&root)
    }

    fn layer_records<G: Group>(&self, layer: &G) -> Result<LayerRecords> {
        let weight_names = required_text_list(layer, "weight_names")?;
        self.group_to_records(layer, &weight_names)
    }

    /// Collects the records of one optimizer state group.
    ///
    /// Records of all children are appended in child order, so slot
    /// variables such as `m` and `v` all survive. Returns `None` for a group
    /// without usable children.
    fn optimizer_state_records<G: Group>(&self, state: &G) -> Result<Option<LayerRecords>> {
        let mut records: LayerRecords = None;
        let mut touched = false;

        for member in state.member_names()? {
            match state.member(&member)? {
                Some(NodeKind::Leaf(dataset)) => {
                    touched = true;
                    let record = self.dataset_record(member, &dataset)?;
                    records.get_or_insert_with(Vec::new).push(record);
                }
                Some(NodeKind::Group(sub_group)) => {
                    touched = true;
                    let names = sub_group.member_names()?;
                    if let Some(sub_records) = self.group_to_records(&sub_group, &names)? {
                        records.get_or_insert_with(Vec::new).extend(sub_records);
                    }
                }
                Some(NodeKind::Other(kind)) => {
                    let anomaly = ConvertError::UnknownStructuralKind {
                        group: state.name(),
                        member,
                        kind,
                    };
                    log::warn!("{}; skipping", anomaly);
                }
                None => {
                    log::warn!("Member '{}' of '{}' vanished; skipping", member, state.name());
                }
            }
        }

        Ok(touched.then_some(records))
    }

    fn dataset_record<D: Dataset>(&self, name: String, dataset: &D) -> Result<ConversionRecord> {
        let tensor = dataset.read()?;
        Ok(ConversionRecord::from_tensor(name, &tensor, self.decimal_places))
    }
}

fn ensure_supported(version: &str) -> Result<()> {
    let major = version.split('.').next().unwrap_or_default();
    if major == SUPPORTED_MAJOR_VERSION {
        Ok(())
    } else {
        Err(ConvertError::UnsupportedVersion(version.to_string()))
    }
}

fn optional_text<G: Group>(node: &G, attribute: &str) -> Result<Option<String>> {
    match node.attr(attribute)? {
        None => Ok(None),
        Some(value) => value
            .to_text()?
            .map(Some)
            .ok_or_else(|| ConvertError::AttributeType {
                node: node.name(),
                attribute: attribute.to_string(),
            }),
    }
}

fn required_text<G: Group>(node: &G, attribute: &str) -> Result<String> {
    optional_text(node, attribute)?.ok_or_else(|| missing_attribute(node, attribute))
}

fn required_text_list<G: Group>(node: &G, attribute: &str) -> Result<Vec<String>> {
    let value = node
        .attr(attribute)?
        .ok_or_else(|| missing_attribute(node, attribute))?;
    value
        .to_text_list()?
        .ok_or_else(|| ConvertError::AttributeType {
            node: node.name(),
            attribute: attribute.to_string(),
        })
}

fn required_group<G: Group>(parent: &G, name: &str) -> Result<G> {
    parent.group(name)?.ok_or_else(|| ConvertError::MissingMember {
        group: parent.name(),
        member: name.to_string(),
    })
}

fn missing_attribute<G: Group>(node: &G, attribute: &str) -> ConvertError {
    ConvertError::MissingAttribute {
        node: node.name(),
        attribute: attribute.to_string(),
    }
}

fn count(records: &LayerRecords) -> usize {
    records.as_ref().map_or(0, Vec::len)
}
