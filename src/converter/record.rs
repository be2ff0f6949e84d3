// --- File: src/converter/record.rs ---

//! Output side of the conversion: per-dataset records and the two output trees.

use super::rounding::round_half_even;
use crate::container::{ArrayValues, Tensor};
use ndarray::{ArrayViewD, Axis};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Number, Value as Json};
use std::io::Write;

/// One converted dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRecord {
    pub name: String,
    pub dtype: String,
    pub shape: Vec<usize>,
    /// Nested arrays of numbers, or a bare number for zero-dimensional datasets.
    pub value: Json,
}

impl ConversionRecord {
    /// Builds the record for `tensor`, rounding floats to `decimal_places`.
    pub fn from_tensor(name: String, tensor: &Tensor, decimal_places: u32) -> Self {
        let value = match tensor.values() {
            ArrayValues::Float(arr) => nested_json(arr.view(), &|x: &f64| {
                Number::from_f64(round_half_even(*x, decimal_places))
                    .map_or(Json::Null, Json::Number)
            }),
            ArrayValues::Int(arr) => nested_json(arr.view(), &|x: &i64| Json::from(*x)),
            ArrayValues::UInt(arr) => nested_json(arr.view(), &|x: &u64| Json::from(*x)),
        };
        Self {
            name,
            dtype: tensor.dtype().as_str().to_string(),
            shape: tensor.shape().to_vec(),
            value,
        }
    }
}

/// Turns an n-dimensional array into nested JSON arrays, outermost axis first.
fn nested_json<T>(arr: ArrayViewD<'_, T>, leaf: &dyn Fn(&T) -> Json) -> Json {
    if arr.ndim() == 0 {
        return arr.iter().next().map_or(Json::Null, leaf);
    }
    Json::Array(
        arr.axis_iter(Axis(0))
            .map(|sub| nested_json(sub, leaf))
            .collect(),
    )
}

/// Records of one layer or optimizer state. `None` means "no weights".
pub type LayerRecords = Option<Vec<ConversionRecord>>;

/// Name → records mapping that keeps insertion order.
///
/// Serialized as a JSON object whose keys appear in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMap {
    entries: Vec<(String, LayerRecords)>,
}

impl RecordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry. A replaced entry keeps its original position.
    pub fn insert(&mut self, name: String, records: LayerRecords) {
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = records,
            None => self.entries.push((name, records)),
        }
    }

    /// Returns the entry for `name`; the outer `Option` tells whether it exists at all.
    pub fn get(&self, name: &str) -> Option<&LayerRecords> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, records)| records)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerRecords)> {
        self.entries.iter().map(|(key, records)| (key.as_str(), records))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RecordMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, records) in &self.entries {
            map.serialize_entry(key, records)?;
        }
        map.end()
    }
}

/// Output of the weights-only conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightsOutput {
    pub format_version: String,
    pub backend: String,
    pub weights: RecordMap,
}

/// Output of the merged (topology + weights + training state) conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedOutput {
    pub format_version: String,
    pub backend: String,
    /// Serialized model topology, passed through untouched.
    pub model_config: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_config: Option<String>,
    pub model_weights: RecordMap,
    pub optimizer_weights: RecordMap,
}

macro_rules! impl_json_output {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Serializes the tree to a JSON string.
            pub fn to_json_string(&self) -> serde_json::Result<String> {
                serde_json::to_string(self)
            }

            /// Serializes the tree as JSON into `writer`.
            pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
                serde_json::to_writer(writer, self)
            }
        }
    )*};
}

impl_json_output!(WeightsOutput, MergedOutput);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_nests_values_by_shape() {
        let tensor = Tensor::from_f32(&[2, 3], vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        let record = ConversionRecord::from_tensor("kernel".to_string(), &tensor, 6);

        assert_eq!(record.dtype, "float32");
        assert_eq!(record.shape, vec![2, 3]);
        assert_eq!(record.value, json!([[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]));
    }

    #[test]
    fn test_zero_places_gives_integer_valued_floats() {
        let tensor = Tensor::from_f64(&[3], vec![1.4, 2.5, -0.6]).unwrap();
        let record = ConversionRecord::from_tensor("w".to_string(), &tensor, 0);
        assert_eq!(record.value, json!([1.0, 2.0, -1.0]));
    }

    #[test]
    fn test_integers_are_not_rounded() {
        let tensor = Tensor::from_i64(&[2], vec![123456789, -7]).unwrap();
        let record = ConversionRecord::from_tensor("ids".to_string(), &tensor, 0);
        assert_eq!(record.dtype, "int64");
        assert_eq!(record.value, json!([123456789, -7]));
    }

    #[test]
    fn test_scalar_and_empty_shapes() {
        let scalar = ConversionRecord::from_tensor("iterations".to_string(), &Tensor::scalar_i64(9), 6);
        assert_eq!(scalar.shape, Vec::<usize>::new());
        assert_eq!(scalar.value, json!(9));

        let empty = Tensor::from_f32(&[0, 4], vec![]).unwrap();
        let record = ConversionRecord::from_tensor("empty".to_string(), &empty, 6);
        assert_eq!(record.shape, vec![0, 4]);
        assert_eq!(record.value, json!([]));
    }

    #[test]
    fn test_non_finite_values_become_null() {
        let tensor = Tensor::from_f64(&[2], vec![f64::NAN, 1.0]).unwrap();
        let record = ConversionRecord::from_tensor("w".to_string(), &tensor, 3);
        assert_eq!(record.value, json!([null, 1.0]));
    }

    #[test]
    fn test_record_map_serializes_in_insertion_order() {
        let mut map = RecordMap::new();
        map.insert("zeta".to_string(), None);
        map.insert("alpha".to_string(), Some(vec![]));
        map.insert("zeta".to_string(), Some(vec![]));

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"zeta":[],"alpha":[]}"#);
    }

    #[test]
    fn test_missing_training_config_is_omitted() {
        let out = MergedOutput {
            format_version: "2.1.2".to_string(),
            backend: "tensorflow".to_string(),
            model_config: "{}".to_string(),
            training_config: None,
            model_weights: RecordMap::new(),
            optimizer_weights: RecordMap::new(),
        };
        let text = out.to_json_string().unwrap();
        assert!(!text.contains("training_config"));
        assert!(text.contains(r#""optimizer_weights":{}"#));
    }
}
