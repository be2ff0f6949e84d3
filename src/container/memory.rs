// --- File: src/container/memory.rs ---

//! In-memory container backend.
//!
//! A [`MemoryGroup`] keeps attributes and members in insertion order, which
//! plays the role of the "natural order" of a file-backed container. Whole
//! trees can be written to and read back from a JSON snapshot.
//!
//! Member names containing `/` are resolved through nested groups, the same
//! way HDF5 resolves link paths relative to a group.

use super::{
    AttrValue, Container, ContainerResult, Dataset, Group, NodeKind, RawText, Tensor,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// A member of a [`MemoryGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryNode {
    Group(MemoryGroup),
    Dataset(Tensor),
    /// Stand-in for members that are neither groups nor datasets.
    Other(String),
}

/// A group held in memory. The root of a tree doubles as the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryGroup {
    pub name: String,
    attrs: Vec<(String, AttrValue)>,
    members: Vec<(String, MemoryNode)>,
}

impl MemoryGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Sets an attribute, replacing any previous value under the same name.
    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.retain(|(key, _)| key != name);
        self.attrs.push((name.to_string(), value));
        self
    }

    /// Sets a UTF-8 string attribute.
    pub fn with_text_attr(self, name: &str, value: &str) -> Self {
        self.with_attr(name, AttrValue::Scalar(RawText::from(value)))
    }

    /// Sets a string-list attribute, each entry stored as a byte string the way h5py writes them.
    pub fn with_names_attr(self, name: &str, values: &[&str]) -> Self {
        let list = values
            .iter()
            .map(|v| RawText::Bytes(v.as_bytes().to_vec()))
            .collect();
        self.with_attr(name, AttrValue::List(list))
    }

    /// Appends a child group; its own name is used as the member name.
    pub fn with_group(mut self, group: MemoryGroup) -> Self {
        let name = group.name.clone();
        self.push_member(name, MemoryNode::Group(group));
        self
    }

    pub fn with_dataset(mut self, name: &str, tensor: Tensor) -> Self {
        self.push_member(name.to_string(), MemoryNode::Dataset(tensor));
        self
    }

    /// Appends a member that is neither a group nor a dataset.
    pub fn with_other(mut self, name: &str, description: &str) -> Self {
        self.push_member(name.to_string(), MemoryNode::Other(description.to_string()));
        self
    }

    /// Borrows the tree as its root [`Group`], the same value [`Container::root`] returns.
    pub fn as_root(&self) -> &MemoryGroup {
        self
    }

    fn push_member(&mut self, name: String, node: MemoryNode) {
        self.members.retain(|(key, _)| *key != name);
        self.members.push((name, node));
    }

    fn child(&self, name: &str) -> Option<&MemoryNode> {
        self.members
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    /// Follows a `/`-separated path of member groups. Empty segments are ignored.
    fn descend(&self, path: &str) -> Option<&MemoryGroup> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |group, segment| match group.child(segment) {
                Some(MemoryNode::Group(next)) => Some(next),
                _ => None,
            })
    }

    /// Writes the whole tree as a JSON snapshot.
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> ContainerResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

impl<'a> Dataset for &'a Tensor {
    fn read(&self) -> ContainerResult<Tensor> {
        Ok((*self).clone())
    }
}

impl<'a> Group for &'a MemoryGroup {
    type Dataset = &'a Tensor;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn attr(&self, name: &str) -> ContainerResult<Option<AttrValue>> {
        Ok(self
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone()))
    }

    fn member_names(&self) -> ContainerResult<Vec<String>> {
        Ok(self.members.iter().map(|(key, _)| key.clone()).collect())
    }

    fn member(&self, name: &str) -> ContainerResult<Option<NodeKind<Self, Self::Dataset>>> {
        let this: &'a MemoryGroup = *self;
        let (parent, leaf) = match name.rsplit_once('/') {
            Some((path, leaf)) => match this.descend(path) {
                Some(parent) => (parent, leaf),
                None => return Ok(None),
            },
            None => (this, name),
        };
        Ok(parent.child(leaf).map(|node| match node {
            MemoryNode::Group(group) => NodeKind::Group(group),
            MemoryNode::Dataset(tensor) => NodeKind::Leaf(tensor),
            MemoryNode::Other(description) => NodeKind::Other(description.clone()),
        }))
    }
}

impl Container for MemoryGroup {
    type Root<'a> = &'a MemoryGroup;

    /// Loads a tree previously written by [`MemoryGroup::save_snapshot`].
    fn open(path: &Path) -> ContainerResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn root(&self) -> ContainerResult<Self::Root<'_>> {
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryGroup {
        MemoryGroup::new("/")
            .with_text_attr("backend", "tensorflow")
            .with_group(
                MemoryGroup::new("Dense1")
                    .with_names_attr("weight_names", &["bias"])
                    .with_dataset("bias", Tensor::from_f32(&[2], vec![0.5, -0.5]).unwrap()),
            )
            .with_other("dtype_link", "named datatype")
    }

    #[test]
    fn test_members_keep_insertion_order() {
        let root = sample();
        let names = root.as_root().member_names().unwrap();
        assert_eq!(names, vec!["Dense1".to_string(), "dtype_link".to_string()]);
    }

    #[test]
    fn test_member_resolves_node_kind() {
        let root = sample();
        let root = root.as_root();
        assert!(matches!(root.member("Dense1").unwrap(), Some(NodeKind::Group(_))));
        assert!(matches!(root.member("dtype_link").unwrap(), Some(NodeKind::Other(_))));
        assert!(root.member("missing").unwrap().is_none());

        let dense = root.group("Dense1").unwrap().unwrap();
        match dense.member("bias").unwrap() {
            Some(NodeKind::Leaf(ds)) => assert_eq!(ds.read().unwrap().shape(), &[2]),
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_attr_is_replaced_not_duplicated() {
        let root = MemoryGroup::new("/")
            .with_text_attr("backend", "theano")
            .with_text_attr("backend", "tensorflow");
        let value = root.as_root().attr("backend").unwrap().unwrap();
        assert_eq!(value.to_text().unwrap(), Some("tensorflow".to_string()));
    }

    #[test]
    fn test_slash_paths_walk_nested_groups() {
        let root = MemoryGroup::new("/").with_group(
            MemoryGroup::new("Dense1").with_group(
                MemoryGroup::new("Dense1")
                    .with_dataset("kernel:0", Tensor::from_f32(&[1], vec![1.0]).unwrap()),
            ),
        );
        let root = root.as_root();

        assert!(matches!(root.member("Dense1/Dense1/kernel:0").unwrap(), Some(NodeKind::Leaf(_))));
        assert!(matches!(root.member("/Dense1/Dense1").unwrap(), Some(NodeKind::Group(_))));
        assert!(root.member("Dense1/Missing/kernel:0").unwrap().is_none());
        assert!(root.member("Dense1/Dense1/kernel:0/x").unwrap().is_none());

        let layer = root.group("Dense1").unwrap().unwrap();
        match layer.member("Dense1/kernel:0").unwrap() {
            Some(NodeKind::Leaf(ds)) => assert_eq!(ds.read().unwrap().shape(), &[1]),
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");

        let root = sample();
        root.save_snapshot(&path).unwrap();
        let loaded = MemoryGroup::open(&path).unwrap();

        assert_eq!(loaded, root);
    }
}
