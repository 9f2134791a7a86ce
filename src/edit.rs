//! EditSet collects the per-tag mutations for one rewrite.
//!
//! Edits are keyed by directory name and tag ID. Each edit carries its own
//! flags: whether it may create a tag that is absent, and which other
//! directories the tag should be removed from (moving a tag between
//! directories).
//!
//! # Example
//!
//! ```rust
//! use tagdir::EditSet;
//!
//! let mut edits = EditSet::new();
//! edits.set("IFD0", 0x0110, "Model X");
//! edits.set("IFD0", 0x0112, 6u16).edit_only();
//! edits.delete("ExifIFD", 0x9286);
//! edits.set("ExifIFD", 0x8827, 400u16).remove_from("IFD0");
//!
//! assert_eq!(edits.len(), 4);
//! assert!(edits.has_creating_edits("IFD0"));
//! ```

use crate::codec::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// The new content requested for a tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EditValue {
    /// Replace or create the tag. More than one value is only meaningful
    /// for list tags.
    Set(Vec<Value>),
    /// Remove the tag.
    Delete,
    /// Substitute the bulk payload referenced by an offsets tag.
    Payload(Vec<u8>),
}

/// One requested mutation with its flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEdit {
    value: EditValue,
    create: bool,
    remove_from: Vec<String>,
}

impl TagEdit {
    fn new(value: EditValue) -> Self {
        let create = !matches!(value, EditValue::Delete);
        Self { value, create, remove_from: Vec::new() }
    }

    /// Only edit the tag if it already exists.
    pub fn edit_only(&mut self) -> &mut Self {
        self.create = false;
        self
    }

    /// Also delete the tag from `dir` when it is found there.
    pub fn remove_from(&mut self, dir: impl Into<String>) -> &mut Self {
        let dir = dir.into();
        if !self.remove_from.contains(&dir) {
            self.remove_from.push(dir);
        }
        self
    }

    /// The requested value.
    pub fn value(&self) -> &EditValue {
        &self.value
    }

    /// Whether the tag may be created when absent.
    pub fn creates(&self) -> bool {
        self.create && !matches!(self.value, EditValue::Delete)
    }

    /// Returns true for deletions.
    pub fn is_delete(&self) -> bool {
        matches!(self.value, EditValue::Delete)
    }
}

/// A sub-directory to hang off a container tag that the registry does not
/// describe for the parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdirAddition {
    /// Directory holding the container entry.
    pub parent: String,
    /// Container tag.
    pub tag: u16,
    /// Name of the new directory.
    pub name: String,
    /// Table describing the new directory.
    pub table: String,
}

/// A sparse table of tag mutations, keyed by directory name and tag.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    edits: BTreeMap<(String, u16), TagEdit>,
    everywhere: BTreeSet<u16>,
    additions: Vec<SubdirAddition>,
}

impl EditSet {
    /// Creates an empty EditSet.
    ///
    /// # Example
    ///
    /// ```
    /// use tagdir::EditSet;
    ///
    /// let edits = EditSet::new();
    /// assert!(edits.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, dir: &str, tag: u16, value: EditValue) -> &mut TagEdit {
        let edit = TagEdit::new(value);
        match self.edits.entry((dir.to_string(), tag)) {
            Entry::Occupied(mut slot) => {
                slot.insert(edit);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(edit),
        }
    }

    /// Set a tag to a single value. Replaces any earlier edit of the same tag.
    pub fn set(&mut self, dir: &str, tag: u16, value: impl Into<Value>) -> &mut TagEdit {
        self.insert(dir, tag, EditValue::Set(vec![value.into()]))
    }

    /// Set a list tag to several values.
    pub fn set_list(&mut self, dir: &str, tag: u16, values: Vec<Value>) -> &mut TagEdit {
        self.insert(dir, tag, EditValue::Set(values))
    }

    /// Delete a tag from one directory.
    pub fn delete(&mut self, dir: &str, tag: u16) -> &mut TagEdit {
        self.insert(dir, tag, EditValue::Delete)
    }

    /// Delete a tag from every directory whose table defines it.
    pub fn delete_everywhere(&mut self, tag: u16) {
        self.everywhere.insert(tag);
    }

    /// Substitute the payload referenced by the offsets tag `tag`. The
    /// matching byte-count entry is regenerated.
    ///
    /// # Example
    ///
    /// ```
    /// use tagdir::{EditSet, EditValue};
    ///
    /// let mut edits = EditSet::new();
    /// edits.replace_payload("IFD1", 0x0201, vec![0xff, 0xd8, 0xff, 0xd9]);
    /// assert!(matches!(edits.get("IFD1", 0x0201).unwrap().value(), EditValue::Payload(_)));
    /// ```
    pub fn replace_payload(&mut self, dir: &str, tag: u16, bytes: Vec<u8>) -> &mut TagEdit {
        self.insert(dir, tag, EditValue::Payload(bytes))
    }

    /// Declare a sub-directory reached through `tag` in `parent`.
    pub fn add_directory(&mut self, parent: &str, tag: u16, name: &str, table: &str) {
        self.additions.retain(|a| !(a.parent == parent && a.tag == tag));
        self.additions.push(SubdirAddition {
            parent: parent.to_string(),
            tag,
            name: name.to_string(),
            table: table.to_string(),
        });
    }

    /// Look up the edit for a tag in a directory.
    pub fn get(&self, dir: &str, tag: u16) -> Option<&TagEdit> {
        self.edits.get(&(dir.to_string(), tag))
    }

    /// Edits for one directory, in ascending tag order.
    pub fn for_directory<'a>(&'a self, dir: &str) -> impl Iterator<Item = (u16, &'a TagEdit)> + 'a {
        let lo = (dir.to_string(), 0u16);
        let hi = (dir.to_string(), u16::MAX);
        self.edits.range(lo..=hi).map(|((_, tag), edit)| (*tag, edit))
    }

    /// Whether `tag` was moved out of `dir` by an edit in another directory.
    pub fn moved_from(&self, dir: &str, tag: u16) -> bool {
        self.edits
            .iter()
            .any(|((d, t), e)| *t == tag && d != dir && e.remove_from.iter().any(|r| r == dir))
    }

    /// Whether `tag` is to be deleted from every directory whose table
    /// defines it.
    pub fn deleted_everywhere(&self, tag: u16) -> bool {
        self.everywhere.contains(&tag)
    }

    /// Whether anything would create content in `dir`.
    pub fn has_creating_edits(&self, dir: &str) -> bool {
        self.for_directory(dir).any(|(_, e)| e.creates())
    }

    /// Explicit sub-directory additions under `parent`, in insertion order.
    pub fn additions_for<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a SubdirAddition> + 'a {
        self.additions.iter().filter(move |a| a.parent == parent)
    }

    /// Number of recorded edits, including global deletions.
    pub fn len(&self) -> usize {
        self.edits.len() + self.everywhere.len()
    }

    /// Returns true if no edits are recorded.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.everywhere.is_empty() && self.additions.is_empty()
    }

    /// Clears all edits.
    pub fn clear(&mut self) {
        self.edits.clear();
        self.everywhere.clear();
        self.additions.clear();
    }
}
