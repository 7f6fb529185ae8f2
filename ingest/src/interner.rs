//! First-seen-order string dictionaries.
//!
//! Every distinct string receives the next dense `u32` code the first time it
//! is added; adding it again returns the same code. Codes are never reused
//! or reassigned for the lifetime of a run, and each dictionary is persisted
//! once at the end as `index_to_tag_<category>.txt` (line k = code k).

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use thiserror::Error;

use crate::common::Category;
use crate::time_index::write_lines;

/// A code could not be represented in its column's numeric width without
/// colliding with the column's "unset" sentinel.
#[derive(Debug, Error)]
#[error("dictionary '{category}' exhausted its code space at code {code} (limit {limit})")]
pub struct CodeSpaceExhausted {
    pub category: &'static str,
    pub code: u32,
    pub limit: u64,
}

/// String → dense code dictionary for a single [`Category`].
#[derive(Debug, Clone)]
pub struct IndexDict {
    category: Category,
    values: IndexSet<String>,
}

impl IndexDict {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            values: IndexSet::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Code of `value`, assigning the next free code if it is new.
    pub fn add(&mut self, value: &str) -> u32 {
        if let Some(index) = self.values.get_index_of(value) {
            return index as u32;
        }
        let (index, _) = self.values.insert_full(value.to_owned());
        debug_assert!(index < u32::MAX as usize, "{} codes exceed u32", self.category.name());
        index as u32
    }

    /// [`add`](Self::add) every value in order. An empty input returns an
    /// empty vector and leaves the dictionary untouched.
    pub fn add_many<I, S>(&mut self, values: I) -> Vec<u32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values.into_iter().map(|v| self.add(v.as_ref())).collect()
    }

    /// Existing code of `value`, without inserting.
    pub fn get(&self, value: &str) -> Option<u32> {
        self.values.get_index_of(value).map(|i| i as u32)
    }

    /// String that received `code`.
    pub fn value(&self, code: u32) -> Option<&str> {
        self.values.get_index(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write `index_to_tag_<category>.txt` into `dir`, ordered by code.
    pub fn save(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(self.category.dictionary_file_name());
        let values: Vec<&str> = self.values.iter().map(String::as_str).collect();
        write_lines(&path, &values)?;
        Ok(path)
    }
}

/// One [`IndexDict`] per [`Category`], owned by the pipeline.
#[derive(Debug, Clone)]
pub struct Dictionaries {
    dicts: Vec<IndexDict>,
}

impl Default for Dictionaries {
    fn default() -> Self {
        Self {
            dicts: Category::ALL.into_iter().map(IndexDict::new).collect(),
        }
    }
}

impl Dictionaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> &IndexDict {
        &self.dicts[category as usize]
    }

    pub fn get_mut(&mut self, category: Category) -> &mut IndexDict {
        &mut self.dicts[category as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexDict> {
        self.dicts.iter()
    }

    /// `(category, distinct values)` for every dictionary, in category order.
    pub fn sizes(&self) -> Vec<(Category, usize)> {
        self.dicts.iter().map(|d| (d.category, d.len())).collect()
    }

    /// Persist every dictionary into `dir`.
    pub fn save_all(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.dicts.iter().map(|d| d.save(dir)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut dict = IndexDict::new(Category::UserName);
        assert_eq!(dict.add("A"), 0);
        assert_eq!(dict.add("A"), 0);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_codes_follow_first_insertion() {
        let mut dict = IndexDict::new(Category::Hashtag);
        let codes: Vec<u32> = ["b", "a", "b", "c", "a"].iter().map(|v| dict.add(v)).collect();
        assert_eq!(codes, vec![0, 1, 0, 2, 1]);
        assert_eq!(dict.value(0), Some("b"));
        assert_eq!(dict.value(2), Some("c"));
        assert_eq!(dict.value(3), None);
        assert_eq!(dict.get("a"), Some(1));
        assert_eq!(dict.get("z"), None);
    }

    #[test]
    fn test_add_many_preserves_order_and_duplicates() {
        let mut dict = IndexDict::new(Category::AllTags);
        assert_eq!(dict.add_many(["name", "highway", "name"]), vec![0, 1, 0]);
        assert_eq!(dict.add_many(Vec::<String>::new()), Vec::<u32>::new());
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_save_writes_code_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut dicts = Dictionaries::new();
        dicts.get_mut(Category::CreatedBy).add("JOSM");
        dicts.get_mut(Category::CreatedBy).add("iD");
        dicts.get_mut(Category::CreatedBy).add("JOSM");

        let paths = dicts.save_all(dir.path()).unwrap();
        assert_eq!(paths.len(), Category::ALL.len());

        let text =
            std::fs::read_to_string(dir.path().join("index_to_tag_created_by.txt")).unwrap();
        assert_eq!(text, "JOSM\niD\n");
        let empty = std::fs::read_to_string(dir.path().join("index_to_tag_hashtag.txt")).unwrap();
        assert_eq!(empty, "");
    }

    #[test]
    fn test_dictionaries_are_independent() {
        let mut dicts = Dictionaries::new();
        assert_eq!(dicts.get_mut(Category::Imagery).add("Bing"), 0);
        assert_eq!(dicts.get_mut(Category::Source).add("survey"), 0);
        assert_eq!(dicts.get_mut(Category::Source).add("Bing"), 1);
        assert_eq!(dicts.get(Category::Imagery).len(), 1);
        assert_eq!(
            dicts.sizes()[Category::Source as usize],
            (Category::Source, 2)
        );
    }
}
