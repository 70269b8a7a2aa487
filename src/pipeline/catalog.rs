use std::collections::{HashMap, HashSet};
use std::hash::BuildHasher;

use dashmap::DashMap;

use crate::types::catalog::{Tag, TourType};

/// Tag and tour type store the assembler reads from and writes to.
///
/// Implementations are not reentrant. Callers importing several files in
/// parallel must serialize access, one writer at a time.
pub trait Catalog {
    fn find_tag_by_equipment_id(&self, equipment_id: &str) -> Option<Tag>;
    /// Case-insensitive.
    fn find_tag_by_name(&self, name: &str) -> Option<Tag>;
    fn create_tag(&mut self, name: &str, notes: Option<String>, equipment_id: Option<String>) -> Tag;
    /// Case-insensitive.
    fn find_tour_type(&self, name: &str) -> Option<TourType>;
    fn create_tour_type(&mut self, name: &str) -> TourType;
}

/// Ids of tours that exist already.
pub trait ImportedTours {
    fn contains_tour(&self, tour_id: i64) -> bool;
}

impl<S: BuildHasher> ImportedTours for HashSet<i64, S> {
    fn contains_tour(&self, tour_id: i64) -> bool {
        self.contains(&tour_id)
    }
}

impl<T, S: BuildHasher> ImportedTours for HashMap<i64, T, S> {
    fn contains_tour(&self, tour_id: i64) -> bool {
        self.contains_key(&tour_id)
    }
}

impl<T> ImportedTours for DashMap<i64, T> {
    fn contains_tour(&self, tour_id: i64) -> bool {
        self.contains_key(&tour_id)
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    tags: Vec<Tag>,
    tour_types: Vec<TourType>,
    next_id: u64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tour_types(&self) -> &[TourType] {
        &self.tour_types
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Catalog for InMemoryCatalog {
    fn find_tag_by_equipment_id(&self, equipment_id: &str) -> Option<Tag> {
        self.tags
            .iter()
            .find(|tag| tag.equipment_id.as_deref() == Some(equipment_id))
            .cloned()
    }

    fn find_tag_by_name(&self, name: &str) -> Option<Tag> {
        self.tags
            .iter()
            .find(|tag| tag.name.to_lowercase() == name.to_lowercase())
            .cloned()
    }

    fn create_tag(&mut self, name: &str, notes: Option<String>, equipment_id: Option<String>) -> Tag {
        let tag = Tag {
            id: self.allocate_id(),
            name: name.to_string(),
            notes,
            equipment_id,
        };
        self.tags.push(tag.clone());
        tag
    }

    fn find_tour_type(&self, name: &str) -> Option<TourType> {
        self.tour_types
            .iter()
            .find(|tour_type| tour_type.name.to_lowercase() == name.to_lowercase())
            .cloned()
    }

    fn create_tour_type(&mut self, name: &str) -> TourType {
        let tour_type = TourType {
            id: self.allocate_id(),
            name: name.to_string(),
        };
        self.tour_types.push(tour_type.clone());
        tour_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut catalog = InMemoryCatalog::new();
        let created = catalog.create_tour_type("Running");
        assert_eq!(catalog.find_tour_type("RUNNING"), Some(created));

        let tag = catalog.create_tag("Pegasus 39", None, Some("shoe-1".into()));
        assert_eq!(catalog.find_tag_by_name("pegasus 39"), Some(tag.clone()));
        assert_eq!(catalog.find_tag_by_equipment_id("shoe-1"), Some(tag));
        assert_eq!(catalog.find_tag_by_equipment_id("SHOE-1"), None);
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut catalog = InMemoryCatalog::new();
        let tag = catalog.create_tag("a", None, None);
        let tour_type = catalog.create_tour_type("b");
        assert_ne!(tag.id, tour_type.id);
    }
}
