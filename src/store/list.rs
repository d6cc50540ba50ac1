//! Identifier-unique ordered item list

use std::collections::{HashMap, HashSet};

use crate::models::Item;

/// Ordered sequence of items with at most one item per identifier.
///
/// A write for an identifier that is already present overwrites that item in
/// place (newest write wins) and never moves or duplicates it.
#[derive(Debug, Clone, Default)]
pub struct ItemList {
    items: Vec<Item>,
    ids: HashSet<String>,
}

/// Collapse duplicates inside one batch: the first occurrence keeps its
/// position, the last occurrence supplies the content.
pub(crate) fn dedup_batch(items: Vec<Item>) -> Vec<Item> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<Item> = Vec::with_capacity(items.len());

    for item in items {
        if let Some(&idx) = slots.get(&item.id) {
            out[idx] = item;
        } else {
            slots.insert(item.id.clone(), out.len());
            out.push(item);
        }
    }
    out
}

impl ItemList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Items in order
    pub fn as_slice(&self) -> &[Item] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether an identifier is present
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Look up an item by identifier
    pub fn get(&self, id: &str) -> Option<&Item> {
        if !self.contains(id) {
            return None;
        }
        self.items.iter().find(|i| i.id == id)
    }

    /// Look up an item mutably by identifier
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        if !self.contains(id) {
            return None;
        }
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Overwrite an existing item in place. Returns the item back if its
    /// identifier is not present.
    pub fn overwrite(&mut self, item: Item) -> Result<(), Item> {
        match self.get_mut(&item.id) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Replace the whole list
    pub fn replace_all(&mut self, items: Vec<Item>) {
        self.items = dedup_batch(items);
        self.ids = self.items.iter().map(|i| i.id.clone()).collect();
    }

    /// Append items not yet present, in received order; present ones are
    /// overwritten in place. Returns how many were appended.
    pub fn append(&mut self, items: Vec<Item>) -> usize {
        let mut appended = 0;
        for item in dedup_batch(items) {
            if let Err(item) = self.overwrite(item) {
                self.ids.insert(item.id.clone());
                self.items.push(item);
                appended += 1;
            }
        }
        appended
    }

    /// Prepend items not yet present, keeping their relative order; present
    /// ones are overwritten in place. Returns how many were prepended.
    pub fn prepend(&mut self, items: Vec<Item>) -> usize {
        let mut fresh = Vec::new();
        for item in dedup_batch(items) {
            if let Err(item) = self.overwrite(item) {
                self.ids.insert(item.id.clone());
                fresh.push(item);
            }
        }

        let prepended = fresh.len();
        if prepended > 0 {
            fresh.append(&mut self.items);
            self.items = fresh;
        }
        prepended
    }

    /// Remove and return every item
    pub fn take_all(&mut self) -> Vec<Item> {
        self.ids.clear();
        std::mem::take(&mut self.items)
    }

    /// Remove every item
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, text: &str) -> Item {
        let mut item = Item::new(id);
        item.text = text.to_string();
        item
    }

    fn ids(list: &ItemList) -> Vec<&str> {
        list.as_slice().iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_batch_dedup_keeps_first_position_last_content() {
        let out = dedup_batch(vec![item("a", "1"), item("b", "1"), item("a", "2")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].text, "2");
    }

    #[test]
    fn test_prepend_preserves_order_and_skips_present() {
        let mut list = ItemList::new();
        list.replace_all(vec![item("c", "old"), item("d", "")]);

        let added = list.prepend(vec![item("a", ""), item("b", ""), item("c", "new")]);
        assert_eq!(added, 2);
        assert_eq!(ids(&list), vec!["a", "b", "c", "d"]);
        assert_eq!(list.get("c").unwrap().text, "new");
    }

    #[test]
    fn test_append_skips_present() {
        let mut list = ItemList::new();
        list.replace_all(vec![item("a", ""), item("b", "")]);

        assert_eq!(list.append(vec![item("b", "x"), item("c", "")]), 1);
        assert_eq!(ids(&list), vec!["a", "b", "c"]);
        assert_eq!(list.get("b").unwrap().text, "x");
    }

    #[test]
    fn test_take_all_empties() {
        let mut list = ItemList::new();
        list.replace_all(vec![item("a", "")]);
        let taken = list.take_all();
        assert_eq!(taken.len(), 1);
        assert!(list.is_empty());
        assert!(!list.contains("a"));
    }
}
