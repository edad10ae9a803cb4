use chrono::Utc;
use tracing::info;

use super::ClinicService;
use crate::error::{ClinicError, Result};
use crate::models::{new_id, SubItem, Taxonomy};
use crate::storage::Document;

/// Names compare trimmed and case-insensitively
fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Clean up a submitted sub-item list: trim names, drop blanks and repeats
/// (first one wins), and keep the id of any item already stored under the
/// same name. New items get fresh ids.
fn normalize_items<I: SubItem>(existing: &[I], incoming: Vec<I>) -> Vec<I> {
    let mut items: Vec<I> = Vec::with_capacity(incoming.len());
    for item in incoming {
        let name = item.name().trim();
        if name.is_empty() || items.iter().any(|i| same_name(i.name(), name)) {
            continue;
        }
        let id = existing
            .iter()
            .find(|e| same_name(e.name(), name))
            .map(|e| e.id().to_string())
            .unwrap_or_else(new_id);
        items.push(I::new(id, name.to_string()));
    }
    items
}

impl ClinicService {
    pub fn list_taxonomy<T: Taxonomy>(&self) -> Result<Vec<T>> {
        Ok(T::collection(&self.storage).all()?)
    }

    /// Find the entry with this name or create it. The flag is true when a
    /// new entry was created; an existing entry is returned unchanged.
    pub fn find_or_create_taxonomy<T: Taxonomy>(&self, request: T::Request) -> Result<(T, bool)> {
        let (name, items) = T::request_parts(request);
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ClinicError::Validation(format!("{} name is required", T::KIND)))?;
        let items = normalize_items::<T::Item>(&[], items.unwrap_or_default());

        let (entry, created) = T::collection(&self.storage).find_or_insert_with(
            |existing: &T| same_name(existing.name(), &name),
            || Ok::<_, ClinicError>(T::create(new_id(), name.clone(), items, Utc::now())),
        )?;

        if created {
            info!(kind = T::KIND, id = entry.id(), name = entry.name(), "taxonomy entry created");
        }
        Ok((entry, created))
    }

    /// Replace the whole sub-item list of one entry
    pub fn replace_taxonomy_items<T: Taxonomy>(&self, id: &str, request: T::Request) -> Result<T> {
        let (_, items) = T::request_parts(request);
        let items = items.ok_or_else(|| ClinicError::Validation(format!("{} is required", T::ITEMS_FIELD)))?;

        let entry = T::collection(&self.storage)
            .update(id, |entry: &mut T| {
                let items = normalize_items(entry.items(), items);
                entry.replace_items(items, Utc::now());
                Ok::<_, ClinicError>(())
            })?
            .ok_or_else(|| ClinicError::not_found(T::KIND))?;

        info!(kind = T::KIND, id, items = entry.items().len(), "taxonomy items replaced");
        Ok(entry)
    }

    /// Add one sub-item by name unless the entry already has it
    pub fn add_taxonomy_item<T: Taxonomy>(&self, id: &str, name: &str) -> Result<T> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClinicError::Validation("Item name is required".to_string()));
        }

        T::collection(&self.storage)
            .update(id, |entry: &mut T| {
                if !entry.items().iter().any(|i| same_name(i.name(), name)) {
                    let mut items = entry.items().to_vec();
                    items.push(<T::Item as SubItem>::new(new_id(), name.to_string()));
                    entry.replace_items(items, Utc::now());
                    info!(kind = T::KIND, id, name, "taxonomy item added");
                }
                Ok::<_, ClinicError>(())
            })?
            .ok_or_else(|| ClinicError::not_found(T::KIND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic::testing::service;
    use crate::models::{Category, CategoryRequest, HistoryEntry, HistoryRequest};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn category(value: serde_json::Value) -> CategoryRequest {
        serde_json::from_value(value).unwrap()
    }

    fn names(entry: &Category) -> Vec<&str> {
        entry.sub_categories.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_replace_items_is_wholesale() {
        let clinic = service();
        let (created, _) = clinic
            .find_or_create_taxonomy::<Category>(category(json!({
                "categoryName": "Fever",
                "subCategory": [{"subCategoryName": "High"}, {"subCategoryName": "Low"}],
            })))
            .unwrap();
        assert_eq!(names(&created), vec!["High", "Low"]);

        let updated = clinic
            .replace_taxonomy_items::<Category>(
                &created.id,
                category(json!({"subCategory": [{"subCategoryName": "Low"}, {"subCategoryName": "Intermittent"}]})),
            )
            .unwrap();

        assert_eq!(names(&updated), vec!["Low", "Intermittent"]);
        // Surviving items keep their ids
        assert_eq!(updated.sub_categories[0].id, created.sub_categories[1].id);
        assert_eq!(clinic.list_taxonomy::<Category>().unwrap(), vec![updated]);
    }

    #[test]
    fn test_find_or_create_returns_existing() {
        let clinic = service();
        let (first, created) = clinic
            .find_or_create_taxonomy::<Category>(category(json!({"catagoryName": "Headache"})))
            .unwrap();
        assert!(created);

        let (second, created) = clinic
            .find_or_create_taxonomy::<Category>(category(json!({"categoryName": "  headache "})))
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(clinic.list_taxonomy::<Category>().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_identical_creates_make_one_entry() {
        let clinic = service();
        let results: Vec<(Category, bool)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let clinic = &clinic;
                    // Same name, varied case and padding
                    let name = if i % 2 == 0 { "Migraine" } else { " migraine " };
                    scope.spawn(move || {
                        clinic
                            .find_or_create_taxonomy::<Category>(category(json!({"categoryName": name})))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        let stored = clinic.list_taxonomy::<Category>().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(results.iter().all(|(entry, _)| entry.id == stored[0].id));
    }

    #[test]
    fn test_blank_name_rejected() {
        let clinic = service();
        let result = clinic.find_or_create_taxonomy::<Category>(category(json!({"categoryName": " "})));
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }

    #[test]
    fn test_duplicate_sub_items_collapse() {
        let clinic = service();
        let (entry, _) = clinic
            .find_or_create_taxonomy::<Category>(category(json!({
                "categoryName": "Pain",
                "subCatagory": [{"subCatagoryName": "Sharp"}, {"subCategoryName": "sharp"}, {"subCategoryName": ""}],
            })))
            .unwrap();
        assert_eq!(names(&entry), vec!["Sharp"]);
    }

    #[test]
    fn test_replace_requires_item_list() {
        let clinic = service();
        let (entry, _) = clinic
            .find_or_create_taxonomy::<Category>(category(json!({"categoryName": "Pain"})))
            .unwrap();
        let result = clinic.replace_taxonomy_items::<Category>(&entry.id, category(json!({})));
        assert!(matches!(result, Err(ClinicError::Validation(_))));

        let result = clinic.replace_taxonomy_items::<Category>("missing", category(json!({"subCategory": []})));
        assert!(matches!(result, Err(ClinicError::NotFound(_))));
    }

    #[test]
    fn test_history_add_item_is_idempotent() {
        let clinic = service();
        let request: HistoryRequest = serde_json::from_value(json!({"historyName": "Diabetes"})).unwrap();
        let (entry, _) = clinic.find_or_create_taxonomy::<HistoryEntry>(request).unwrap();

        clinic.add_taxonomy_item::<HistoryEntry>(&entry.id, "Type 2").unwrap();
        let entry = clinic.add_taxonomy_item::<HistoryEntry>(&entry.id, "type 2").unwrap();

        assert_eq!(entry.sub_history.len(), 1);
        assert_eq!(entry.sub_history[0].name, "Type 2");
    }
}
