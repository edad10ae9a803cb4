//! Symptom categories and history items.
//!
//! Both are a unique name with a list of unique sub-item names, used to fill
//! autocomplete lists. They differ only in their wire field names, so the
//! service works on them through the `Taxonomy` trait.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::{Collection, Document, StorageEngine};

pub trait SubItem: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn new(id: String, name: String) -> Self;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

pub trait Taxonomy: Document {
    type Item: SubItem;
    /// Body accepted by create and by sub-item replace
    type Request: DeserializeOwned + Send + 'static;

    /// Label used in messages, e.g. "Category"
    const KIND: &'static str;
    /// Wire name of the sub-item list, e.g. "subCategory"
    const ITEMS_FIELD: &'static str;

    fn collection(storage: &StorageEngine) -> &Collection<Self>;
    fn request_parts(request: Self::Request) -> (Option<String>, Option<Vec<Self::Item>>);

    fn create(id: String, name: String, items: Vec<Self::Item>, now: DateTime<Utc>) -> Self;
    fn name(&self) -> &str;
    fn items(&self) -> &[Self::Item];
    fn replace_items(&mut self, items: Vec<Self::Item>, now: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "categoryName")]
    pub name: String,
    #[serde(rename = "subCategory", default)]
    pub sub_categories: Vec<SubCategory>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCategory {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "subCategoryName", alias = "subCatagoryName")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryRequest {
    #[serde(rename = "categoryName", alias = "catagoryName", default)]
    pub name: Option<String>,
    #[serde(rename = "subCategory", alias = "subCatagory", default)]
    pub sub_categories: Option<Vec<SubCategory>>,
}

impl Document for Category {
    fn id(&self) -> &str {
        &self.id
    }
}

impl SubItem for SubCategory {
    fn new(id: String, name: String) -> Self {
        SubCategory { id, name }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Taxonomy for Category {
    type Item = SubCategory;
    type Request = CategoryRequest;

    const KIND: &'static str = "Category";
    const ITEMS_FIELD: &'static str = "subCategory";

    fn collection(storage: &StorageEngine) -> &Collection<Self> {
        &storage.categories
    }

    fn request_parts(request: CategoryRequest) -> (Option<String>, Option<Vec<SubCategory>>) {
        (request.name, request.sub_categories)
    }

    fn create(id: String, name: String, items: Vec<SubCategory>, now: DateTime<Utc>) -> Self {
        Category {
            id,
            name,
            sub_categories: items,
            created_at: now,
            updated_at: now,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> &[SubCategory] {
        &self.sub_categories
    }

    fn replace_items(&mut self, items: Vec<SubCategory>, now: DateTime<Utc>) {
        self.sub_categories = items;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "historyName")]
    pub name: String,
    #[serde(rename = "subHistory", default)]
    pub sub_history: Vec<SubHistory>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubHistory {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "subHistoryName")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRequest {
    #[serde(rename = "historyName", default)]
    pub name: Option<String>,
    #[serde(rename = "subHistory", default)]
    pub sub_history: Option<Vec<SubHistory>>,
}

impl Document for HistoryEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl SubItem for SubHistory {
    fn new(id: String, name: String) -> Self {
        SubHistory { id, name }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Taxonomy for HistoryEntry {
    type Item = SubHistory;
    type Request = HistoryRequest;

    const KIND: &'static str = "History";
    const ITEMS_FIELD: &'static str = "subHistory";

    fn collection(storage: &StorageEngine) -> &Collection<Self> {
        &storage.history
    }

    fn request_parts(request: HistoryRequest) -> (Option<String>, Option<Vec<SubHistory>>) {
        (request.name, request.sub_history)
    }

    fn create(id: String, name: String, items: Vec<SubHistory>, now: DateTime<Utc>) -> Self {
        HistoryEntry {
            id,
            name,
            sub_history: items,
            created_at: now,
            updated_at: now,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> &[SubHistory] {
        &self.sub_history
    }

    fn replace_items(&mut self, items: Vec<SubHistory>, now: DateTime<Utc>) {
        self.sub_history = items;
        self.updated_at = now;
    }
}
