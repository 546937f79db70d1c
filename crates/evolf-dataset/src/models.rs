//! Dataset wire types and query parameters.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Sort keys accepted from callers and the backend column they sort on.
/// Keys not listed pass through untouched.
pub const SORT_FIELDS: &[(&str, &str)] = &[
    ("evolfId", "EvOlf_ID"),
    ("receptor", "Receptor"),
    ("ligand", "Ligand"),
    ("species", "Species"),
    ("class", "Class"),
    ("mutation", "Mutation"),
];

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const DEFAULT_SORT_FIELD: &str = "EvOlf_ID";

pub const COMPLETE_DATASET_FILE: &str = "evolf_complete_dataset.zip";
pub const SELECTION_EXPORT_FILE: &str = "evolf_filtered_export.zip";

pub fn entry_export_file_name(evolf_id: &str) -> String {
    format!("{}_data.zip", evolf_id)
}

pub fn backend_sort_field(key: &str) -> &str {
    SORT_FIELDS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, column)| *column)
        .unwrap_or(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}': expected asc or desc", other)),
        }
    }
}

/// Parameters of one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    /// Caller-facing key (`evolfId`, `receptor`, ...) or a raw backend column.
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub species: Option<String>,
    pub class: Option<String>,
    pub mutation_type: Option<String>,
}

impl Default for DatasetQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            sort_by: DEFAULT_SORT_FIELD.to_string(),
            sort_order: SortOrder::Desc,
            species: None,
            class: None,
            mutation_type: None,
        }
    }
}

impl DatasetQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn sort(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = key.into();
        self.sort_order = order;
        self
    }

    pub fn species(mut self, species: impl Into<String>) -> Self {
        self.species = Some(species.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn mutation_type(mut self, mutation_type: impl Into<String>) -> Self {
        self.mutation_type = Some(mutation_type.into());
        self
    }

    /// Query string pairs in the order the backend documents them. Blank
    /// search and filter values are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("limit", self.limit.to_string())];
        if let Some(search) = non_blank(self.search.as_deref()) {
            pairs.push(("search", search.to_string()));
        }
        pairs.push(("sortBy", backend_sort_field(&self.sort_by).to_string()));
        pairs.push(("sortOrder", self.sort_order.as_str().to_string()));
        if let Some(species) = non_blank(self.species.as_deref()) {
            pairs.push(("species", species.to_string()));
        }
        if let Some(class) = non_blank(self.class.as_deref()) {
            pairs.push(("class", class.to_string()));
        }
        if let Some(mutation_type) = non_blank(self.mutation_type.as_deref()) {
            pairs.push(("mutationType", mutation_type.to_string()));
        }
        pairs
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One row of the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub evolf_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receptor: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub species: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ligand: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub chembl_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mutation: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class: String,
    /// The listing serializer names the class column `class_field`.
    #[serde(default, rename = "class_field", deserialize_with = "lenient_string", skip_serializing)]
    class_field: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uniprot_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ensemble_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cid: String,
}

impl DatasetEntry {
    pub(crate) fn normalize(mut self) -> Self {
        if self.class.is_empty() {
            self.class = std::mem::take(&mut self.class_field);
        }
        self.class_field.clear();
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u64,
    #[serde(default)]
    pub total_pages: u64,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub items_per_page: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default, deserialize_with = "string_list")]
    pub unique_classes: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub unique_species: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub unique_mutation_types: Vec<String>,
}

/// Values offered by the listing filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub classes: Vec<String>,
    pub species: Vec<String>,
    pub mutation_types: Vec<String>,
}

/// One page of the listing, normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetPage {
    pub entries: Vec<DatasetEntry>,
    pub pagination: Pagination,
    pub statistics: Statistics,
    pub filter_options: FilterOptions,
    /// Ids of every row matching the query, across all pages.
    pub all_evolf_ids: Vec<String>,
}

/// Listing body exactly as sent; every block may be missing.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawPage {
    #[serde(default)]
    pub data: Vec<DatasetEntry>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default, rename = "filterOptions")]
    pub filter_options: Option<Statistics>,
    #[serde(default)]
    pub all_evolf_ids: Option<Vec<String>>,
}

impl RawPage {
    pub(crate) fn into_page(self, query: &DatasetQuery) -> DatasetPage {
        let entries: Vec<DatasetEntry> = self.data.into_iter().map(DatasetEntry::normalize).collect();

        let pagination = self.pagination.unwrap_or(Pagination {
            current_page: u64::from(query.page),
            items_per_page: u64::from(query.limit),
            total_items: 0,
            total_pages: 0,
        });

        let filter_options = self
            .filter_options
            .map(|f| FilterOptions {
                classes: f.unique_classes,
                species: f.unique_species,
                mutation_types: f.unique_mutation_types,
            })
            .unwrap_or_default();

        let all_evolf_ids = self
            .all_evolf_ids
            .unwrap_or_else(|| entries.iter().map(|e| e.evolf_id.clone()).collect());

        DatasetPage {
            entries,
            pagination,
            statistics: self.statistics.unwrap_or_default(),
            filter_options,
            all_evolf_ids,
        }
    }
}

/// Full record behind one EvOlf id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDetail {
    #[serde(default, deserialize_with = "lenient_string")]
    pub evolf_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receptor: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ligand: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub species: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class: String,
    #[serde(default, rename = "class_field", deserialize_with = "lenient_string", skip_serializing)]
    class_field: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receptor_subtype: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gene_symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mutation: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mutation_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mutation_impact: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mutation_status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub method: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uniprot_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uniprot_link: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub chembl_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pubchem_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pubchem_link: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sequence: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub smiles: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub inchi: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub inchi_key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub iupac_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub structure2d: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub structure3d: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pdb_data: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sdf_data: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comments: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_links: String,
}

impl DatasetDetail {
    pub(crate) fn normalize(mut self) -> Self {
        if self.class.is_empty() {
            self.class = std::mem::take(&mut self.class_field);
        }
        self.class_field.clear();
        self
    }
}

/// One search hit; keys follow the dataset's column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default, rename = "EvOlf_ID", deserialize_with = "lenient_string")]
    pub evolf_id: String,
    #[serde(default, rename = "Receptor", deserialize_with = "lenient_string")]
    pub receptor: String,
    #[serde(default, rename = "Ligand", deserialize_with = "lenient_string")]
    pub ligand: String,
    #[serde(default, rename = "Species", deserialize_with = "lenient_string")]
    pub species: String,
    #[serde(default, rename = "Sequence", deserialize_with = "lenient_string")]
    pub sequence: String,
    #[serde(default, rename = "UniProt_ID", deserialize_with = "lenient_string")]
    pub uniprot_id: String,
    #[serde(default, rename = "CID", deserialize_with = "lenient_string")]
    pub cid: String,
    #[serde(default, rename = "ChEMBL_ID", deserialize_with = "lenient_string")]
    pub chembl_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default, deserialize_with = "string_list")]
    pub suggestions: Vec<String>,
}

/// Null becomes empty; numbers and other scalars keep their JSON text.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Drops nulls and blanks from distinct-value lists.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .flatten()
        .filter(|v| !v.trim().is_empty())
        .collect())
}
