use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub place_name: String,
}

impl Place {
    pub fn new(place_id: impl Into<String>, place_name: impl Into<String>) -> Self {
        Self {
            place_id: place_id.into(),
            place_name: place_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordAssociation {
    pub keyword: String,
    pub place_id: String,
}

impl KeywordAssociation {
    pub fn new(keyword: impl Into<String>, place_id: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            place_id: place_id.into(),
        }
    }
}

pub fn load_places(path: &Path) -> AppResult<Vec<Place>> {
    let rows: Vec<Place> = read_table(path)?;
    Ok(rows
        .into_iter()
        .filter(|row| {
            if row.place_id.is_empty() {
                warn!(target: "tables", name = %row.place_name, "skipping place without place_id");
                return false;
            }
            true
        })
        .collect())
}

pub fn load_keywords(path: &Path) -> AppResult<Vec<KeywordAssociation>> {
    let rows: Vec<KeywordAssociation> = read_table(path)?;
    Ok(rows
        .into_iter()
        .filter(|row| {
            if row.keyword.is_empty() || row.place_id.is_empty() {
                warn!(
                    target: "tables",
                    keyword = %row.keyword,
                    place_id = %row.place_id,
                    "skipping incomplete keyword row"
                );
                return false;
            }
            true
        })
        .collect())
}

fn read_table<T: for<'de> Deserialize<'de>>(path: &Path) -> AppResult<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| AppError::Config(format!("unable to open {}: {err}", path.display())))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct PlaceDirectory {
    by_id: HashMap<String, Place>,
}

impl PlaceDirectory {
    pub fn new(places: Vec<Place>) -> AppResult<Self> {
        let mut by_id = HashMap::with_capacity(places.len());
        for place in places {
            if by_id.contains_key(&place.place_id) {
                return Err(AppError::Config(format!(
                    "duplicate place_id in places table: {}",
                    place.place_id
                )));
            }
            by_id.insert(place.place_id.clone(), place);
        }
        Ok(Self { by_id })
    }

    pub fn get(&self, place_id: &str) -> Option<&Place> {
        self.by_id.get(place_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// Keywords come out sorted; place ids keep first-appearance order, duplicates dropped.
pub fn group_by_keyword(associations: &[KeywordAssociation]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for association in associations {
        let place_ids = grouped.entry(association.keyword.clone()).or_default();
        if !place_ids.contains(&association.place_id) {
            place_ids.push(association.place_id.clone());
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn loads_tables_and_skips_blank_rows() {
        let dir = tempdir().unwrap();
        let places = dir.path().join("places.csv");
        let keywords = dir.path().join("keywords.csv");
        fs::write(&places, "place_id,place_name\n P1 , Cafe A \nP2,Cafe B\n,Orphan\n").unwrap();
        fs::write(&keywords, "keyword,place_id\nkw1,P1\n,P2\nkw2,\nkw2,P2\n").unwrap();

        let places = load_places(&places).unwrap();
        assert_eq!(places, vec![Place::new("P1", "Cafe A"), Place::new("P2", "Cafe B")]);

        let keywords = load_keywords(&keywords).unwrap();
        assert_eq!(
            keywords,
            vec![
                KeywordAssociation::new("kw1", "P1"),
                KeywordAssociation::new("kw2", "P2")
            ]
        );
    }

    #[test]
    fn missing_table_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = load_places(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn rejects_duplicate_place_ids() {
        let err = PlaceDirectory::new(vec![Place::new("P1", "A"), Place::new("P1", "B")])
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn groups_in_stable_order_without_duplicates() {
        let grouped = group_by_keyword(&[
            KeywordAssociation::new("kw2", "P1"),
            KeywordAssociation::new("kw1", "P2"),
            KeywordAssociation::new("kw1", "P1"),
            KeywordAssociation::new("kw1", "P2"),
        ]);

        let keys: Vec<&String> = grouped.keys().collect();
        assert_eq!(keys, vec!["kw1", "kw2"]);
        assert_eq!(grouped["kw1"], vec!["P2", "P1"]);
        assert_eq!(grouped["kw2"], vec!["P1"]);
    }
}
