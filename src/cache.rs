use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::feed::{Club, Rules, Tournament};
use crate::errors::{AppError, AppResult};

/// A cached tournament. Non-geo fields are refreshed on every run; once the
/// address carries coordinates they are copied forward instead of re-resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentEntry {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_date: String,
    pub end_date: String,
    pub address: Address,
    pub club: Club,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Rules>,
    pub endowment: i64,
    pub timestamp: DateTime<Utc>,
}

impl TournamentEntry {
    pub fn from_feed(tournament: &Tournament) -> Self {
        Self {
            id: tournament.id,
            name: tournament.name.clone(),
            kind: tournament.kind.clone(),
            start_date: tournament.start_date.clone(),
            end_date: tournament.end_date.clone(),
            address: tournament.address.clone(),
            club: tournament.club.clone(),
            rules: tournament.rules.clone(),
            endowment: tournament.total_endowment(),
            timestamp: Utc::now(),
        }
    }

    pub fn cache_key(&self) -> String {
        self.id.to_string()
    }
}

/// Keyed result set persisted as one JSON document. Loading tolerates a
/// missing snapshot (first run); saving always replaces the whole file via a
/// temp-file rename so readers never observe a partial write.
pub struct SnapshotStore<T> {
    path: PathBuf,
    items: Mutex<BTreeMap<String, T>>,
}

impl<T> SnapshotStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).map_err(|err| {
                AppError::Parse(format!("cache snapshot {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.items.lock().get(key).cloned()
    }

    pub fn entries(&self) -> BTreeMap<String, T> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Overwrite-by-key merge, then one atomic replace of the snapshot file.
    /// Returns the merged set size.
    pub fn merge_and_save(
        &self,
        updates: impl IntoIterator<Item = (String, T)>,
    ) -> AppResult<usize> {
        let mut items = self.items.lock();
        for (key, value) in updates {
            items.insert(key, value);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_string_pretty(&*items)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, payload)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::address::Coordinates;

    fn entry(id: i64, locality: &str) -> TournamentEntry {
        TournamentEntry {
            id,
            name: format!("Tournoi {id}"),
            kind: "Regional".into(),
            start_date: "2026-04-04T08:00:00".into(),
            end_date: "2026-04-05T20:00:00".into(),
            address: Address {
                street_address: "1 avenue du Stade".into(),
                postal_code: "69000".into(),
                address_locality: locality.into(),
                ..Address::default()
            },
            club: Club::default(),
            rules: None,
            endowment: 500,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn missing_snapshot_loads_as_empty() {
        let dir = tempdir().unwrap();
        let store: SnapshotStore<TournamentEntry> =
            SnapshotStore::open(dir.path().join("tournaments.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tournaments.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = SnapshotStore::<TournamentEntry>::open(&path);
        assert!(matches!(result, Err(AppError::Parse(_))));
    }

    #[test]
    fn merge_and_save_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tournaments.json");

        let store = SnapshotStore::open(&path).unwrap();
        let saved = store
            .merge_and_save([("101".to_string(), entry(101, "Lyon"))])
            .unwrap();
        assert_eq!(saved, 1);

        let reopened: SnapshotStore<TournamentEntry> = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("101").unwrap().name, "Tournoi 101");
        // The staging file must not survive a successful save.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn merge_overwrites_by_key_and_keeps_the_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tournaments.json");

        let store = SnapshotStore::open(&path).unwrap();
        store
            .merge_and_save([
                ("101".to_string(), entry(101, "Lyon")),
                ("102".to_string(), entry(102, "Nantes")),
            ])
            .unwrap();

        let mut updated = entry(101, "Villeurbanne");
        updated.address.set_coordinates(Some(Coordinates::new(45.76, 4.83)));
        store
            .merge_and_save([("101".to_string(), updated)])
            .unwrap();

        let reopened: SnapshotStore<TournamentEntry> = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.get("101").unwrap().address.address_locality,
            "Villeurbanne"
        );
        assert_eq!(
            reopened.get("101").unwrap().address.coordinates(),
            Some(Coordinates::new(45.76, 4.83))
        );
        assert_eq!(reopened.get("102").unwrap().address.address_locality, "Nantes");
    }

    #[test]
    fn save_creates_the_cache_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache").join("geo.json");
        let store = SnapshotStore::open(&path).unwrap();
        store
            .merge_and_save([("k".to_string(), entry(1, "Paris"))])
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn entry_from_feed_copies_endowment_fallback() {
        let json = serde_json::json!({
            "id": 9,
            "name": "Open de Rentrée",
            "type": "Departemental",
            "startDate": "2026-09-12T09:00:00",
            "endDate": "2026-09-12T19:00:00",
            "address": {"streetAddress": "", "postalCode": "31000", "addressLocality": "Toulouse"},
            "club": {"id": 3, "name": "Toulouse TT", "code": "", "identifier": ""},
            "endowment": 0,
            "tables": [{"name": "A", "fee": 8, "endowment": 120}]
        });
        let tournament: Tournament = serde_json::from_value(json).unwrap();
        let entry = TournamentEntry::from_feed(&tournament);
        assert_eq!(entry.endowment, 120);
        assert_eq!(entry.cache_key(), "9");
    }
}
