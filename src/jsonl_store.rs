use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::{EntityRef, Interaction, InteractionKey, InteractionStore, MemoryStore, StorageError};

/// An append-only store that keeps one JSON-encoded [`Interaction`] per line.
///
/// Existing records are loaded into memory when the store is opened; queries are answered from
/// memory and every insert is written and flushed before it is acknowledged.  A failed write is
/// truncated away, and an unterminated final line left by a crash is dropped on open.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    file: File,
    index: MemoryStore,
}

impl JsonlStore {
    /// Open (creating if necessary) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let mut bytes = vec![];
        file.read_to_end(&mut bytes)?;
        let mut index = MemoryStore::new();
        let mut offset = 0;
        for (number, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
            let start = offset;
            offset += line.len();
            let terminated = line.ends_with(b"\n");
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let interaction: Interaction = match serde_json::from_slice(line) {
                Ok(interaction) => interaction,
                Err(err) if !terminated => {
                    tracing::warn!(
                        path = %path.display(),
                        line = number + 1,
                        bytes = line.len(),
                        error = %err,
                        "dropping torn record at end of interaction log"
                    );
                    file.set_len(start as u64)?;
                    break;
                }
                Err(err) => {
                    return Err(StorageError::Corrupt {
                        line: number + 1,
                        message: err.to_string(),
                    });
                }
            };
            if !terminated {
                file.write_all(b"\n")?;
                file.flush()?;
            }
            index.insert(&interaction).map_err(|err| StorageError::Corrupt {
                line: number + 1,
                message: err.to_string(),
            })?;
        }
        tracing::debug!(path = %path.display(), records = index.len(), "opened interaction log");
        Ok(Self { path, file, index })
    }

    /// Where this store lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True iff the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl InteractionStore for JsonlStore {
    fn insert(&mut self, interaction: &Interaction) -> Result<(), StorageError> {
        if self.index.contains(&interaction.id) {
            return Err(StorageError::backend(format!(
                "interaction {} already stored",
                interaction.id
            )));
        }
        let mut line = serde_json::to_vec(interaction)?;
        line.push(b'\n');
        let length = self.file.metadata()?.len();
        if let Err(err) = self.file.write_all(&line).and_then(|()| self.file.flush()) {
            if let Err(truncate) = self.file.set_len(length) {
                tracing::warn!(
                    path = %self.path.display(),
                    length,
                    error = %truncate,
                    "could not truncate interaction log after a failed write"
                );
            }
            return Err(err.into());
        }
        self.index.insert(interaction)
    }

    fn exists(&self, key: &InteractionKey) -> Result<bool, StorageError> {
        self.index.exists(key)
    }

    fn list_by_target(&self, target: &EntityRef) -> Result<Vec<Interaction>, StorageError> {
        self.index.list_by_target(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewInteraction;

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("interactions-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("interactions.jsonl")
    }

    fn heal(initiator: &str) -> Interaction {
        NewInteraction {
            initiator: EntityRef::new("Healer", initiator),
            target: EntityRef::new("Monster", "1"),
            action: "heal".to_string(),
            params: Some(serde_json::json! {{"amount": 10}}),
        }
        .accept()
    }

    #[test]
    fn records_survive_reopen() {
        let path = scratch();
        let first = heal("1");
        let second = heal("2");
        {
            let mut store = JsonlStore::open(&path).unwrap();
            assert!(store.is_empty());
            store.insert(&first).unwrap();
            store.insert(&second).unwrap();
        }
        let store = JsonlStore::open(&path).unwrap();
        assert_eq!(2, store.len());
        assert!(store.exists(&first.key()).unwrap());
        assert_eq!(
            vec![first, second],
            store
                .list_by_target(&EntityRef::new("Monster", "1"))
                .unwrap()
        );
    }

    #[test]
    fn corrupt_line_is_reported() {
        let path = scratch();
        {
            let mut store = JsonlStore::open(&path).unwrap();
            store.insert(&heal("1")).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"not\": \"an interaction\"}}").unwrap();
        let err = JsonlStore::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let path = scratch();
        let mut store = JsonlStore::open(&path).unwrap();
        let first = heal("1");
        store.insert(&first).unwrap();
        assert!(store.insert(&first).is_err());
        drop(store);
        assert_eq!(1, JsonlStore::open(&path).unwrap().len());
    }

    #[test]
    fn torn_tail_is_dropped_on_open() {
        let path = scratch();
        let first = heal("1");
        {
            let mut store = JsonlStore::open(&path).unwrap();
            store.insert(&first).unwrap();
        }
        let intact = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"id\":\"6f1c").unwrap();
        drop(file);

        let second = heal("2");
        {
            let mut store = JsonlStore::open(&path).unwrap();
            assert_eq!(1, store.len());
            assert_eq!(intact, std::fs::metadata(&path).unwrap().len());
            store.insert(&second).unwrap();
        }
        let store = JsonlStore::open(&path).unwrap();
        assert_eq!(2, store.len());
        assert!(store.exists(&first.key()).unwrap());
        assert!(store.exists(&second.key()).unwrap());
    }

    #[test]
    fn unterminated_final_record_is_kept() {
        let path = scratch();
        let first = heal("1");
        let mut text = serde_json::to_string(&first).unwrap();
        std::fs::write(&path, &text).unwrap();
        let second = heal("2");
        {
            let mut store = JsonlStore::open(&path).unwrap();
            assert_eq!(1, store.len());
            store.insert(&second).unwrap();
        }
        text.push('\n');
        text.push_str(&serde_json::to_string(&second).unwrap());
        text.push('\n');
        assert_eq!(text, std::fs::read_to_string(&path).unwrap());
        assert_eq!(2, JsonlStore::open(&path).unwrap().len());
    }

    #[test]
    fn failed_write_leaves_the_log_intact() {
        let path = scratch();
        let first = heal("1");
        {
            let mut store = JsonlStore::open(&path).unwrap();
            store.insert(&first).unwrap();
        }
        let length = std::fs::metadata(&path).unwrap().len();
        let mut store = JsonlStore::open(&path).unwrap();
        store.file = File::open(&path).unwrap();
        let err = store.insert(&heal("2")).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(1, store.len());
        drop(store);
        assert_eq!(length, std::fs::metadata(&path).unwrap().len());
        assert_eq!(1, JsonlStore::open(&path).unwrap().len());
    }
}
