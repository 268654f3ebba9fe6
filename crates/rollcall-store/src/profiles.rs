//! Encrypted profile store.
//!
//! Holds every enrolled identity with its reference samples, in enrollment
//! order. The whole mapping is re-serialized, sealed and atomically
//! rewritten after every mutation. Mutations are applied to a copy that only
//! replaces the in-memory state once it has reached disk, so a failed save
//! leaves memory and disk in agreement.

use std::fs;
use std::path::{Path, PathBuf};

use rollcall_core::{FaceSample, Profile, UNKNOWN_LABEL};
use serde::{Deserialize, Serialize};

use crate::crypto::ProfileKey;
use crate::StoreError;

const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct ProfileDocumentRef<'a> {
    schema_version: u32,
    profiles: &'a [Profile],
}

#[derive(Deserialize)]
struct ProfileDocument {
    schema_version: u32,
    profiles: Vec<Profile>,
}

pub struct ProfileStore {
    path: PathBuf,
    key: ProfileKey,
    profiles: Vec<Profile>,
}

impl ProfileStore {
    /// Open the store at `path`, creating the key at `key_path` on first run.
    ///
    /// A missing store file is an empty store. An unreadable one is logged
    /// and also treated as empty.
    pub fn open(path: impl Into<PathBuf>, key_path: &Path) -> Result<Self, StoreError> {
        let key = ProfileKey::load_or_create(key_path)?;
        Ok(Self::open_with_key(path, key))
    }

    pub fn open_with_key(path: impl Into<PathBuf>, key: ProfileKey) -> Self {
        let mut store = Self {
            path: path.into(),
            key,
            profiles: Vec::new(),
        };
        store.load();
        store
    }

    /// (Re)load the mapping from disk, falling back to empty on any failure.
    pub fn load(&mut self) {
        self.profiles = match self.read() {
            Ok(Some(profiles)) => {
                tracing::info!(
                    path = %self.path.display(),
                    identities = profiles.len(),
                    "loaded profile store"
                );
                profiles
            }
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "no profile store yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "profile store unreadable, starting empty"
                );
                Vec::new()
            }
        };
    }

    fn read(&self) -> Result<Option<Vec<Profile>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let sealed = fs::read(&self.path)?;
        let plain = self.key.open(&sealed)?;
        let doc: ProfileDocument = bincode::deserialize(&plain)?;
        if doc.schema_version != SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema(doc.schema_version));
        }

        let mut profiles = doc.profiles;
        profiles.retain(|p| {
            if p.samples.is_empty() {
                tracing::warn!(name = %p.name, "dropping stored identity without samples");
            }
            !p.samples.is_empty()
        });
        Ok(Some(profiles))
    }

    /// Persist the current in-memory mapping.
    pub fn save(&self) -> Result<(), StoreError> {
        self.persist(&self.profiles)
    }

    fn persist(&self, profiles: &[Profile]) -> Result<(), StoreError> {
        let doc = ProfileDocumentRef {
            schema_version: SCHEMA_VERSION,
            profiles,
        };
        let plain = bincode::serialize(&doc)?;
        let sealed = self.key.seal(&plain)?;
        atomic_write(&self.path, &sealed)?;
        tracing::debug!(
            path = %self.path.display(),
            identities = profiles.len(),
            bytes = sealed.len(),
            "profile store saved"
        );
        Ok(())
    }

    /// Apply `mutate` to a copy, persist it, then adopt it.
    fn commit<T>(&mut self, mutate: impl FnOnce(&mut Vec<Profile>) -> T) -> Result<T, StoreError> {
        let mut next = self.profiles.clone();
        let out = mutate(&mut next);
        self.persist(&next)?;
        self.profiles = next;
        Ok(out)
    }

    /// Insert a new identity, replacing any existing one of the same name.
    pub fn enroll(&mut self, name: &str, samples: Vec<FaceSample>) -> Result<(), StoreError> {
        check_name(name)?;
        if samples.is_empty() {
            return Err(StoreError::EmptyEnrollment(name.to_string()));
        }
        let count = samples.len();
        let replaced = self.commit(|profiles| {
            let profile = Profile {
                name: name.to_string(),
                samples,
            };
            match profiles.iter_mut().find(|p| p.name == name) {
                Some(existing) => {
                    *existing = profile;
                    true
                }
                None => {
                    profiles.push(profile);
                    false
                }
            }
        })?;
        tracing::info!(name, samples = count, replaced, "identity enrolled");
        Ok(())
    }

    /// Append one sample, creating a one-sample identity if `name` is new.
    /// Returns the identity's sample count afterwards.
    pub fn add_sample(&mut self, name: &str, sample: FaceSample) -> Result<usize, StoreError> {
        check_name(name)?;
        let count = self.commit(|profiles| match profiles.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.samples.push(sample);
                existing.samples.len()
            }
            None => {
                profiles.push(Profile {
                    name: name.to_string(),
                    samples: vec![sample],
                });
                1
            }
        })?;
        tracing::debug!(name, samples = count, "reference sample added");
        Ok(count)
    }

    /// Delete an identity and all its samples. Returns `false` if not found.
    pub fn remove(&mut self, name: &str) -> Result<bool, StoreError> {
        if !self.contains(name) {
            return Ok(false);
        }
        self.commit(|profiles| profiles.retain(|p| p.name != name))?;
        tracing::info!(name, "identity removed");
        Ok(true)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p.name == name)
    }

    pub fn samples(&self, name: &str) -> Option<&[FaceSample]> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.samples.as_slice())
    }

    /// All identities in enrollment order, as the matcher's gallery.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name == UNKNOWN_LABEL {
        return Err(StoreError::ReservedName(name.to_string()));
    }
    Ok(())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(())
}
