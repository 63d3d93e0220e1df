// src/readers/statestore.rs

//! Implements a [`StateStore`], the durable mapping from a [`Subscription`]
//! to its [`ReadState`].
//!
//! Each subscription is one JSON record file in the state directory,
//! `ltm_<digest>.json`, where `<digest>` is the hex SHA-256 of
//! `subscription_id NUL file_path`. A sibling `ltm_<digest>.lock` file is
//! the advisory lock that serializes passes of the same subscription.
//!
//! Records are replaced atomically: a temporary file in the state directory is
//! written, synced, then renamed over the record.
//!
//! [`Subscription`]: crate::data::readstate::Subscription
//! [`ReadState`]: crate::data::readstate::ReadState

use crate::common::{Count, FPath, FileOpenOptions};
use crate::data::readstate::{ReadState, ResetPolicy, Subscription};
use crate::debug::printers::e_wrn;
use crate::readers::helpers::{fpath_to_path, path_to_fpath};

use std::fmt;
use std::fmt::Write as FmtWrite; // for `write!` into a `String`
use std::fs::File;
use std::io::{BufReader, BufWriter, Error, ErrorKind, Result, Write};
use std::path::{Path, PathBuf};

use ::fs2::FileExt; // provides `lock_exclusive` on `File`
use ::sha2::{Digest, Sha256};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};
use ::tempfile::NamedTempFile;

/// File name prefix of records and lock files.
pub const STATE_FILE_PREFIX: &str = "ltm_";
/// File name suffix of records.
pub const STATE_FILE_SUFFIX_RECORD: &str = ".json";
/// File name suffix of lock files.
pub const STATE_FILE_SUFFIX_LOCK: &str = ".lock";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SubscriptionLock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An exclusive advisory lock on one subscription.
/// Released when dropped.
pub struct SubscriptionLock {
    file: File,
    path: PathBuf,
}

impl SubscriptionLock {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl fmt::Debug for SubscriptionLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SubscriptionLock")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for SubscriptionLock {
    fn drop(&mut self) {
        defñ!("unlock {:?}", self.path);
        // closing the file releases the lock regardless
        let _ = FileExt::unlock(&self.file);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable per-subscription [`ReadState`] records under one directory.
///
/// The directory is created on first write. A missing directory reads as
/// "no records".
///
/// [`ReadState`]: crate::data::readstate::ReadState
#[derive(Clone, Debug)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: &FPath) -> StateStore {
        defñ!("({:?})", state_dir);
        StateStore {
            state_dir: fpath_to_path(state_dir).to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        self.state_dir.as_path()
    }

    /// Hex SHA-256 over `subscription_id NUL file_path`.
    pub fn subscription_digest(subscription: &Subscription) -> String {
        let mut hasher = Sha256::new();
        hasher.update(subscription.subscription_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(subscription.file_path.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            // writing to a `String` cannot fail
            let _ = write!(hex, "{:02x}", byte);
        }

        hex
    }

    /// Path of the record file of `subscription`.
    pub fn record_path(
        &self,
        subscription: &Subscription,
    ) -> PathBuf {
        self.state_dir.join(format!(
            "{}{}{}",
            STATE_FILE_PREFIX,
            StateStore::subscription_digest(subscription),
            STATE_FILE_SUFFIX_RECORD,
        ))
    }

    fn lock_path(
        &self,
        subscription: &Subscription,
    ) -> PathBuf {
        self.state_dir.join(format!(
            "{}{}{}",
            STATE_FILE_PREFIX,
            StateStore::subscription_digest(subscription),
            STATE_FILE_SUFFIX_LOCK,
        ))
    }

    fn create_state_dir(&self) -> Result<()> {
        match std::fs::create_dir_all(&self.state_dir) {
            Ok(_) => Ok(()),
            Err(err) => Err(Error::new(
                err.kind(),
                format!("create state directory {:?}: {}", self.state_dir, err),
            )),
        }
    }

    /// Take the exclusive lock of `subscription`, blocking while another
    /// process holds it.
    ///
    /// Hold the returned lock from [`load`] through [`save`] so two passes of
    /// the same subscription cannot both read the same offset.
    ///
    /// [`load`]: StateStore::load
    /// [`save`]: StateStore::save
    pub fn lock(
        &self,
        subscription: &Subscription,
    ) -> Result<SubscriptionLock> {
        defn!("({})", subscription);
        self.create_state_dir()?;
        let path = self.lock_path(subscription);
        let file = FileOpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        defx!("locked {:?}", path);

        Ok(SubscriptionLock { file, path })
    }

    /// Read the record of `subscription`.
    ///
    /// Never fails. A missing record, an unreadable or malformed record, or a
    /// record that belongs to another subscription all load as the default
    /// state (offset 0); only the malformed cases are warned about.
    pub fn load(
        &self,
        subscription: &Subscription,
    ) -> ReadState {
        defn!("({})", subscription);
        let path = self.record_path(subscription);
        let state = match StateStore::read_record(&path) {
            Ok(Some(state)) if state.is_for(subscription) => state,
            Ok(Some(state)) => {
                e_wrn!(
                    "state record {:?} holds {}, expected {}; starting from offset 0",
                    path,
                    state.subscription(),
                    subscription
                );
                ReadState::new_default(subscription)
            }
            Ok(None) => ReadState::new_default(subscription),
            Err(err) => {
                e_wrn!("state record {:?} unusable ({}); starting from offset 0", path, err);
                ReadState::new_default(subscription)
            }
        };
        defx!("{}", state);

        state
    }

    /// Read one record file; `Ok(None)` if it does not exist.
    fn read_record(path: &Path) -> Result<Option<ReadState>> {
        let file = match File::open(path) {
            Ok(val) => val,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let state: ReadState = ::serde_json::from_reader(BufReader::new(file)).map_err(Error::from)?;

        Ok(Some(state))
    }

    /// Replace the record of `state`'s subscription.
    ///
    /// Atomic: readers see either the prior record or this one.
    pub fn save(
        &self,
        state: &ReadState,
    ) -> Result<()> {
        defn!("{}", state);
        self.create_state_dir()?;
        let path = self.record_path(&state.subscription());
        let mut ntf = NamedTempFile::new_in(&self.state_dir)?;
        {
            let mut writer = BufWriter::new(ntf.as_file_mut());
            ::serde_json::to_writer_pretty(&mut writer, state).map_err(Error::from)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        ntf.as_file().sync_all()?;
        ntf.persist(&path).map_err(|err| err.error)?;
        defx!("saved {:?}", path);

        Ok(())
    }

    /// Reset one subscription per `policy`.
    ///
    /// With [`ResetPolicy::Restart`] a subscription without a record is left
    /// as is; that is a success.
    pub fn reset(
        &self,
        subscription: &Subscription,
        policy: ResetPolicy,
    ) -> Result<()> {
        defn!("({}, {})", subscription, policy);
        let _lock = self.lock(subscription)?;
        let ret = self.reset_locked(subscription, policy);
        defx!("{:?}", ret);

        ret
    }

    fn reset_locked(
        &self,
        subscription: &Subscription,
        policy: ResetPolicy,
    ) -> Result<()> {
        match policy {
            ResetPolicy::Restart => {
                let path = self.record_path(subscription);
                match std::fs::remove_file(&path) {
                    Ok(_) => Ok(()),
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        defo!("no record {:?}", path);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            ResetPolicy::SkipToEnd => self.save(&ReadState::new_skip_to_end(subscription)),
        }
    }

    /// Paths of every record file in the state directory, sorted.
    /// A missing state directory has no records.
    pub fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(val) => val,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STATE_FILE_PREFIX) && name.ends_with(STATE_FILE_SUFFIX_RECORD) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        Ok(paths)
    }

    /// Every readable record in the state directory.
    /// Malformed records are warned about and skipped.
    pub fn records(&self) -> Result<Vec<ReadState>> {
        let mut states: Vec<ReadState> = Vec::new();
        for path in self.record_paths()?.iter() {
            match StateStore::read_record(path) {
                Ok(Some(state)) => states.push(state),
                // removed since listed
                Ok(None) => {}
                Err(err) => {
                    e_wrn!("state record {:?} unusable ({}); skipped", path, err);
                }
            }
        }

        Ok(states)
    }

    /// Reset every subscription with a record per `policy`.
    /// Returns the count of subscriptions reset.
    ///
    /// Malformed records are removed regardless of `policy`; their
    /// subscription cannot be known.
    pub fn reset_all(
        &self,
        policy: ResetPolicy,
    ) -> Result<Count> {
        defn!("({}) {:?}", policy, self.state_dir);
        let mut count: Count = 0;
        for path in self.record_paths()?.iter() {
            match StateStore::read_record(path) {
                Ok(Some(state)) => {
                    let subscription = state.subscription();
                    if self.record_path(&subscription) != *path {
                        // stray file that only looks like a record
                        e_wrn!(
                            "state record {:?} holds {} under the wrong name; removing",
                            path,
                            subscription
                        );
                        remove_file_if_exists(path)?;
                        continue;
                    }
                    self.reset(&subscription, policy)?;
                    count += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    e_wrn!("state record {:?} unusable ({}); removing", path, err);
                    remove_file_if_exists(path)?;
                }
            }
        }
        defx!("reset {} subscriptions", count);

        Ok(count)
    }
}

impl fmt::Display for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "StateStore {{ {:?} }}", path_to_fpath(self.state_dir.as_path()))
    }
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
