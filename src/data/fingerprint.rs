// src/data/fingerprint.rs

//! Implement [`FileIdentity`] and [`Fingerprint`].

use crate::common::{FileMetadata, FileSz};

use std::fmt;

use ::serde::{Deserialize, Serialize};

/// Device id and inode id of an opened file.
///
/// On platforms without inodes both ids are `0`, so rotation is never
/// detected there; truncation still is.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct FileIdentity {
    pub device_id: u64,
    pub inode_id: u64,
}

impl FileIdentity {
    /// Identity of the file described by `metadata`.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &FileMetadata) -> FileIdentity {
        use std::os::unix::fs::MetadataExt;

        FileIdentity {
            device_id: metadata.dev(),
            inode_id: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &FileMetadata) -> FileIdentity {
        FileIdentity::default()
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "dev {} ino {}", self.device_id, self.inode_id)
    }
}

/// A file identity plus the file size seen by the last completed pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub device_id: u64,
    pub inode_id: u64,
    pub size_at_last_read: FileSz,
}

impl Fingerprint {
    pub fn new(
        identity: FileIdentity,
        size_at_last_read: FileSz,
    ) -> Fingerprint {
        Fingerprint {
            device_id: identity.device_id,
            inode_id: identity.inode_id,
            size_at_last_read,
        }
    }

    pub const fn identity(&self) -> FileIdentity {
        FileIdentity {
            device_id: self.device_id,
            inode_id: self.inode_id,
        }
    }

    /// Does `identity` refer to the same underlying file?
    /// The size is not part of identity; a grown or shrunk file is the same
    /// file.
    pub fn same_file(
        &self,
        identity: &FileIdentity,
    ) -> bool {
        self.identity() == *identity
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "dev {} ino {} size {}",
            self.device_id, self.inode_id, self.size_at_last_read
        )
    }
}
