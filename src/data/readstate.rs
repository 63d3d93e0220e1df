// src/data/readstate.rs

//! Implement [`Subscription`], [`ReadState`], and [`ResetPolicy`].

use crate::common::{FPath, FileOffset, SubscriptionId};
use crate::data::fingerprint::Fingerprint;

use std::fmt;

use ::serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscription
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One consumer's interest in one file.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub file_path: FPath,
}

impl Subscription {
    pub fn new(
        subscription_id: &str,
        file_path: &str,
    ) -> Subscription {
        Subscription {
            subscription_id: SubscriptionId::from(subscription_id),
            file_path: FPath::from(file_path),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}@{:?}", self.subscription_id, self.file_path)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReadState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persisted progress of one [`Subscription`].
///
/// Only the [`StateStore`] reads and writes these records. A record is
/// replaced as a whole at the end of a successful pass.
///
/// [`StateStore`]: crate::readers::statestore::StateStore
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReadState {
    pub subscription_id: SubscriptionId,
    pub file_path: FPath,
    /// Byte offset of the first byte not yet reported.
    /// Always the start of a line.
    pub offset: FileOffset,
    /// `None` until a pass has completed.
    pub fingerprint: Option<Fingerprint>,
    /// Set by a [`ResetPolicy::SkipToEnd`] reset. The next pass jumps to the
    /// end of the file without reporting lines, then clears it.
    #[serde(default)]
    pub skip_to_end: bool,
}

impl ReadState {
    /// The state of a subscription that has never been read.
    pub fn new_default(subscription: &Subscription) -> ReadState {
        ReadState {
            subscription_id: subscription.subscription_id.clone(),
            file_path: subscription.file_path.clone(),
            offset: 0,
            fingerprint: None,
            skip_to_end: false,
        }
    }

    /// The marker state written by a [`ResetPolicy::SkipToEnd`] reset.
    pub fn new_skip_to_end(subscription: &Subscription) -> ReadState {
        ReadState {
            skip_to_end: true,
            ..ReadState::new_default(subscription)
        }
    }

    pub fn subscription(&self) -> Subscription {
        Subscription {
            subscription_id: self.subscription_id.clone(),
            file_path: self.file_path.clone(),
        }
    }

    /// Is this record for `subscription`?
    pub fn is_for(
        &self,
        subscription: &Subscription,
    ) -> bool {
        self.subscription_id == subscription.subscription_id
            && self.file_path == subscription.file_path
    }

    /// `true` if no pass has completed for this subscription.
    pub const fn is_default(&self) -> bool {
        self.offset == 0 && self.fingerprint.is_none() && !self.skip_to_end
    }
}

impl fmt::Display for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.fingerprint {
            Some(fp) => write!(
                f,
                "ReadState {{ {:?}@{:?} offset {} ({}){} }}",
                self.subscription_id,
                self.file_path,
                self.offset,
                fp,
                if self.skip_to_end { " skip-to-end" } else { "" },
            ),
            None => write!(
                f,
                "ReadState {{ {:?}@{:?} offset {} (no fingerprint){} }}",
                self.subscription_id,
                self.file_path,
                self.offset,
                if self.skip_to_end { " skip-to-end" } else { "" },
            ),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ResetPolicy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What an administrative reset does to a subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResetPolicy {
    /// Forget the record; the next pass reads from offset 0.
    Restart,
    /// The next pass skips everything currently in the file and reports
    /// nothing; later passes report only newer lines.
    SkipToEnd,
}

impl ResetPolicy {
    /// Map the wire/CLI "reset-on-read" flag to a policy.
    pub const fn from_reset_on_read(reset_on_read: bool) -> ResetPolicy {
        match reset_on_read {
            true => ResetPolicy::SkipToEnd,
            false => ResetPolicy::Restart,
        }
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResetPolicy::Restart => write!(f, "restart"),
            ResetPolicy::SkipToEnd => write!(f, "skip-to-end"),
        }
    }
}
