//! Decides whether the destination disk may take another output file.

use fcap_utils::units::scale_bytes;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// The parts of a `statvfs` result the policy needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    /// Fragment size; the unit of the block counts
    pub fragment_size: u64,
    /// Total blocks on the filesystem
    pub blocks: u64,
    /// Free blocks, including those reserved for root
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users
    pub blocks_available: u64,
}

impl FsStats {
    /// Reads the statistics of the filesystem holding `path`.
    pub fn of(path: &Path) -> nix::Result<Self> {
        let st = nix::sys::statvfs::statvfs(path)?;
        Ok(Self {
            fragment_size: st.fragment_size() as u64,
            blocks: st.blocks() as u64,
            blocks_free: st.blocks_free() as u64,
            blocks_available: st.blocks_available() as u64,
        })
    }

    /// Bytes an unprivileged writer may still use
    pub fn free_bytes(&self) -> u64 {
        self.fragment_size.saturating_mul(self.blocks_available)
    }

    /// Size of the filesystem, not counting the root reserve
    pub fn total_bytes(&self) -> u64 {
        let reserved = self.blocks_free.saturating_sub(self.blocks_available);
        self.fragment_size
            .saturating_mul(self.blocks.saturating_sub(reserved))
    }
}

/// Why an allocation was refused.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Refusal {
    /// Free bytes that would remain; negative when the request doesn't fit
    pub new_free: i128,
    /// Percentage of the filesystem that would be used
    pub used_percent: f64,
}

/// Free space thresholds for the destination filesystem.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Admission {
    /// Bytes that must stay free after an allocation
    pub freespace_minimum: u64,
    /// Highest acceptable used percentage after an allocation
    pub space_maximum_percent: f64,
}

impl Admission {
    /// Would allocating `bytes` on a filesystem in state `fs` keep it
    /// within both thresholds?
    pub fn check(&self, fs: &FsStats, bytes: u64) -> Result<(), Refusal> {
        let total = fs.total_bytes() as i128;
        let new_free = fs.free_bytes() as i128 - bytes as i128;
        let used_percent = if total > 0 {
            (total - new_free) as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        if new_free < self.freespace_minimum as i128 || used_percent > self.space_maximum_percent {
            return Err(Refusal {
                new_free,
                used_percent,
            });
        }
        Ok(())
    }
}

/// Something that can say whether another file fits on the disk. The
/// daemon asks the filesystem; tests script the answers.
pub trait SpaceCheck: Send + Sync {
    /// May a file of `bytes` bytes be created?
    fn may_allocate(&self, bytes: u64) -> bool;
}

/// [`SpaceCheck`] against the live filesystem holding a directory.
#[derive(Debug)]
pub struct StatvfsCheck {
    dir: PathBuf,
    policy: Admission,
}

impl StatvfsCheck {
    pub fn new(dir: impl Into<PathBuf>, policy: Admission) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }
}

impl SpaceCheck for StatvfsCheck {
    fn may_allocate(&self, bytes: u64) -> bool {
        let fs = match FsStats::of(&self.dir) {
            Ok(fs) => fs,
            Err(e) => {
                error!("Unable to get filesystem statistics for {:?}: {e}", self.dir);
                return false;
            }
        };
        match self.policy.check(&fs, bytes) {
            Ok(()) => true,
            Err(refusal) => {
                let magnitude = u64::try_from(refusal.new_free.unsigned_abs()).unwrap_or(u64::MAX);
                let free = if refusal.new_free < 0 {
                    format!("-{}", scale_bytes(magnitude))
                } else {
                    scale_bytes(magnitude)
                };
                warn!(
                    "Not enough space in {:?} for {}: {} would remain free ({:.2}% used); limits are {} free and {:.2}% used",
                    self.dir,
                    scale_bytes(bytes),
                    free,
                    refusal.used_percent,
                    scale_bytes(self.policy.freespace_minimum),
                    self.policy.space_maximum_percent,
                );
                false
            }
        }
    }
}
