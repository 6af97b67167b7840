use std::collections::HashSet;
use std::net::IpAddr;

/// Hosts past this many are still ignored but no longer logged.
const MAX_REMEMBERED: usize = 256;

/// Remembers which unaccepted hosts have already been reported, so each
/// one is logged once no matter how its packets interleave with others.
#[derive(Debug, Default)]
pub(crate) struct UnknownSenders {
    logged: HashSet<IpAddr>,
}

impl UnknownSenders {
    /// True the first time `host` is seen.
    pub(crate) fn first_sighting(&mut self, host: IpAddr) -> bool {
        if self.logged.len() >= MAX_REMEMBERED {
            return false;
        }
        self.logged.insert(host)
    }
}
