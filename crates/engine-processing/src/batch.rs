use model::item::RemoteJobStatus;

/// Picks how many results to request per poll.
///
/// Small pages by default; larger ones while local imports lag behind what
/// the service reports, and the largest once the remote job has finished.
/// The size never decreases as the backlog grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSizePolicy {
    pub base: usize,
    pub catch_up: usize,
    pub drain: usize,
    pub catch_up_lag: u64,
    pub drain_lag: u64,
}

impl Default for BatchSizePolicy {
    fn default() -> Self {
        Self {
            base: 10,
            catch_up: 25,
            drain: 50,
            catch_up_lag: 20,
            drain_lag: 100,
        }
    }
}

impl BatchSizePolicy {
    /// `remote` is `None` when the status call failed; the base size is used then.
    pub fn size_for(&self, remote: Option<&RemoteJobStatus>, processed: u64) -> usize {
        let Some(remote) = remote else {
            return self.base;
        };

        let lag = (remote.completed + remote.failed).saturating_sub(processed);
        if remote.is_finished() || lag > self.drain_lag {
            self.drain
        } else if lag > self.catch_up_lag {
            self.catch_up
        } else {
            self.base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::item::RemoteState;

    fn remote(status: RemoteState, completed: u64) -> RemoteJobStatus {
        RemoteJobStatus {
            status,
            total_items: 500,
            completed,
            failed: 0,
        }
    }

    #[test]
    fn grows_with_backlog() {
        let policy = BatchSizePolicy::default();
        assert_eq!(policy.size_for(None, 0), 10);
        assert_eq!(policy.size_for(Some(&remote(RemoteState::Running, 15)), 0), 10);
        assert_eq!(policy.size_for(Some(&remote(RemoteState::Running, 21)), 0), 25);
        assert_eq!(policy.size_for(Some(&remote(RemoteState::Running, 101)), 0), 50);
        assert_eq!(policy.size_for(Some(&remote(RemoteState::Running, 101)), 90), 10);
    }

    #[test]
    fn finished_remote_drains() {
        let policy = BatchSizePolicy::default();
        assert_eq!(policy.size_for(Some(&remote(RemoteState::Completed, 3)), 3), 50);
    }

    #[test]
    fn monotone_in_lag() {
        let policy = BatchSizePolicy::default();
        let mut last = 0;
        for completed in 0..300 {
            let size = policy.size_for(Some(&remote(RemoteState::Running, completed)), 0);
            assert!(size >= last);
            last = size;
        }
    }
}
