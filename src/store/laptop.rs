use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::proto::Laptop;
use crate::{Error, Result};

/// How a search scan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Every entry of the snapshot was visited.
    Completed {
        /// Number of entries delivered to the match callback.
        matched: usize,
    },
    /// The cancellation token fired before the snapshot was exhausted.
    Canceled {
        /// Number of entries delivered before cancellation.
        matched: usize,
    },
}

/// One step of a [`Scan`].
#[derive(Clone, Debug, PartialEq)]
pub enum ScanStep {
    /// Next entry of the snapshot.
    Entry(Laptop),
    /// Terminal marker: the scan stopped because it was canceled.
    Canceled,
}

/// Iterator over a snapshot of the laptop table.
///
/// The cancellation token is checked before every entry. Once it fires the
/// scan yields a single [`ScanStep::Canceled`] and then ends, which keeps
/// cancellation distinct from normal exhaustion.
#[derive(Debug)]
pub struct Scan {
    entries: std::vec::IntoIter<Laptop>,
    cancel: CancellationToken,
    finished: bool,
}

impl Iterator for Scan {
    type Item = ScanStep;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.cancel.is_cancelled() {
            self.finished = true;
            return Some(ScanStep::Canceled);
        }

        match self.entries.next() {
            Some(laptop) => Some(ScanStep::Entry(laptop)),
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Parses `id` as a UUID and returns its lowercase hyphenated spelling.
///
/// Every spelling `Uuid::parse_str` accepts (upper case, braced, `urn:uuid:`)
/// maps to the same key.
pub fn canonical_id(id: &str) -> Result<String> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| Error::InvalidArgument(format!("laptop ID '{id}' is not a valid UUID: {e}")))
}

/// Concurrency-safe laptop table keyed by UUID.
///
/// Readers always receive owned copies, so nothing a caller does to a returned
/// laptop can reach the stored one.
#[derive(Clone, Default)]
pub struct LaptopStore {
    laptops: Arc<RwLock<HashMap<String, Laptop>>>,
}

impl LaptopStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves a laptop under its id.
    ///
    /// The id must already be a valid UUID; generating one for a laptop that
    /// has none is the caller's job. The id is stored in canonical form and an
    /// existing entry is never overwritten.
    pub async fn save(&self, mut laptop: Laptop) -> Result<()> {
        laptop.id = canonical_id(&laptop.id)?;

        let mut laptops = self.laptops.write().await;
        if laptops.contains_key(&laptop.id) {
            return Err(Error::AlreadyExists(format!(
                "laptop '{}' already exists",
                laptop.id
            )));
        }

        laptops.insert(laptop.id.clone(), laptop);
        Ok(())
    }

    /// Returns a copy of the laptop stored under `id`.
    pub async fn find(&self, id: &str) -> Result<Laptop> {
        let not_found = || Error::NotFound(format!("laptop '{id}' not found"));
        let key = canonical_id(id).map_err(|_| not_found())?;

        self.laptops
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(not_found)
    }

    /// Returns true when a laptop is stored under `id`, in any UUID spelling.
    pub async fn contains(&self, id: &str) -> bool {
        match canonical_id(id) {
            Ok(key) => self.laptops.read().await.contains_key(&key),
            Err(_) => false,
        }
    }

    /// Number of stored laptops.
    pub async fn len(&self) -> usize {
        self.laptops.read().await.len()
    }

    /// Returns true when the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.laptops.read().await.is_empty()
    }

    /// Snapshots the table and returns a cancellable iterator over it.
    ///
    /// The read lock is released before this returns.
    pub async fn scan(&self, cancel: CancellationToken) -> Scan {
        let snapshot = self
            .laptops
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();

        Scan {
            entries: snapshot.into_iter(),
            cancel,
            finished: false,
        }
    }

    /// Streams every laptop matching `predicate` into `on_match`.
    ///
    /// Iteration order is unspecified. A failure returned by `on_match` stops
    /// the scan and is returned unchanged.
    pub async fn search<P, F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        predicate: P,
        mut on_match: F,
    ) -> std::result::Result<SearchOutcome, E>
    where
        P: Fn(&Laptop) -> bool,
        F: FnMut(Laptop) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let mut matched = 0;

        for step in self.scan(cancel.clone()).await {
            match step {
                ScanStep::Entry(laptop) => {
                    if predicate(&laptop) {
                        on_match(laptop).await?;
                        matched += 1;
                    }
                }
                ScanStep::Canceled => return Ok(SearchOutcome::Canceled { matched }),
            }
        }

        Ok(SearchOutcome::Completed { matched })
    }
}
