//! Population-wide tracking of topological innovation. Every structurally
//! novel mutation draws ids here, and identical mutations occurring anywhere
//! in the population within one generation resolve to the same ids so that
//! homologous structure stays alignable across genomes.

use fxhash::FxHashMap;
use std::sync::{
    atomic::{AtomicI64, AtomicUsize, Ordering},
    Mutex,
};

/// One dedup record. A new link is keyed by its endpoints and recurrence; a
/// new node by the endpoints and the innovation of the gene it split.
#[derive(Debug, Clone, PartialEq)]
pub enum Innovation {
    NewLink {
        from: usize,
        to: usize,
        recurrent: bool,
        innovation: i64,
        weight: f64,
        trait_id: usize,
    },
    NewNode {
        from: usize,
        to: usize,
        split_innovation: i64,
        innovations: (i64, i64),
        node_id: usize,
    },
}

/// What a link mutation gets back from the registry: either the ids and
/// parameters of an identical mutation seen earlier this generation, or the
/// freshly allocated ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkInnovation {
    pub innovation: i64,
    pub weight: f64,
    pub trait_id: usize,
}

/// As [LinkInnovation], for node splits: the replacement gene pair's
/// innovations and the new hidden node's id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeInnovation {
    pub innovations: (i64, i64),
    pub node_id: usize,
}

#[derive(Debug, Default)]
struct Records {
    entries: Vec<Innovation>,
    // fingerprint -> index into entries
    links: FxHashMap<(usize, usize, bool), usize>,
    nodes: FxHashMap<(usize, usize, i64), usize>,
}

/// Monotonic id counters plus the per-generation dedup table. The counters
/// are atomic post-increments and always hold the next id that will be
/// allocated; the table is guarded by one mutex so lookup and insert are a
/// single step even under parallel reproduction. [clear](InnovationStore::clear)
/// drops the table between epochs, never the counters.
#[derive(Debug)]
pub struct InnovationStore {
    next_innovation: AtomicI64,
    next_node_id: AtomicUsize,
    records: Mutex<Records>,
}

impl InnovationStore {
    pub fn new(next_innovation: i64, next_node_id: usize) -> Self {
        Self {
            next_innovation: AtomicI64::new(next_innovation),
            next_node_id: AtomicUsize::new(next_node_id),
            records: Mutex::new(Records::default()),
        }
    }

    /// Allocate the next innovation number.
    pub fn next_innovation(&self) -> i64 {
        self.next_innovation.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate the next node id.
    pub fn next_node_id(&self) -> usize {
        self.next_node_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The innovation number the next allocation will return.
    pub fn peek_innovation(&self) -> i64 {
        self.next_innovation.load(Ordering::Relaxed)
    }

    /// The node id the next allocation will return.
    pub fn peek_node_id(&self) -> usize {
        self.next_node_id.load(Ordering::Relaxed)
    }

    /// Resolve a new-link mutation. `propose` supplies the would-be weight
    /// and trait of the new gene; it is only invoked when no identical link
    /// mutation has been recorded this generation.
    pub fn link_innovation(
        &self,
        from: usize,
        to: usize,
        recurrent: bool,
        propose: impl FnOnce() -> (f64, usize),
    ) -> LinkInnovation {
        let mut records = self.records.lock().expect("innovation lock poisoned");
        if let Some(&idx) = records.links.get(&(from, to, recurrent)) {
            if let Innovation::NewLink {
                innovation,
                weight,
                trait_id,
                ..
            } = records.entries[idx]
            {
                return LinkInnovation {
                    innovation,
                    weight,
                    trait_id,
                };
            }
        }

        let (weight, trait_id) = propose();
        let innovation = self.next_innovation();
        let idx = records.entries.len();
        records.entries.push(Innovation::NewLink {
            from,
            to,
            recurrent,
            innovation,
            weight,
            trait_id,
        });
        records.links.insert((from, to, recurrent), idx);
        LinkInnovation {
            innovation,
            weight,
            trait_id,
        }
    }

    /// Resolve a node-split mutation. The same split performed in two genomes
    /// within one generation yields the same gene innovations and, crucially,
    /// the same node id.
    pub fn node_innovation(&self, from: usize, to: usize, split_innovation: i64) -> NodeInnovation {
        let mut records = self.records.lock().expect("innovation lock poisoned");
        if let Some(&idx) = records.nodes.get(&(from, to, split_innovation)) {
            if let Innovation::NewNode {
                innovations,
                node_id,
                ..
            } = records.entries[idx]
            {
                return NodeInnovation {
                    innovations,
                    node_id,
                };
            }
        }

        let innovations = (self.next_innovation(), self.next_innovation());
        let node_id = self.next_node_id();
        let idx = records.entries.len();
        records.entries.push(Innovation::NewNode {
            from,
            to,
            split_innovation,
            innovations,
            node_id,
        });
        records.nodes.insert((from, to, split_innovation), idx);
        NodeInnovation {
            innovations,
            node_id,
        }
    }

    /// Snapshot of this generation's records. Short by construction, the
    /// table is cleared every epoch.
    pub fn entries(&self) -> Vec<Innovation> {
        self.records
            .lock()
            .expect("innovation lock poisoned")
            .entries
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("innovation lock poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget this generation's mutations. The id counters keep counting.
    pub fn clear(&self) {
        let mut records = self.records.lock().expect("innovation lock poisoned");
        records.entries.clear();
        records.links.clear();
        records.nodes.clear();
    }
}
