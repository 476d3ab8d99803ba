// =============================================================================
// Conclave Federated Room Server - Memory Engine Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   In-memory storage engine over ordered byte maps. Carries the full
//   tree contract, so the test suite and embedders run the pipeline
//   without an external database.
//
// Architecture:
//   • Async/await native implementation
//   • Single writer per room, parallel across rooms
//   • Append-only storage with monotonic numeric identifiers
//
// Dependencies:
//   • Tokio async runtime
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix protocol types with ruma
//
// References:
//   • Matrix.org specification: https://matrix.org/
//   • Matrix spec: https://spec.matrix.org/
//
// =============================================================================

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, RwLock},
};

use super::{KeyValueDatabaseEngine, KvTree};
use crate::{utils, Config, Result};

pub struct Engine {
    trees: RwLock<HashMap<&'static str, Arc<MemoryTree>>>,
}

impl KeyValueDatabaseEngine for Engine {
    fn open(_config: &Config) -> Result<Self> {
        Ok(Self {
            trees: RwLock::new(HashMap::new()),
        })
    }

    fn open_tree(&self, name: &'static str) -> Result<Arc<dyn KvTree>> {
        let mut trees = self.trees.write().unwrap();
        let tree = trees
            .entry(name)
            .or_insert_with(|| Arc::new(MemoryTree::default()));
        Ok(Arc::clone(tree) as Arc<dyn KvTree>)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTree {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl KvTree for MemoryTree {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map
            .write()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn insert_batch(&self, iter: &mut dyn Iterator<Item = (Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut map = self.map.write().unwrap();
        for (key, value) in iter {
            map.insert(key, value);
        }
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.map.write().unwrap().remove(key);
        Ok(())
    }

    fn iter_from<'a>(
        &'a self,
        from: &[u8],
        backwards: bool,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a> {
        let map = self.map.read().unwrap();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = if backwards {
            map.range::<Vec<u8>, _>((Bound::Unbounded, Bound::Included(&from.to_vec())))
                .rev()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            map.range::<Vec<u8>, _>((Bound::Included(&from.to_vec()), Bound::Unbounded))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        Box::new(pairs.into_iter())
    }

    fn scan_prefix<'a>(
        &'a self,
        prefix: Vec<u8>,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a> {
        let map = self.map.read().unwrap();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = map
            .range::<Vec<u8>, _>((Bound::Included(&prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(pairs.into_iter())
    }

    fn increment(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut map = self.map.write().unwrap();
        let new = utils::increment(map.get(key).map(|v| &v[..]));
        map.insert(key.to_vec(), new.clone());
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tree() -> MemoryTree {
        MemoryTree::default()
    }

    #[test]
    fn test_get_insert_remove() {
        let tree = test_tree();
        assert_eq!(tree.get(b"key").unwrap(), None);

        tree.insert(b"key", b"value").unwrap();
        assert_eq!(tree.get(b"key").unwrap(), Some(b"value".to_vec()));

        tree.remove(b"key").unwrap();
        assert_eq!(tree.get(b"key").unwrap(), None);
    }

    #[test]
    fn test_increment_is_sequential() {
        let tree = test_tree();
        assert_eq!(utils::u64_from_bytes(&tree.increment(b"c").unwrap()).unwrap(), 1);
        assert_eq!(utils::u64_from_bytes(&tree.increment(b"c").unwrap()).unwrap(), 2);
        assert_eq!(utils::u64_from_bytes(&tree.increment(b"d").unwrap()).unwrap(), 1);
    }

    #[test]
    fn test_scan_prefix_is_bounded() {
        let tree = test_tree();
        tree.insert(b"a1", b"1").unwrap();
        tree.insert(b"a2", b"2").unwrap();
        tree.insert(b"b1", b"3").unwrap();

        let keys: Vec<Vec<u8>> = tree.scan_prefix(b"a".to_vec()).map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a1".to_vec(), b"a2".to_vec()]);
    }

    #[test]
    fn test_iter_from_both_directions() {
        let tree = test_tree();
        for key in [b"a", b"b", b"c"] {
            tree.insert(key, b"x").unwrap();
        }

        let forwards: Vec<Vec<u8>> = tree.iter_from(b"b", false).map(|(k, _)| k).collect();
        assert_eq!(forwards, vec![b"b".to_vec(), b"c".to_vec()]);

        let backwards: Vec<Vec<u8>> = tree.iter_from(b"b", true).map(|(k, _)| k).collect();
        assert_eq!(backwards, vec![b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_engine_shares_trees_by_name() {
        let config = Config::new("conclave.test".try_into().unwrap());
        let engine = Engine::open(&config).unwrap();

        let first = engine.open_tree("shared").unwrap();
        first.insert(b"key", b"value").unwrap();

        let second = engine.open_tree("shared").unwrap();
        assert_eq!(second.get(b"key").unwrap(), Some(b"value".to_vec()));
    }
}
