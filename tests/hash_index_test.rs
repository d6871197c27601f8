use std::sync::Arc;
use anyhow::Result;

mod common;
use common::{create_test_buffer_pool, create_test_parallel_pool};
use tarndb::index::hash::ExtendibleHashTable;
use tarndb::storage::buffer::BufferPool;

fn create_test_table(
    pool_size: usize,
) -> Result<(ExtendibleHashTable<i32, i32>, tempfile::NamedTempFile)> {
    let (buffer_pool, temp_file) = create_test_buffer_pool(pool_size)?;
    let table = ExtendibleHashTable::new(buffer_pool as Arc<dyn BufferPool>)?;
    Ok((table, temp_file))
}

#[test]
fn test_insert_and_get() -> Result<()> {
    let (table, _temp_file) = create_test_table(10)?;

    assert!(table.insert(&1, &10)?);
    assert!(table.insert(&2, &20)?);

    assert_eq!(table.get_value(&1)?, vec![10]);
    assert_eq!(table.get_value(&2)?, vec![20]);
    assert!(table.get_value(&3)?.is_empty());
    Ok(())
}

#[test]
fn test_duplicate_pair_rejected() -> Result<()> {
    let (table, _temp_file) = create_test_table(10)?;

    assert!(table.insert(&1, &10)?);
    assert!(!table.insert(&1, &10)?);
    assert_eq!(table.get_value(&1)?, vec![10]);
    Ok(())
}

#[test]
fn test_same_key_many_values() -> Result<()> {
    let (table, _temp_file) = create_test_table(10)?;

    assert!(table.insert(&5, &50)?);
    assert!(table.insert(&5, &51)?);
    assert!(table.insert(&5, &52)?);

    let mut values = table.get_value(&5)?;
    values.sort();
    assert_eq!(values, vec![50, 51, 52]);
    Ok(())
}

#[test]
fn test_split_grows_directory() -> Result<()> {
    let (table, _temp_file) = create_test_table(16)?;
    assert_eq!(table.global_depth()?, 0);

    // A bucket holds 4 * 4096 / (4 * 8 + 1) = 496 int pairs; a thousand
    // inserts force several splits
    for key in 0..1000 {
        assert!(table.insert(&key, &(key * 2))?, "insert {} failed", key);
    }

    assert!(table.global_depth()? >= 1);
    table.verify_integrity()?;

    for key in 0..1000 {
        assert_eq!(table.get_value(&key)?, vec![key * 2], "lookup {} failed", key);
    }
    Ok(())
}

#[test]
fn test_remove() -> Result<()> {
    let (table, _temp_file) = create_test_table(10)?;

    assert!(table.insert(&1, &10)?);
    assert!(table.insert(&1, &11)?);

    assert!(table.remove(&1, &10)?);
    assert_eq!(table.get_value(&1)?, vec![11]);

    // Removing an absent pair fails, including a mismatched value
    assert!(!table.remove(&1, &10)?);
    assert!(!table.remove(&2, &20)?);

    assert!(table.remove(&1, &11)?);
    assert!(table.get_value(&1)?.is_empty());
    Ok(())
}

#[test]
fn test_reinsert_after_remove() -> Result<()> {
    let (table, _temp_file) = create_test_table(10)?;

    assert!(table.insert(&9, &90)?);
    assert!(table.remove(&9, &90)?);
    assert!(table.insert(&9, &91)?);
    assert_eq!(table.get_value(&9)?, vec![91]);
    Ok(())
}

#[test]
fn test_remove_all_shrinks_directory() -> Result<()> {
    let (table, _temp_file) = create_test_table(16)?;

    for key in 0..1000 {
        assert!(table.insert(&key, &key)?);
    }
    let grown_depth = table.global_depth()?;
    assert!(grown_depth >= 1);

    for key in 0..1000 {
        assert!(table.remove(&key, &key)?, "remove {} failed", key);
    }

    // Every emptied bucket merged back into its image and the directory
    // collapsed with them
    assert_eq!(table.global_depth()?, 0);
    table.verify_integrity()?;

    for key in 0..1000 {
        assert!(table.get_value(&key)?.is_empty());
    }

    // The collapsed table still accepts inserts
    assert!(table.insert(&3, &33)?);
    assert_eq!(table.get_value(&3)?, vec![33]);
    Ok(())
}

#[test]
fn test_round_trip_over_parallel_pool() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_parallel_pool(3, 8)?;
    let table: ExtendibleHashTable<i32, i32> =
        ExtendibleHashTable::new(buffer_pool as Arc<dyn BufferPool>)?;

    for key in 0..600 {
        assert!(table.insert(&key, &(key + 7))?);
    }
    for key in 0..600 {
        assert_eq!(table.get_value(&key)?, vec![key + 7]);
    }
    table.verify_integrity()?;
    Ok(())
}
