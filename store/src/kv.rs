//! Thin key-value layer over RocksDB.
//!
//! All chain data lives in the `data` column, partitioned into key spaces by
//! a fixed-size prefix; the `metadata` column holds the schema version and
//! the pinned genesis hash. Writes either go through directly or are staged
//! on a [`KvWriteBatch`], which is the store's atomic write scope.

use std::{cmp::Ordering, collections::HashMap, path::Path};

use anyhow::{anyhow, Context, Result};
use archon_primitives::BlockHash;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

/// This is the version of the on-disk data format. It *must* be bumped, and
/// appropriate migrations written, on any change to the persisted layout.
const LATEST_SCHEMA_VERSION: u32 = 1;

/// Key used to store the `LATEST_SCHEMA_VERSION` value in the `METADATA_COLUMN`
const DB_SCHEMA_VERSION_KEY: &[u8; 17] = b"db_schema_version";
const GENESIS_HASH_KEY: &[u8; 12] = b"genesis_hash";

/// A static length prefix partitions the `DATA_COLUMN` into key spaces.
pub const PREFIX_SIZE: usize = 10;

/// Column family names
// All data is stored in `DATA_COLUMN` with a prefix per key space
const DATA_COLUMN: &str = "data";
// This column is just for schema version and genesis info. No prefix is used.
const METADATA_COLUMN: &str = "metadata";

pub struct KvStore {
	/// Rocksdb database instance
	db: DB,
}

impl KvStore {
	/// Open the database at `path`, creating it if missing. A fresh database
	/// is stamped with the current schema version and, when provided, the
	/// genesis hash it belongs to; reopening checks both.
	pub fn open(path: &Path, genesis_hash: Option<BlockHash>) -> Result<Self> {
		let is_existing_db = path.exists();

		let mut create_missing_db_and_cols_opts = Options::default();
		create_missing_db_and_cols_opts.create_missing_column_families(true);
		create_missing_db_and_cols_opts.create_if_missing(true);

		let db = DB::open_cf_descriptors(
			&create_missing_db_and_cols_opts,
			path,
			column_descriptors().into_values(),
		)
		.map_err(anyhow::Error::msg)
		.context(format!("Failed to open database at: {}", path.display()))?;

		if is_existing_db {
			check_schema_version(&db)?;
		} else {
			let mut batch = WriteBatch::default();
			batch.put_cf(
				metadata_column_handle(&db),
				DB_SCHEMA_VERSION_KEY,
				LATEST_SCHEMA_VERSION.to_be_bytes(),
			);
			db.write(batch).context("Failed to write metadata to new db")?;
		}

		let kv = KvStore { db };
		if let Some(genesis_hash) = genesis_hash {
			kv.check_or_set_genesis_hash(&genesis_hash)?;
		}
		Ok(kv)
	}

	/// Open an existing database without write access.
	pub fn open_read_only(path: &Path) -> Result<Self> {
		let cfs = column_descriptors();
		let db = DB::open_cf_for_read_only(
			&Options::default(),
			path,
			cfs.keys().map(String::as_str),
			false,
		)
		.map_err(anyhow::Error::msg)
		.context(format!("Failed to open database read-only at: {}", path.display()))?;

		check_schema_version(&db)?;

		Ok(KvStore { db })
	}

	pub fn put_value<T: Serialize>(&self, prefix: &[u8], key: &[u8], value: &T) -> Result<()> {
		debug_assert_eq!(prefix.len(), PREFIX_SIZE);
		self.db
			.put_cf(
				data_column_handle(&self.db),
				[prefix, key].concat(),
				bincode::serialize(value).expect("Serialization is not expected to fail"),
			)
			.map_err(|e| anyhow!("Failed to write data to database. Error: {}", e))
	}

	pub fn get_value<T: DeserializeOwned>(&self, prefix: &[u8], key: &[u8]) -> Result<Option<T>> {
		debug_assert_eq!(prefix.len(), PREFIX_SIZE);
		self.db
			.get_cf(data_column_handle(&self.db), [prefix, key].concat())?
			.map(|data| {
				bincode::deserialize(&data).map_err(|e| anyhow!("Deserialization failure: {}", e))
			})
			.transpose()
	}

	pub fn contains(&self, prefix: &[u8], key: &[u8]) -> Result<bool> {
		Ok(self.db.get_cf(data_column_handle(&self.db), [prefix, key].concat())?.is_some())
	}

	/// All `(key, value)` pairs of one key space under `prefix ++ key_start`,
	/// in ascending key order.
	pub fn get_values_for_prefix<'a, T: DeserializeOwned>(
		&'a self,
		prefix: &[u8],
		key_start: &[u8],
	) -> impl Iterator<Item = (Vec<u8>, Result<T>)> + 'a {
		debug_assert_eq!(prefix.len(), PREFIX_SIZE);
		let full_prefix = [prefix, key_start].concat();
		let full_prefix_len = full_prefix.len();
		self.db
			.prefix_iterator_cf(data_column_handle(&self.db), full_prefix.clone())
			.map(|result| result.expect("prefix iterator should not fail"))
			// The prefix extractor is fixed-size, so the iterator can run past
			// entries sharing only the short configured prefix.
			.take_while(move |(key, _)| key.starts_with(&full_prefix))
			.map(move |(key, value)| {
				(
					Vec::from(&key[full_prefix_len..]),
					bincode::deserialize(&value)
						.map_err(|e| anyhow!("Deserialization failure: {}", e)),
				)
			})
	}

	/// Check that the genesis in the db file matches the one provided.
	/// If None is found, it will be added to the db.
	fn check_or_set_genesis_hash(&self, genesis_hash: &BlockHash) -> Result<()> {
		match self
			.db
			.get_cf(metadata_column_handle(&self.db), GENESIS_HASH_KEY)
			.context("Failed to get metadata column")?
		{
			Some(existing) => {
				let existing = BlockHash::try_from_slice(&existing)
					.map_err(|e| anyhow!("Corrupt genesis hash in db: {}", e))?;
				if existing == *genesis_hash {
					Ok(())
				} else {
					Err(anyhow!(
						"Genesis hash mismatch: db belongs to {}, expected {}",
						existing,
						genesis_hash
					))
				}
			},
			None => {
				self.db
					.put_cf(
						metadata_column_handle(&self.db),
						GENESIS_HASH_KEY,
						genesis_hash.as_bytes(),
					)
					.context("Failed to write genesis hash to db")?;
				Ok(())
			},
		}
	}

	pub fn create_batch(&self) -> KvWriteBatch<'_> {
		KvWriteBatch { db: &self.db, batch: WriteBatch::default() }
	}
}

/// A staged set of writes committed atomically by [`KvWriteBatch::write`].
pub struct KvWriteBatch<'a> {
	db: &'a DB,
	batch: WriteBatch,
}

impl KvWriteBatch<'_> {
	pub fn put_value<T: Serialize>(&mut self, prefix: &[u8], key: &[u8], value: &T) {
		debug_assert_eq!(prefix.len(), PREFIX_SIZE);
		self.batch.put_cf(
			data_column_handle(self.db),
			[prefix, key].concat(),
			bincode::serialize(value).expect("Serialization is not expected to fail"),
		);
	}

	pub fn write(self) -> Result<()> {
		self.db.write(self.batch).context("Failed to commit write batch")
	}
}

fn column_descriptors() -> HashMap<String, ColumnFamilyDescriptor> {
	// Use a prefix extractor on the data column
	let mut cfopts_for_prefix = Options::default();
	cfopts_for_prefix
		.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(PREFIX_SIZE));

	HashMap::from_iter([
		(
			METADATA_COLUMN.to_string(),
			ColumnFamilyDescriptor::new(METADATA_COLUMN, Options::default()),
		),
		(DATA_COLUMN.to_string(), ColumnFamilyDescriptor::new(DATA_COLUMN, cfopts_for_prefix)),
	])
}

fn check_schema_version(db: &DB) -> Result<()> {
	let version = db
		.get_cf(metadata_column_handle(db), DB_SCHEMA_VERSION_KEY)
		.context("Failed to get metadata column")?
		.map(|version| {
			let version: [u8; 4] = version.try_into().expect("Version should be a u32");
			u32::from_be_bytes(version)
		})
		.ok_or_else(|| anyhow!("Could not find db schema version"))?;

	info!("Found db_schema_version of {version}");

	match version.cmp(&LATEST_SCHEMA_VERSION) {
		Ordering::Equal => Ok(()),
		Ordering::Greater => Err(anyhow!(
			"Database schema version {} is ahead of the current schema version {}. Is your node up to date?",
			version,
			LATEST_SCHEMA_VERSION
		)),
		Ordering::Less => Err(anyhow!(
			"Database schema version {} is no longer supported (current: {})",
			version,
			LATEST_SCHEMA_VERSION
		)),
	}
}

fn data_column_handle(db: &DB) -> &ColumnFamily {
	column_handle(db, DATA_COLUMN)
}

fn metadata_column_handle(db: &DB) -> &ColumnFamily {
	column_handle(db, METADATA_COLUMN)
}

fn column_handle<'a>(db: &'a DB, column_name: &str) -> &'a ColumnFamily {
	db.cf_handle(column_name)
		.unwrap_or_else(|| panic!("Should get column family handle for {column_name}"))
}
