mod bucket;
mod codec;
mod directory;

pub use bucket::{bucket_array_size, HashTableBucketPage};
pub use codec::{fnv1a_hash32, StorageCodec};
pub use directory::{HashTableDirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_DEPTH};
